use std::{ffi::OsStr, path::Path};

use actix_web::{
    rt,
    web::{self, Json},
    HttpRequest, HttpResponse,
};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::*;

use crate::{
    metrics::{Sample, TIMESTAMP_FORMAT},
    server::error::{Error, Result},
    telemetry::{Query, TelemetryService, TelemetryStatus},
};

static DIST: Dir<'_> = include_dir!("frontend/dist");

/// A sample the way the dashboard consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResponse {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub time: String,
}

impl From<&Sample> for SampleResponse {
    fn from(sample: &Sample) -> Self {
        Self {
            cpu: sample.cpu_pct(),
            memory: sample.mem_pct(),
            disk: sample.disk_pct(),
            time: sample.formatted_time(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    pub limit: Option<usize>,
    pub since: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Info {
    pub name: String,
    pub version: String,
    pub authors: String,
}

pub fn new_info() -> Info {
    Info {
        name: env!("CARGO_PKG_NAME").into(),
        version: env!("CARGO_PKG_VERSION").into(),
        authors: env!("CARGO_PKG_AUTHORS").into(),
    }
}

fn load_file(file_name: &str) -> Option<&'static str> {
    DIST.get_file(file_name)
        .and_then(|file| file.contents_utf8())
}

pub async fn root(req: HttpRequest) -> Result<HttpResponse> {
    let raw = req.match_info().get("filename").unwrap_or("");
    let filename = if raw.is_empty() { "index.html" } else { raw };

    if let Some(content) = load_file(filename) {
        let extension = Path::new(filename)
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or("");
        let mime = actix_files::file_extension_to_mime(extension).to_string();
        return Ok(HttpResponse::Ok().content_type(mime).body(content));
    }

    Err(Error::NotFound(format!(
        "Page does not exist: {filename:?}"
    )))
}

/// Provide information about the running service
pub async fn info() -> Json<Info> {
    Json(new_info())
}

/// Most recent sample
pub async fn stats(service: web::Data<TelemetryService>) -> Result<Json<SampleResponse>> {
    let sample = service
        .latest()
        .ok_or_else(|| Error::Unavailable("No sample was recorded yet".to_string()))?;

    Ok(Json(SampleResponse::from(&sample)))
}

/// Retained samples, oldest first, optionally restricted by `limit` or `since`
pub async fn history(
    service: web::Data<TelemetryService>,
    request: web::Query<HistoryRequest>,
) -> Result<Json<Vec<SampleResponse>>> {
    let query = match (request.limit, request.since.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(Error::BadRequest(
                "Use either limit or since, not both".to_string(),
            ))
        }
        (Some(limit), None) => Query::Last(limit),
        // `since` has the one second resolution of `time`, so the whole
        // second it names is excluded
        (None, Some(since)) => {
            Query::NotBefore(parse_local_time(since)? + chrono::Duration::seconds(1))
        }
        (None, None) => Query::All,
    };

    let samples = service.query(query);
    Ok(Json(samples.iter().map(SampleResponse::from).collect()))
}

/// Sampling and persistence counters
pub async fn status(service: web::Data<TelemetryService>) -> Json<TelemetryStatus> {
    Json(service.status())
}

/// Streams the retained samples followed by every new one
pub async fn stats_ws(
    req: HttpRequest,
    stream: web::Payload,
    service: web::Data<TelemetryService>,
) -> Result<HttpResponse> {
    let (response, mut session, _stream) =
        actix_ws::handle(&req, stream).map_err(|error| Error::Internal(format!("{error:?}")))?;

    let (mut receiver, history) = service.subscribe();

    rt::spawn(async move {
        for sample in history {
            if session.text(to_json(&sample)).await.is_err() {
                return;
            }
        }

        loop {
            match receiver.recv().await {
                Ok(sample) => {
                    if session.text(to_json(&sample)).await.is_err() {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Websocket client is too slow, {skipped} samples were dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }

        let _ = session.close(None).await;
    });

    Ok(response)
}

fn to_json(sample: &Sample) -> String {
    serde_json::json!(SampleResponse::from(sample)).to_string()
}

fn parse_local_time(value: &str) -> Result<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|error| {
        Error::BadRequest(format!(
            "Invalid time {value:?}, expected YYYY-MM-DD HH:MM:SS: {error}"
        ))
    })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::BadRequest(format!("Time {value:?} does not exist locally")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dashboard_time_format() {
        let time = parse_local_time("2024-05-01 12:30:45").unwrap();
        assert_eq!(time.format(TIMESTAMP_FORMAT).to_string(), "2024-05-01 12:30:45");

        assert!(matches!(
            parse_local_time("2024-05-01T12:30:45"),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn dashboard_page_is_embedded() {
        let page = load_file("index.html").unwrap();
        assert!(page.contains("/stats"));
    }
}
