use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{
    error::{JsonPayloadError, QueryPayloadError},
    web, App, HttpRequest, HttpServer,
};
use tracing::*;
use tracing_actix_web::TracingLogger;

use super::{error::Error, pages};
use crate::telemetry::TelemetryService;

fn json_error_handler(error: JsonPayloadError, _: &HttpRequest) -> actix_web::Error {
    warn!("Problem with json: {error}");
    error.into()
}

fn query_error_handler(error: QueryPayloadError, _: &HttpRequest) -> actix_web::Error {
    warn!("Problem with query: {error}");
    Error::BadRequest(error.to_string()).into()
}

// Start REST API server with the desired address
pub async fn run(server_address: &str, service: Arc<TelemetryService>) -> std::io::Result<()> {
    let service = web::Data::from(service);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .send_wildcard()
                    .max_age(3600),
            )
            .wrap(TracingLogger::default())
            .app_data(service.clone())
            .configure(configure)
    })
    .bind(server_address)?
    .run()
    .await
}

/// Registers every route, expecting the [`TelemetryService`] to be available
/// as `web::Data`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        // Versioned API routes (canonical)
        .service(web::scope("/v1").configure(configure_api_routes))
        // Flat routes, the dashboard page polls these
        .configure(configure_api_routes)
        // Static file serving (catch-all, must be last so API routes match first)
        .route("/", web::get().to(pages::root))
        .route(r"/{filename:.+}", web::get().to(pages::root));
}

/// Register all API routes on a `ServiceConfig`.
/// Used for both the `/v1` scope and the flat routes.
fn configure_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/stats", web::get().to(pages::stats))
        .route("/stats/ws", web::get().to(pages::stats_ws))
        .route("/history", web::get().to(pages::history))
        .route("/status", web::get().to(pages::status))
        .route("/info", web::get().to(pages::info));
}
