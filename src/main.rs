use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer,
};
use anyhow::{anyhow, Context, Result};
use busline::config::AppConfig;
use busline::middleware::AuthSettings;
use busline::services::email::TemplateRenderer;
use busline::services::store::PgBookingStore;
use busline::services::ticket::TicketService;
use busline::{configure_routes, not_found};
use dotenv::dotenv;
use log::{error, info};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    info!("Starting Busline Ticketing API v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            error!("Please set the required variables in your .env file or environment");
            std::process::exit(1);
        }
    };

    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600)) // 10 minutes idle timeout
        .max_lifetime(Duration::from_secs(1800)) // 30 minutes max lifetime
        .connect(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Database migration failed")?;
    info!("Database migrations completed successfully");

    let gateway = config.gateway.build_gateway()?;
    let notifier = config.build_notifier();

    let ticket_service = web::Data::new(
        TicketService::new(
            PgBookingStore::new(db_pool.clone()),
            gateway,
            config.gateway.credential.clone(),
            TemplateRenderer::new().context("Failed to register email templates")?,
        )
        .with_gateway_timeout(config.gateway.timeout),
    );
    let notifier = web::Data::new(notifier);
    let auth_settings = web::Data::new(AuthSettings::new(config.jwt_secret.clone()));

    // 100 requests per minute per IP, bursts of 20
    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(100)
        .burst_size(20)
        .finish()
        .ok_or_else(|| anyhow!("Invalid rate limiter configuration"))?;

    let bind_address = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting HTTP server on {}", bind_address);
    info!("API documentation available at: http://{}/api", bind_address);

    let cors_origins = config.cors_allowed_origins.clone();

    HttpServer::new(move || {
        let origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Content-Type", "Authorization", "Accept", "Origin"])
            .max_age(3600);

        App::new()
            .app_data(ticket_service.clone())
            .app_data(notifier.clone())
            .app_data(auth_settings.clone())
            .app_data(web::JsonConfig::default()
                .limit(64 * 1024)
                .error_handler(|err, _req| {
                    error!("JSON payload error: {}", err);
                    actix_web::error::InternalError::from_response(
                        err,
                        HttpResponse::BadRequest().json(json!({
                            "error": "invalid_payload",
                            "message": "Request body contains invalid JSON or exceeds size limit"
                        })),
                    )
                    .into()
                }))
            .wrap(cors)
            .wrap(Governor::new(&governor_conf))
            .wrap(Compress::default())
            .wrap(Logger::new(r#"%a "%r" %s %b "%{Referer}i" "%{User-Agent}i" %T"#))
            .wrap(DefaultHeaders::new()
                .add(("X-Content-Type-Options", "nosniff"))
                .add(("X-Frame-Options", "DENY"))
                .add(("Referrer-Policy", "strict-origin-when-cross-origin")))
            .configure(configure_routes::<PgBookingStore>)
            .default_service(web::route().to(not_found))
    })
    .bind(bind_address)?
    .workers(num_cpus::get())
    .shutdown_timeout(30)
    .run()
    .await?;

    Ok(())
}
