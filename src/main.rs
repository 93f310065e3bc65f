//! DNAi Backend Server
//!
//! Dashboard statistics, credits, coupons, payments and account
//! verification for the DNAi voice-agent platform.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::{bail, Context};
use dnai_api::{
    configure_accounts, configure_coupons, configure_credits, configure_dashboard,
    configure_notifications, configure_packages, configure_payments, health_check,
};
use dnai_auth::JwtService;
use dnai_core::AppConfig;
use dnai_db::create_pool;
use dnai_services::{SendGridEmailSender, StripeGateway, TwilioSmsSender};
use std::env;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TOKEN_EXPIRATION_SECS: i64 = 3600;

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            // Dashboard stats, recent calls and selectors
            .configure(configure_dashboard)
            .configure(configure_credits)
            .configure(configure_coupons)
            .configure(configure_packages)
            // Checkout, verification and the Stripe webhook
            .configure(configure_payments)
            .configure(configure_accounts)
            .configure(configure_notifications),
    );
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "dnai_backend={0},dnai_api={0},dnai_services={0},dnai_db={0},dnai_auth={0},actix_web=info,sqlx=warn",
            log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting DNAi Backend v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;

    let report = config.validate();
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    if !report.is_valid() {
        for problem in &report.errors {
            error!("{}", problem);
        }
        bail!("invalid configuration: {}", report.errors.join(", "));
    }

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("failed to create database pool")?;
    info!(
        "Database connection established with {} max connections",
        config.database.max_connections
    );

    let jwt_service = web::Data::new(JwtService::new(
        &config.auth.jwt_secret,
        &config.auth.audience,
        TOKEN_EXPIRATION_SECS,
    ));
    let stripe = web::Data::new(StripeGateway::new(&config.stripe)?);
    let email = web::Data::new(SendGridEmailSender::new(&config.email)?);
    let sms = web::Data::new(TwilioSmsSender::new(&config.sms)?);
    let pool = web::Data::new(pool);

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    let cors_origins = config.server.cors_origins.clone();
    let config = web::Data::new(config);

    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                header::COOKIE,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(pool.clone())
            .app_data(jwt_service.clone())
            .app_data(stripe.clone())
            .app_data(email.clone())
            .app_data(sms.clone())
            .app_data(config.clone())
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message
                    })),
                )
                .into()
            }))
            .wrap(cors)
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
