//! Salon booking server
//!
//! Wires PostgreSQL, Redis, the collaborator clients and the payment gateways
//! into the booking services and serves them over HTTP.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use salon_api::AppState;
use salon_cache::RedisCache;
use salon_core::traits::{
    BookingLifecycle, BookingRepository, BranchConfigRepository, CatalogService, Clock,
    HistoryRepository, IdempotencyRepository, IdentityService, NotificationDispatcher,
    PaymentRepository, RefundRepository, SystemClock,
};
use salon_core::AppConfig;
use salon_db::{
    create_pool, run_migrations, PgBookingRepository, PgBranchConfigRepository,
    PgHistoryRepository, PgIdempotencyRepository, PgPaymentRepository, PgRefundRepository,
};
use salon_services::{
    spawn_worker, AvailabilityService, BookingManager, BranchPolicyResolver, GatewayRegistry,
    HttpCatalogClient, HttpIdentityClient, LogNotifier, NotificationQueue, PaymentOrchestrator,
    WebhookNotifier,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "salon_booking={},salon_api={},salon_services={},salon_db={},salon_cache={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level, log_level
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

/// Periodically fail abandoned payments and purge stale idempotency records
fn spawn_sweeper(payments: Arc<PaymentOrchestrator<RedisCache>>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = payments.sweep_expired().await {
                error!("Expiry sweep failed: {}", e);
            }
        }
    });
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting salon booking server v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    info!("Connecting to Redis...");
    let cache = Arc::new(
        RedisCache::new(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?,
    );
    cache.ping().await.context("Redis did not answer PING")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Storage
    let booking_repo: Arc<dyn BookingRepository> = Arc::new(PgBookingRepository::new(pool.clone()));
    let history_repo: Arc<dyn HistoryRepository> = Arc::new(PgHistoryRepository::new(pool.clone()));
    let branch_repo: Arc<dyn BranchConfigRepository> =
        Arc::new(PgBranchConfigRepository::new(pool.clone()));
    let payment_repo: Arc<dyn PaymentRepository> = Arc::new(PgPaymentRepository::new(pool.clone()));
    let refund_repo: Arc<dyn RefundRepository> = Arc::new(PgRefundRepository::new(pool.clone()));
    let idempotency_repo: Arc<dyn IdempotencyRepository> =
        Arc::new(PgIdempotencyRepository::new(pool.clone()));

    // Collaborators
    let identity: Arc<dyn IdentityService> = Arc::new(HttpIdentityClient::new(&config.collaborators)?);
    let catalog: Arc<dyn CatalogService> = Arc::new(HttpCatalogClient::new(&config.collaborators)?);

    let dispatcher: Arc<dyn NotificationDispatcher> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_millis(config.collaborators.timeout_ms),
        )?),
        None => {
            warn!("No notification webhook configured, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let (queue, receiver) = NotificationQueue::new(config.notifications.queue_capacity);
    spawn_worker(receiver, identity.clone(), dispatcher);

    // Services
    let policy = Arc::new(BranchPolicyResolver::new(
        branch_repo,
        cache.clone(),
        config.booking.clone(),
    ));
    let availability = Arc::new(AvailabilityService::new(
        catalog.clone(),
        booking_repo.clone(),
        policy.clone(),
        clock.clone(),
        config.booking.slot_interval_minutes,
    ));
    let bookings = Arc::new(BookingManager::new(
        booking_repo,
        history_repo,
        identity,
        catalog,
        policy.clone(),
        availability.clone(),
        queue,
        clock.clone(),
    ));

    let gateways = GatewayRegistry::from_config(&config.payments)?;
    info!("Payment gateways configured: {:?}", gateways.names());

    let lifecycle: Arc<dyn BookingLifecycle> = bookings.clone();
    let payments = Arc::new(PaymentOrchestrator::new(
        payment_repo,
        refund_repo,
        idempotency_repo,
        cache,
        Arc::new(gateways),
        lifecycle,
        clock,
        config.payments.clone(),
    ));

    spawn_sweeper(payments.clone(), config.payments.sweep_interval_secs);

    let state = web::Data::new(AppState::new(bookings, payments, availability, policy));

    let cors_origins = env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
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
            .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_body",
                        "kind": "validation",
                        "retryable": false,
                        "message": error_message,
                        "status": 400
                    })),
                )
                .into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "kind": "validation",
                        "retryable": false,
                        "message": error_message,
                        "status": 400
                    })),
                )
                .into()
            }))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(salon_api::configure::<RedisCache>)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(config.server.workers)
    .client_request_timeout(Duration::from_secs(config.server.timeout_secs))
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
