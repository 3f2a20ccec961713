use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use chrono::Utc;
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use repairshop_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Payment processor client
    let provider: Arc<dyn api::payments::PaymentProvider> =
        Arc::new(api::payments::stripe::StripeGateway::new(&cfg)?);

    // Confirmation email transport; log-only when no endpoint is configured
    let notifier: Arc<dyn api::services::notifications::Notifier> =
        match cfg.notifier_email_endpoint.clone() {
            Some(endpoint) => {
                info!("Email notifier configured: {}", endpoint);
                Arc::new(api::services::notifications::HttpEmailNotifier::new(
                    endpoint,
                    cfg.notifier_api_key.clone(),
                    cfg.notifier_from_address.clone(),
                )?)
            }
            None => {
                info!("Email notifier not configured; confirmations will be logged only");
                Arc::new(api::services::notifications::LogNotifier)
            }
        };

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        event_sender.clone(),
        provider,
        notifier,
    );

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        event_sender,
        services,
    };

    // Sweep stale optimistic orders to abandoned
    if cfg.checkout_abandoned_after_secs > 0 {
        let sweep_db = db_arc.clone();
        let abandoned_after = cfg.checkout_abandoned_after_secs;
        let sweep_interval = cfg.checkout_sweep_interval_secs.max(1);
        tokio::spawn(async move {
            let repo = api::repositories::OrderRepository::new(sweep_db);
            let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval));
            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - chrono::Duration::seconds(abandoned_after as i64);
                match repo.mark_abandoned_older_than(cutoff).await {
                    Ok(0) => {}
                    Ok(count) => warn!(count, "marked stale checkout orders abandoned"),
                    Err(e) => error!("abandoned-order sweep failed: {}", e),
                }
            }
        });
    } else {
        info!("Abandoned-order sweep disabled (checkout_abandoned_after_secs = 0)");
    }

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into());
    };

    // Build router: status/health + v1 API + Swagger UI
    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "repairshop-api up" }))
        .nest("/api/v1", api::api_v1_routes())
        .nest("/health", api::handlers::health::health_routes())
        .merge(api::openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("repairshop-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
