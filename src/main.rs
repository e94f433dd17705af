use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use procurement_orchestrator::circuit_breaker::CircuitBreaker;
use procurement_orchestrator::config::{self, ErpMode};
use procurement_orchestrator::db;
use procurement_orchestrator::erp::{
    csv::CsvErpGateway, http::HttpErpGateway, mock::MockErpGateway, ErpGateway,
};
use procurement_orchestrator::events::{self, EventSender};
use procurement_orchestrator::handlers::{self, AppState};
use procurement_orchestrator::workers::erp_outbox_worker::ErpOutboxWorker;
use procurement_orchestrator::workers::sync_scheduler::SyncScheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config()?;
    config::init_tracing(&config.log_level, config.log_json);

    info!("procurement orchestrator starting");

    let db_pool = db::establish_connection_from_app_config(&config).await.map_err(|e| {
        error!("failed to connect to database: {}", e);
        e
    })?;
    db::run_migrations(&db_pool).await?;
    let db_pool = Arc::new(db_pool);

    let (event_tx, event_rx) = tokio::sync::mpsc::channel(256);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(events::process_events(event_rx));

    let gateway: Arc<dyn ErpGateway> = match config.erp.mode {
        ErpMode::Mock => Arc::new(MockErpGateway::new()),
        ErpMode::SeniorCsv => Arc::new(CsvErpGateway::new(&config.erp)),
        ErpMode::SeniorHttp => Arc::new(HttpErpGateway::new(&config.erp)),
    };

    let outbox_circuit = CircuitBreaker::new(config.erp_circuit.clone());
    let outbox_worker = Arc::new(ErpOutboxWorker::new(
        db_pool.clone(),
        gateway.clone(),
        outbox_circuit,
        config.erp_outbox.clone(),
        event_sender.clone(),
    ));
    tokio::spawn(async move { outbox_worker.run_forever(None).await });

    let sync_scheduler = Arc::new(SyncScheduler::new(
        db_pool.clone(),
        gateway.clone(),
        config.sync_scheduler.clone(),
    ));
    {
        let scheduler = sync_scheduler.clone();
        tokio::spawn(async move { scheduler.run_forever().await });
    }

    let cors = if config.should_allow_permissive_cors() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let state = AppState {
        db: db_pool,
        event_sender,
        config: Arc::new(config.clone()),
        sync_scheduler,
        started_at: std::time::Instant::now(),
    };

    let app: Router = handlers::routes()
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
