use crate::config::AppConfig;
use crate::entities::{
    award, integration_watermark, purchase_order, purchase_order_line, purchase_request,
    purchase_request_item, quote, quote_item, rfq, rfq_item, rfq_item_supplier,
    rfq_supplier_invite, status_event, sync_run, tenant,
};
use crate::errors::AppError;
use metrics::{counter, gauge};
use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Schema,
    Statement,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for database retry logic.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Determines if an error is retryable (transient).
fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::Conn(_) => true,
        DbErr::ConnectionAcquire(_) => true,
        DbErr::Query(ref runtime_err) => {
            let msg = runtime_err.to_string().to_lowercase();
            msg.contains("connection")
                || msg.contains("timeout")
                || msg.contains("broken pipe")
                || msg.contains("reset by peer")
                || msg.contains("deadlock")
        }
        _ => false,
    }
}

/// Execute a database operation with retry logic and exponential backoff.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempts < config.max_retries && is_retryable_error(&err) => {
                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    error = %err,
                    "retrying database operation after transient failure"
                );
                sleep(delay).await;
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
            Err(err) => return Err(err),
        }
    }
}

/// Type alias for a database connection pool. `DatabaseConnection` already pools internally.
pub type DbPool = DatabaseConnection;

/// Configuration for establishing a database connection.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub statement_timeout: Option<Duration>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
            statement_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
            statement_timeout: cfg.db_statement_timeout_secs.map(Duration::from_secs),
        }
    }
}

pub async fn establish_connection(database_url: &str) -> Result<DbPool, AppError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, AppError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(true);

    gauge!("procurement_db.max_connections", config.max_connections as f64);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await.map_err(AppError::system)?;

    if let Some(timeout) = config.statement_timeout {
        let backend = db_pool.get_database_backend();
        if backend == DbBackend::Postgres {
            let timeout_ms = timeout.as_millis() as i64;
            let sql = format!("SET statement_timeout = {}", timeout_ms);
            match db_pool.execute(Statement::from_string(backend, sql)).await {
                Ok(_) => info!("Statement timeout set to {}ms", timeout_ms),
                Err(e) => warn!("Failed to set statement timeout: {}", e),
            }
        }
    }

    info!("Database connection pool established successfully");
    Ok(db_pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, AppError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Creates every table from its sea-orm entity definition if it doesn't already exist. There
/// is no separate migrations directory: the entity models are the single source of truth for
/// schema, which keeps SQLite (used in tests) and Postgres (used in production) in lockstep.
async fn ensure_core_tables(pool: &DbPool) -> Result<(), AppError> {
    let backend = pool.get_database_backend();
    debug!(backend = ?backend, "ensuring core tables from entity schema");

    let schema = Schema::new(backend);
    let tables: Vec<(&'static str, TableCreateStatement)> = vec![
        ("tenants", schema.create_table_from_entity(tenant::Entity)),
        ("purchase_requests", schema.create_table_from_entity(purchase_request::Entity)),
        ("purchase_request_items", schema.create_table_from_entity(purchase_request_item::Entity)),
        ("rfqs", schema.create_table_from_entity(rfq::Entity)),
        ("rfq_items", schema.create_table_from_entity(rfq_item::Entity)),
        ("rfq_item_suppliers", schema.create_table_from_entity(rfq_item_supplier::Entity)),
        ("rfq_supplier_invites", schema.create_table_from_entity(rfq_supplier_invite::Entity)),
        ("quotes", schema.create_table_from_entity(quote::Entity)),
        ("quote_items", schema.create_table_from_entity(quote_item::Entity)),
        ("awards", schema.create_table_from_entity(award::Entity)),
        ("purchase_orders", schema.create_table_from_entity(purchase_order::Entity)),
        ("purchase_order_lines", schema.create_table_from_entity(purchase_order_line::Entity)),
        ("status_events", schema.create_table_from_entity(status_event::Entity)),
        ("sync_runs", schema.create_table_from_entity(sync_run::Entity)),
        ("integration_watermarks", schema.create_table_from_entity(integration_watermark::Entity)),
    ];

    for (name, mut table) in tables {
        table.if_not_exists();
        let statement = backend.build(&table);
        if let Err(err) = pool.execute(statement).await {
            warn!(table = name, "failed to ensure existence of table `{}`: {}", name, err);
            return Err(AppError::system(err));
        }
    }

    Ok(())
}

/// Ensures the schema exists. Called once at startup (and by the test harness against an
/// in-memory SQLite database).
pub async fn run_migrations(pool: &DbPool) -> Result<(), AppError> {
    info!("Ensuring database schema");
    let start = std::time::Instant::now();
    ensure_core_tables(pool).await?;
    info!("Schema verified in {:?}", start.elapsed());
    Ok(())
}

pub async fn check_connection(pool: &DbPool) -> Result<(), AppError> {
    debug!("Checking database connection");
    let start = std::time::Instant::now();

    let result = pool.ping().await.map_err(AppError::system);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!("procurement_db.connection_latency_ms", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!("Database connection check failed after {:?}: {}", elapsed, e);
            counter!("procurement_db.connection_failures", 1);
        }
    }

    result
}

pub async fn close_pool(pool: DbPool) -> Result<(), AppError> {
    info!("Closing database connection pool");
    pool.close().await.map_err(AppError::system)
}
