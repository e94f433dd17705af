use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use procurement_orchestrator::config::AppConfig;
use procurement_orchestrator::db::{self, DbPool};
use procurement_orchestrator::events::{self, EventSender};

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A SQLite-backed database plus a running event sink, shared by the command-layer tests.
/// Uses a uniquely named on-disk file rather than `sqlite::memory:`: an in-memory database is
/// scoped to a single connection, and a pool with more than one connection would silently see
/// a different, empty database on each checkout. A single-connection pool against a real file
/// keeps every query in a test on the same schema, so the pool is pinned to a single
/// connection here.
pub struct TestDb {
    pub pool: Arc<DbPool>,
    pub event_sender: Arc<EventSender>,
    db_file: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestDb {
    pub async fn new() -> Self {
        let n = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let db_file = format!("procurement_test_{}_{}.db", std::process::id(), n);
        let _ = std::fs::remove_file(&db_file);

        let cfg = AppConfig {
            database_url: format!("sqlite://{db_file}?mode=rwc"),
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: 10,
            db_idle_timeout_secs: 60,
            db_acquire_timeout_secs: 10,
            ..Default::default()
        };

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations against test database");

        let (tx, rx) = tokio::sync::mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(tx));
        let event_task = tokio::spawn(events::process_events(rx));

        Self {
            pool: Arc::new(pool),
            event_sender,
            db_file,
            _event_task: event_task,
        }
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        self._event_task.abort();
        let _ = std::fs::remove_file(&self.db_file);
    }
}
