use crate::{db::DbPool, errors::AppError, events::EventSender};
use async_trait::async_trait;
use std::sync::Arc;

/// Command pattern: each business operation is one object that validates its own input,
/// executes against the database inside a transaction, and emits the domain events that
/// result. Handlers build a command from the request and hand it to `execute`.
#[async_trait]
pub trait Command: Send + Sync {
    type Result;

    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError>;
}

pub mod procurement;
