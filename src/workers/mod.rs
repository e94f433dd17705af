//! Background loops that run alongside the HTTP server: the ERP outbox worker (C7) drains queued
//! purchase order pushes, the sync scheduler (C8) pulls incremental updates from the ERP.

pub mod erp_outbox_worker;
pub mod sync_scheduler;
