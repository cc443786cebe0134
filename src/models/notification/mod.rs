//! Notification model for the orchestrator webhook.
//!
//! After a job reaches a successful terminal result, the worker tells the
//! orchestrator which transaction settled the property or transfer record.

mod webhook_notification;
pub use webhook_notification::*;
