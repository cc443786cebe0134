//! Routes and defaults for the offchain registry API and the orchestrator webhook.

pub const DEFAULT_OFFCHAIN_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_OFFCHAIN_API_TIMEOUT_MS: u64 = 120_000;

pub const REGISTER_PROPERTY_PATH: &str = "/api/properties/register";
pub const CONFIGURE_TRANSFER_PATH: &str = "/api/transfers/configure";
pub const APPROVE_TRANSFER_PATH: &str = "/api/transfers/approve";
pub const ACCEPT_TRANSFER_PATH: &str = "/api/transfers/accept";
pub const EXECUTE_TRANSFER_PATH: &str = "/api/transfers/execute";
pub const REGISTER_APPROVER_PATH: &str = "/api/approvers/register";
pub const FREEZE_PROPERTY_PATH: &str = "/api/admin/freeze-property";
pub const UNFREEZE_PROPERTY_PATH: &str = "/api/admin/unfreeze-property";

pub const DEFAULT_ORCHESTRATOR_URL: &str = "http://core-orchestrator-app:8080";
pub const DEFAULT_WEBHOOK_API_KEY: &str = "development-webhook-key-12345";
pub const WEBHOOK_TIMEOUT_MS: u64 = 10_000;
pub const WEBHOOK_API_KEY_HEADER: &str = "X-Api-Key";
