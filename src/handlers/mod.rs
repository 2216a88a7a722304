// Gateway module - controls public API for handlers
// Modules are private, only exported symbols are public

mod data;
mod health;
mod metrics;
mod root;
mod shared_types;

// Core handlers
pub use metrics::{metrics_handler, metrics_summary_handler};
pub use root::{api_root_handler, root_handler};
pub use shared_types::not_found;

// Health probes
pub use health::{database_status, detailed_health_check, health_check, liveness_check, readiness_check};

// Data item CRUD handlers
pub use data::{create_item, database_health, delete_item, get_item, list_items, simulate_load, statistics, update_item};
