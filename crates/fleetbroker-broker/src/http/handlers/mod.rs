//! HTTP request handlers.

mod health;
mod instances;
mod last_operation;
mod management;

pub use health::{health_check, metrics_handler};
pub use instances::{deprovision, provision, update};
pub use last_operation::last_operation;
pub use management::manage_instance;
