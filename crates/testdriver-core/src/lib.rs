pub mod action;
pub mod actions;
pub mod codes;
pub mod config;
pub mod driver;
pub mod error;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod script;
pub mod services;
pub mod store;

pub use action::{Action, ActionConfig, ActionContext, ActionKind, Outcome, Runtime};
pub use config::DriverConfig;
pub use driver::{TestDriver, TestPlan};
pub use error::{DriverError, Result};
pub use registry::{default_registry, ActionRegistry};
pub use report::TestReport;
pub use store::{Closeable, Variable, VariableStore};
