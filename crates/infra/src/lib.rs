//! Infrastructure layer: config, persistence, provider gateways, notifications,
//! and the services that tie them to the payments domain.

pub mod config;
pub mod notify;
pub mod providers;
pub mod reconcile;
pub mod store;
pub mod submission;

pub use config::{AppConfig, ConfigError};
pub use reconcile::{ReconcileError, ReconcileReport, Reconciler};
pub use store::{JobBoardStore, StoreError};
pub use submission::{SubmissionError, SubmissionReceipt, SubmissionService};
