pub mod http;
mod service;

pub use service::{RecoveryError, RecoveryLimiters, RecoveryOptions, RecoveryService};
