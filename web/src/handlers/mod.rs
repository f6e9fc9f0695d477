//! HTTP request handlers shared by every deployment.

pub mod health;

pub use health::{health_check, readiness_check};
