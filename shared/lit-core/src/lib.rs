//! Lit Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - The service lifecycle trait the HTTP services implement
//! - Domain types for sentiment samples and computed summaries
//! - Error handling utilities

pub mod domain;
pub mod error;
pub mod service;

pub use domain::*;
pub use error::{LitError, Result};
pub use service::{DependencyStatus, HealthStatus, ManagedService, ReadinessStatus, ServiceRuntime};
