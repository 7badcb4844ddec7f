//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared configuration and logging primitives for Gridsight."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the Gridsight dashboard workspace.
//! This crate exposes configuration loading and tracing initialisation
//! consumed by the client crates and the dashboard binary.

pub mod config;
pub mod logging;

pub use config::{AdvisoryConfig, AppConfig, LoggingConfig, TelemetryConfig, UsageConfig};
pub use logging::{init_tracing, LogFormat};
