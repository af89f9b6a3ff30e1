//! Capability & Service Orchestration Core
//!
//! A library for declaring HTTP-shaped "capabilities" and long-lived "service
//! capabilities" over tools advertised by an external aggregator, and for
//! orchestrating the create/delete lifecycle of service instances derived
//! from those declarations.
//!
//! # Scope
//!
//! This crate does not itself aggregate tools, transport JSON-RPC, or expose
//! a network surface. It consumes two small external interfaces —
//! [`tool_iface::ToolAvailabilityOracle`] and [`tool_iface::ToolCaller`] — and
//! builds capability definitions, a parameter templater, and a service
//! instance orchestrator on top of them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution_adapter;
pub mod orchestrator;
pub mod protocol;
pub mod templater;
pub mod tool_iface;

pub use error::{Error, Result};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
