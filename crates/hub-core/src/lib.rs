//! Hub Core - shared building blocks for the ProjectHub client core
//!
//! This crate holds the pieces every other client crate agrees on:
//!
//! - **Data model**: [`Notification`] and the REST wire types around it
//! - **Backoff**: [`BackoffPolicy`] for capped exponential reconnection delays
//! - **Configuration**: [`ClientConfig`] with the API and realtime origins
//! - **Telemetry**: [`telemetry::init_tracing`] for structured logging
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hub_core::{ClientConfig, telemetry};
//!
//! telemetry::init_tracing(false);
//! let config = ClientConfig::from_env()?;
//! config.validate()?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod backoff;
mod config;
mod error;
mod notification;
pub mod telemetry;

pub use backoff::*;
pub use config::*;
pub use error::*;
pub use notification::*;

/// Name of the single push event carrying a [`Notification`] payload.
pub const NOTIFICATION_EVENT: &str = "notification";
