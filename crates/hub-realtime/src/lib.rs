//! Hub Realtime - the push channel bound to the authenticated session
//!
//! [`ConnectionManager`] keeps at most one live push link while the user is
//! signed in, reconnects with capped exponential backoff after drops, and
//! gives up in [`ConnectionState::Failed`] once the retry budget is spent.
//! The wire is behind the [`Connector`] / [`PushLink`] seam; [`WsConnector`]
//! is the WebSocket implementation.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hub_realtime::{ConnectionManager, RealtimeEvent, WsConnector};
//!
//! let connector = WsConnector::new(config.realtime_url.clone())
//!     .with_ping_interval(config.realtime.ping_interval());
//! let handle = ConnectionManager::new(config.realtime.clone(), Arc::new(connector), credentials.subscribe())
//!     .spawn();
//!
//! let mut events = handle.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let RealtimeEvent::Notification(n) = event {
//!         store.add_notification(n);
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod connector;
mod error;
mod frame;
mod manager;
mod ws;

pub use connector::*;
pub use error::*;
pub use frame::*;
pub use manager::*;
pub use ws::*;
