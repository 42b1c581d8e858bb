//! Hub Client - the session context of the ProjectHub client core
//!
//! [`ClientSession`] wires the pieces of the other crates together: a
//! credential store, the refreshing authenticator, the realtime connection
//! manager and the notification store with its sync protocol. Signing in
//! starts the push channel and loads notifications; signing out or session
//! expiry tears both down.
//!
//! ```rust,ignore
//! use hub_client::ClientSession;
//! use hub_core::{ClientConfig, telemetry};
//!
//! telemetry::init_tracing(false);
//! let session = ClientSession::new(ClientConfig::from_env()?)?;
//!
//! session.login(&access_token).await?;
//! let mut unread = session.notifications().subscribe_unread();
//! while unread.changed().await.is_ok() {
//!     println!("{} unread", *unread.borrow_and_update());
//! }
//!
//! session.logout().await;
//! session.shutdown().await;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod session;

pub use error::*;
pub use session::*;
