//! Hub Notify - notification state and its synchronisation
//!
//! [`NotificationStore`] is the single in-memory view of the user's
//! notifications and unread counter. [`NotificationSync`] keeps it current
//! from paginated REST history, the realtime push channel, periodic
//! unread-count polling and optimistic read mutations.
//!
//! ```rust,ignore
//! use hub_notify::{NotificationApi, NotificationStore, NotificationSync};
//!
//! let store = NotificationStore::new();
//! let sync = NotificationSync::new(NotificationApi::new(auth), store.clone(), config.page_size)
//!     .with_poll_interval(config.unread_poll_interval());
//!
//! sync.load_first_page().await?;
//! tokio::spawn(sync.clone().run(realtime.subscribe(), shutdown_rx));
//!
//! sync.mark_as_read("n1").await?;
//! println!("{} unread", store.unread_count());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod api;
mod error;
mod store;
mod sync;

pub use api::*;
pub use error::*;
pub use store::*;
pub use sync::*;
