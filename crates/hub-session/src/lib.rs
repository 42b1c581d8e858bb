//! Hub Session - credential ownership and authenticated requests
//!
//! - [`CredentialStore`]: the current access credential plus the
//!   authentication flag, observable through a `watch` channel
//! - [`RestTransport`]: reqwest-backed transport for the REST contract
//! - [`Authenticator`]: attaches the bearer credential to every call and
//!   recovers from expired credentials with a single-flight refresh
//!
//! ```rust,ignore
//! use hub_session::{ApiRequest, Authenticator, CredentialStore, RestTransport};
//!
//! let credentials = CredentialStore::new();
//! credentials.sign_in("access-token");
//!
//! let transport = RestTransport::new(config.api_base_url.clone(), config.request_timeout())?;
//! let auth = Authenticator::new(transport, credentials.clone());
//!
//! let projects: serde_json::Value = auth.execute_json(ApiRequest::get("/projects")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod authenticator;
mod credentials;
mod error;
mod request;

pub use authenticator::*;
pub use credentials::*;
pub use error::*;
pub use request::*;

/// Path of the cookie-authenticated refresh endpoint.
pub const REFRESH_PATH: &str = "/auth/refresh";
