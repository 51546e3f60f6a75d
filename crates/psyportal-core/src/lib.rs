//! # psyportal core
//!
//! Shared vocabulary for the patient client: typed backend records,
//! the explicit [`Session`](session::Session) context, configuration,
//! errors, and the trait seams every platform capability plugs into.

pub mod config;
pub mod error;
pub mod session;
pub mod traits;
pub mod types;

pub use config::PortalConfig;
pub use error::{PortalError, Result};
pub use session::{Session, SessionStore};
pub use types::{Category, PermissionState};
