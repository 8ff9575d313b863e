//! API middleware components

pub mod gatekeeper;
pub mod session;

pub use gatekeeper::{gatekeeper, AuthenticatedKey};
pub use session::{OwnerSession, SessionAuth};
