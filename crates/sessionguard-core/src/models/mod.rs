//! Data models for authenticated users and their sessions.
//!
//! - `User`: identity record returned by the remote authority
//! - `Credentials`: transient login input, never persisted
//! - `Authenticated`: a user together with the token issued for it
//! - `Session`: the locally persisted proof of authentication

pub mod session;
pub mod user;

pub use session::Session;
pub use user::{Authenticated, Credentials, User};
