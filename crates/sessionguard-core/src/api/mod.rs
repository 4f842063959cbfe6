//! Remote authentication authority.
//!
//! This module provides the `AuthGateway` contract the controller calls
//! through, and `HttpAuthGateway`, a REST implementation of it.
//!
//! Only three remote operations are needed: authenticate, validate a
//! token, and revoke a token.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::HttpAuthGateway;
pub use error::{AuthError, UNKNOWN_ERROR_MESSAGE};
pub use gateway::AuthGateway;
