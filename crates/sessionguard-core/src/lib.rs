//! Authentication and session lifecycle core.
//!
//! - `models`: `User`, `Credentials`, `Session` value types
//! - `store`: the `SessionStore` contract plus in-memory and encrypted file stores
//! - `api`: the `AuthGateway` contract plus an HTTP implementation
//! - `auth`: the `AuthController` state machine and its observable `AuthState`
//! - `config`: on-disk application configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod store;

pub use api::{AuthError, AuthGateway, HttpAuthGateway};
pub use auth::{AuthController, AuthState};
pub use config::Config;
pub use models::{Authenticated, Credentials, Session, User};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StorageError};
