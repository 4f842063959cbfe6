//! Authentication state machine.
//!
//! This module provides:
//! - `AuthState`: the observable phase of the latest auth operation
//! - `AuthController`: runs login, validate and logout flows and publishes state
//!
//! A stored session is trusted at startup and confirmed in the background.

pub mod controller;
pub mod state;

pub use controller::AuthController;
pub use state::AuthState;
