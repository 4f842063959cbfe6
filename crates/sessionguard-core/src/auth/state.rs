use serde::{Deserialize, Serialize};

use crate::models::User;

/// Observable phase of the most recent authentication operation.
///
/// Independent of whether a session is stored: on a cold start a session can
/// exist while the state is still `Idle`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum AuthState {
    #[default]
    Idle,
    Loading,
    Success(User),
    Error(String),
    LoggedOut,
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Success(user) => Some(user),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            AuthState::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Short name for logs; never includes user data
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Idle => "idle",
            AuthState::Loading => "loading",
            AuthState::Success(_) => "success",
            AuthState::Error(_) => "error",
            AuthState::LoggedOut => "logged_out",
        }
    }
}
