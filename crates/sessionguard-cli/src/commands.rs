//! Command parsing and state formatting for the interactive prompt.

use sessionguard_core::AuthState;

/// A line typed at the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Login,
    Validate,
    Logout,
    Touch,
    Reset,
    Help,
    Quit,
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, String> {
        match input.trim().to_lowercase().as_str() {
            "" | "status" | "s" => Ok(Command::Status),
            "login" | "l" => Ok(Command::Login),
            "validate" | "v" => Ok(Command::Validate),
            "logout" | "o" => Ok(Command::Logout),
            "touch" | "t" => Ok(Command::Touch),
            "reset" | "r" => Ok(Command::Reset),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(format!("Unknown command: {} (type 'help')", other)),
        }
    }
}

pub const HELP: &str = "\
Commands:
  status   (s)  show auth state and stored session
  login    (l)  log in with email and password
  validate (v)  check the stored token with the server
  logout   (o)  log out and clear the stored session
  touch    (t)  record user activity
  reset    (r)  reset auth state to idle
  quit     (q)  exit";

/// One-line description of an auth state
pub fn describe(state: &AuthState) -> String {
    match state {
        AuthState::Idle => "Idle".to_string(),
        AuthState::Loading => "Working...".to_string(),
        AuthState::Success(user) => {
            format!("Logged in as {} <{}>", user.display_label(), user.email)
        }
        AuthState::Error(message) => format!("Error: {}", message),
        AuthState::LoggedOut => "Logged out".to_string(),
    }
}
