//! sessionguard - interactive driver for the authentication core.
//!
//! Restores any stored session, then reads commands from stdin and prints
//! every auth state transition as it happens.

mod commands;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{describe, Command, HELP};
use sessionguard_core::store::{DeviceSecret, SessionCipher};
use sessionguard_core::{AuthController, AuthState, Config, FileSessionStore, HttpAuthGateway};

/// Directory for a rolling log file; unset means stderr only
const LOG_DIR_ENV: &str = "SESSIONGUARD_LOG_DIR";

const LOG_FILE_PREFIX: &str = "sessionguard.log";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer on drop and must be held
/// for the life of the program.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    info!("sessionguard starting");

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let secret =
        DeviceSecret::load_or_create().context("Failed to read device secret from keychain")?;
    let cipher = SessionCipher::new(secret)?;
    let store = Arc::new(FileSessionStore::open(config.data_dir()?, cipher)?);
    let gateway = Arc::new(HttpAuthGateway::from_config(&config)?);

    let controller = AuthController::with_idle_timeout(store, gateway, config.idle_timeout());
    let background: Vec<JoinHandle<()>> = controller.startup_task().into_iter().collect();

    println!("{}", describe(&controller.state()));
    let printer = spawn_state_printer(&controller);

    let result = run(&controller, &mut config).await;

    // Let in-flight flows apply their final transition before exiting
    futures::future::join_all(background).await;
    printer.abort();

    info!("sessionguard shutting down");
    result
}

/// Print each state published by the controller
fn spawn_state_printer(controller: &AuthController) -> JoinHandle<()> {
    let mut state_rx = controller.subscribe_state();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            println!("[auth] {}", describe(&state));
        }
    })
}

async fn run(controller: &AuthController, config: &mut Config) -> Result<()> {
    loop {
        let Some(line) = prompt("> ").await? else {
            return Ok(());
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        match command {
            Command::Status => print_status(controller),
            Command::Login => login(controller, config).await?,
            Command::Validate => {
                if !controller.is_logged_in() {
                    println!("No stored session to validate");
                    continue;
                }
                controller.validate_token().await?;
                println!("Validation finished: {}", describe(&controller.state()));
            }
            Command::Logout => controller.logout().await?,
            Command::Touch => {
                controller.update_user_activity().await?;
                println!("Activity recorded");
            }
            Command::Reset => controller.reset_auth_state(),
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(()),
        }
    }
}

fn print_status(controller: &AuthController) {
    println!("State:   {}", describe(&controller.state()));
    println!("Session: {}", if controller.is_logged_in() { "stored" } else { "none" });
    if let Some(user) = controller.current_user() {
        println!("User:    {} <{}> (id {})", user.display_label(), user.email, user.id);
    }
}

async fn login(controller: &AuthController, config: &mut Config) -> Result<()> {
    let email = match &config.last_email {
        Some(last) => {
            let input = prompt(&format!("Email [{}]: ", last)).await?.unwrap_or_default();
            if input.is_empty() {
                last.clone()
            } else {
                input
            }
        }
        None => prompt("Email: ").await?.unwrap_or_default(),
    };

    let password = tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: "))
        .await?
        .context("Failed to read password")?;

    controller.login(email.clone(), password).await?;

    if matches!(controller.state(), AuthState::Success(_)) {
        if let Err(e) = Config::remember_email(&email) {
            warn!(error = %e, "Failed to save last used email");
        }
        config.last_email = Some(email);
    }
    Ok(())
}

/// Read one trimmed line from stdin; `None` at end of input
async fn prompt(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut input = String::new();
        io::stdin().read_line(&mut input).map(|read| (read, input))
    })
    .await??;

    match line {
        (0, _) => Ok(None),
        (_, input) => Ok(Some(input.trim().to_string())),
    }
}
