mod app;
mod cli;
mod config;
mod deeplink;
mod focus;
mod host;
mod ipc;
mod logging;
mod monitor;
mod notify;
mod session;
mod terminal;

use anyhow::{bail, Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::env;
use std::panic;
use std::path::Path;

use crate::app::App;
use crate::cli::Command;
use crate::config::{Overrides, Settings};
use crate::ipc::ControlMessage;

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// One dim line telling the user how to reach this instance
fn print_instance_banner(instance: &str, log: Option<&Path>) {
    match log {
        Some(log) => println!("{DIM}oscbell {instance} · log {}{RESET}", log.display()),
        None => println!("{DIM}oscbell {instance}{RESET}"),
    }
}

fn setup_panic_handler() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        original_hook(panic_info);
    }));
}

/// Generate a unique id for this instance
fn generate_instance_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    format!("{:x}{:x}", pid, timestamp % 0xFFFFFFFF)
}

/// Set up logging for a new instance. Logging is best effort.
fn start_instance() -> (String, Option<std::path::PathBuf>) {
    let instance = generate_instance_id();
    // Children can address this instance (oscbell disable $OSCBELL_INSTANCE)
    env::set_var("OSCBELL_INSTANCE", &instance);
    let log = match logging::init(&instance) {
        Ok(path) => Some(path),
        Err(e) => {
            eprintln!("Warning: {:#}", e);
            None
        }
    };
    (instance, log)
}

async fn run(program: String, args: Vec<String>, overrides: Overrides) -> Result<i32> {
    let (instance, log) = start_instance();
    print_instance_banner(&instance, log.as_deref());

    setup_panic_handler();
    enable_raw_mode().context("Failed to enable raw mode")?;

    let mut app = App::new(instance, overrides);
    let result = app.run_wrapped(&program, &args).await;

    disable_raw_mode()?;
    app.shutdown().await;

    let code = result?;
    Ok(code as i32)
}

async fn watch(name: Option<String>, pane: Option<String>, overrides: Overrides) -> Result<()> {
    let (instance, _) = start_instance();
    // stdin is a pipe; there is no terminal of ours to draw a banner on
    let overrides = Overrides {
        in_app: Some(false),
        default_title: name,
        ..overrides
    };

    let mut app = App::new(instance, overrides);
    let result = app.watch(pane).await;
    app.shutdown().await;
    result
}

async fn focus(uri: &str) -> Result<()> {
    let link = deeplink::parse_focus_uri(uri).context("Not an oscbell focus link")?;
    let reply = ipc::send(&link.instance, &ControlMessage::Focus { token: link.token }).await?;
    if !reply.ok {
        bail!("Focus failed: {}", reply.detail.unwrap_or_default());
    }
    Ok(())
}

async fn control(instance: &str, message: ControlMessage) -> Result<()> {
    let reply = ipc::send(instance, &message).await?;
    let detail = reply.detail.unwrap_or_default();
    if !reply.ok {
        bail!("{}", detail);
    }
    println!("{}: {}", instance, detail);
    Ok(())
}

fn init_config() -> Result<()> {
    let path = Settings::config_path()?;
    let settings = Settings::load_from(&path)?;
    settings.save_to(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{:#}\n\n{}", e, cli::USAGE);
            std::process::exit(2);
        }
    };

    match args.command {
        Command::Help => {
            println!("{}", cli::USAGE);
            Ok(())
        }
        Command::InitConfig => init_config(),
        Command::Focus { uri } => focus(&uri).await,
        Command::Enable { instance } => control(&instance, ControlMessage::Enable).await,
        Command::Disable { instance } => control(&instance, ControlMessage::Disable).await,
        Command::Reload { instance } => control(&instance, ControlMessage::Reload).await,
        Command::Watch { name, pane } => watch(name, pane, args.overrides).await,
        Command::Run { program, args: program_args } => {
            let code = run(program, program_args, args.overrides).await?;
            std::process::exit(code);
        }
    }
}
