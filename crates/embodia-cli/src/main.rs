//! `embodia` – interactive perception-to-action shell.
//!
//! This binary wires one agent session around the simulated rig:
//!
//! 1. Loads `~/.embodia/config.toml`, writing the defaults on first run, and
//!    applies `EMBODIA_*` environment overrides.
//! 2. Starts a [`Session`] against the configured OpenAI-compatible model
//!    server.
//! 3. Runs the REPL on its own thread as the speech and camera producer.
//! 4. Intercepts **Ctrl-C** to stop after the current round; the session
//!    parks every actuator before the process exits.

mod config;
mod console;
mod repl;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{error, warn};

use embodia_hal::sim::SimRigBuilder;
use embodia_middleware::perception_channel;
use embodia_runtime::{Session, SessionEnd, init_tracing};

use crate::console::ConsoleResponder;

fn main() -> ExitCode {
    // Hold the guard until exit so pending spans are flushed.
    let _tracing = init_tracing("embodia");

    print_banner();

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    println!(
        "  Reasoning backend {} (model {})",
        cfg.backend_url.dimmed(),
        cfg.model.bold()
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    let (bus, streams) = perception_channel(cfg.queue_capacity.max(1));
    let (registry, _journal) = SimRigBuilder::full(cfg.scene.clone()).build();

    let session = Session::new(
        cfg.session_config(),
        &bus,
        streams,
        registry,
        Arc::new(cfg.driver()),
        Box::new(ConsoleResponder),
    );
    let mut session = match session {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Could not start the session".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = session.shutdown_handle();
    let shutdown_ctrlc = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – stopping after the current round …".yellow().bold()
        );
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let scene = cfg.scene.clone();
    let repl_shutdown = Arc::clone(&shutdown);
    let spawned = std::thread::Builder::new()
        .name("repl".into())
        .spawn(move || repl::run(bus, scene, repl_shutdown));
    if let Err(e) = spawned {
        println!("{}: {}", "Could not start the REPL".red(), e);
        return ExitCode::FAILURE;
    }

    // The REPL thread may still be blocked on stdin; it ends with the process.
    match runtime.block_on(session.run()) {
        Ok(SessionEnd::Shutdown) => {
            println!("{}", "  ✓ Actuators parked. Exiting Embodia.".green());
            ExitCode::SUCCESS
        }
        Ok(SessionEnd::PerceptionClosed) => {
            println!("{}", "  ✓ Input closed. Actuators parked.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{} {}", "✗ Session halted:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First run
// ─────────────────────────────────────────────────────────────────────────────

fn first_run() -> config::Config {
    println!();
    println!("  No configuration found.  Writing defaults.");
    let cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____          __         ___     "#.bold().cyan());
    println!("{}", r#"  / __/_ _  ___ / /  ___  / (_)__ _ "#.bold().cyan());
    println!("{}", r#" / _//  ' \/ _ \/ _ \/ _ \/ _  / / _ `/"#.bold().cyan());
    println!("{}", r#"/___/_/_/_/\___/_.__/\___/\_,_/_/\_,_/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Embodia".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Perception-to-action agent shell");
    println!();
}
