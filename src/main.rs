//! botd: daemon entry point.
//!
//! Startup sequence:
//!   0. Enable error backtraces, then build the tokio runtime
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > config / env)
//!   4. Init logger once
//!   5. Build fleet, clock and command table
//!   6. Start the console agent (when enabled or `-i`)
//!   7. Start the heartbeat repeater (when configured)
//!   8. Wait for Ctrl-C or console end-of-input
//!   9. Stop timers, then agents

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use botd::agent::{Agent, StartOptions};
use botd::commands::{Commands, builtin_registry};
use botd::comms::Console;
use botd::error::AppError;
use botd::fleet::Fleet;
use botd::runtime::timer::{Clock, Repeater};
use botd::{config, logger};

/// How long shutdown waits for an agent's threads.
const STOP_GRACE: Duration = Duration::from_secs(2);

fn main() {
    enable_error_backtraces();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: cannot build tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Callback and command errors are logged with the frames anyhow captured at
/// creation, which needs `RUST_LIB_BACKTRACE`.  An explicit setting wins.
fn enable_error_backtraces() {
    if std::env::var_os("RUST_BACKTRACE").is_none() && std::env::var_os("RUST_LIB_BACKTRACE").is_none() {
        // SAFETY: called first thing in `main`, before any other thread exists.
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "1") };
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;
    if args.interactive {
        config.console.enabled = true;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::parse_level(effective_log_level)?;
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        bot_name = %config.bot_name,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        console = config.console.enabled,
        "config loaded"
    );

    let fleet = Fleet::new();
    let clock = Clock::new()?;
    let commands = Arc::new(
        Commands::new(
            Arc::new(builtin_registry()),
            &config.commands.modules,
            fleet.clone(),
            config.commands.prefix.clone(),
        )?
        .with_allowed(config.commands.allowed.iter().cloned()),
    );

    // Shared shutdown token; Ctrl-C and console EOF both cancel it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let console = if config.console.enabled {
        let agent = Agent::new(
            config.bot_name.clone(),
            Console::stdio(config.console.channel.clone()),
            fleet.clone(),
        );
        agent.join_channel(config.console.channel.clone());
        commands.install(agent.handler());
        agent.connect()?;
        agent.start(StartOptions::both())?;

        let closed = agent.input_closed();
        let eof_token = shutdown.clone();
        tokio::spawn(async move {
            closed.cancelled().await;
            info!("console input closed, initiating shutdown");
            eof_token.cancel();
        });
        Some(agent)
    } else {
        None
    };

    let heartbeat = match &config.scheduler.heartbeat {
        Some(hb) => {
            let fleet = fleet.clone();
            let text = hb.text.clone();
            let repeater = Repeater::new(&clock, hb.every, "heartbeat", move || {
                fleet.announce(&text);
            })?;
            repeater.start();
            info!(every = ?repeater.interval(), "heartbeat scheduled");
            Some(repeater)
        }
        None => None,
    };

    info!(
        agents = ?fleet.ids(),
        commands = ?commands.names(),
        "botd running"
    );

    shutdown.cancelled().await;

    if let Some(heartbeat) = heartbeat {
        heartbeat.exit();
    }
    clock.shutdown();

    if let Some(agent) = console {
        agent.stop();
        if !agent.join(STOP_GRACE) {
            warn!(agent = %agent.id(), "agent threads still running at exit");
        }
    }

    info!("botd stopped");
    Ok(())
}

struct CliArgs {
    /// Log level forced by `-v` flags; `None` means use the configured level.
    log_level: Option<&'static str>,
    /// Run the console agent even when the config disables it.
    interactive: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: botd [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Run the stdin/stdout console agent");
                println!("  -f, --config <PATH>        Path to configuration file (default: {})", config::DEFAULT_PATH);
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    CliArgs {
        log_level: logger::verbosity_level(verbosity),
        interactive,
        config_path,
    }
}
