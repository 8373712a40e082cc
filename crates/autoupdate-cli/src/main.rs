//! autoupdate - background self-update agent CLI
//!
//! The `autoupdate` command hosts an update controller and exposes the
//! building blocks for scripting and debugging.
//!
//! ## Commands
//!
//! - `run`: demo host; checks in the background, hands off at Ctrl-C
//! - `check`: run a single update cycle and print the result
//! - `compare`: order two versions
//! - `digest`: SHA-256 of a local file
//! - `config`: show, locate or create the update config
//! - `pending`: print and clear a deferred install

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use autoupdate_core::{
    compare, CommandInstaller, DeferredInstaller, FinalizeOutcome, Installer, Sha256Digest,
    UpdateController, UpdateState, Version,
};
use autoupdate_env::{Environment, EnvironmentResolver};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};

#[derive(Parser)]
#[command(name = "autoupdate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Background self-update agent", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// dev or prod (default: AUTOUPDATE_ENV, then build profile)
    #[arg(long, global = true)]
    env: Option<Environment>,

    /// Application name used for the production data directory
    #[arg(long, global = true, env = "AUTOUPDATE_APP_NAME", default_value = "autoupdate")]
    app_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as a host: check in the background, hand off at Ctrl-C
    Run {
        /// External installer to launch at exit (default: defer to next launch)
        #[arg(long)]
        installer: Option<PathBuf>,

        /// Arguments passed to the installer before `<path> <sha256> <version>`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        installer_args: Vec<String>,

        /// Seconds between status heartbeats
        #[arg(long, default_value = "30")]
        heartbeat: u64,
    },

    /// Run one update cycle and print the resulting state
    Check,

    /// Compare two MAJOR.MINOR.PATCH versions
    Compare { a: String, b: String },

    /// Print the SHA-256 of a file
    Digest { file: PathBuf },

    /// Inspect or create the update config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print and clear a deferred install marker
    Pending,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the merged, validated config
    Show,
    /// Print where the config file lives
    Path,
    /// Write the default config if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let environment = cli.env.unwrap_or_else(Environment::detect);
    let resolver = EnvironmentResolver::new(&cli.app_name, environment)
        .context("Failed to resolve application directories")?;

    // Setup logging; long-running commands also log to a per-run file.
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_dir = match cli.command {
        Commands::Run { .. } | Commands::Check => Some(resolver.log_dir()),
        _ => None,
    };
    let _log_guard = autoupdate_core::init_tracing(cli.json, level, log_dir.as_deref());

    match cli.command {
        Commands::Run {
            installer,
            installer_args,
            heartbeat,
        } => cmd_run(&resolver, installer, installer_args, heartbeat).await,
        Commands::Check => cmd_check(&resolver).await,
        Commands::Compare { a, b } => cmd_compare(&a, &b),
        Commands::Digest { file } => cmd_digest(&file).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&resolver),
            ConfigAction::Path => {
                println!("{}", resolver.config_path().display());
                Ok(())
            }
            ConfigAction::Init => cmd_config_init(&resolver),
        },
        Commands::Pending => cmd_pending(&resolver).await,
    }
}

/// Demo host loop
async fn cmd_run(
    resolver: &EnvironmentResolver,
    installer: Option<PathBuf>,
    installer_args: Vec<String>,
    heartbeat: u64,
) -> Result<()> {
    let config = resolver.load_config_or_default();
    info!(
        app = resolver.app_name(),
        environment = %resolver.environment(),
        version = %config.current_version,
        "host starting"
    );

    let installer: Arc<dyn Installer> = match installer {
        Some(program) => Arc::new(CommandInstaller::new(program).with_args(installer_args)),
        None => Arc::new(DeferredInstaller::new(resolver.pending_marker_path())),
    };
    let controller =
        UpdateController::new(config, installer).context("Failed to build update controller")?;

    let state = controller.initialize().await;
    info!(state = %state, "startup update check");

    let mut ticker = tokio::time::interval(Duration::from_secs(heartbeat.max(1)));
    let mut updates = controller.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res.context("Failed to listen for Ctrl-C")?;
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                info!(state = %controller.status(), "heartbeat");
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                match state {
                    UpdateState::Downloading(progress) => debug!(
                        received = progress.received,
                        total = ?progress.total,
                        "download progress"
                    ),
                    state => info!(state = %state, "update state changed"),
                }
            }
        }
    }

    match controller.finalize().await {
        FinalizeOutcome::HandedOff(artifact) => {
            resolver
                .record_installed_version(&artifact.version)
                .context("Failed to record installed version")?;
            println!(
                "Update {} handed off: {}",
                artifact.version,
                artifact.path.display()
            );
        }
        FinalizeOutcome::HandoffFailed { artifact, error } => {
            warn!(version = %artifact.version, error = %error, "update left staged");
        }
        FinalizeOutcome::NothingStaged => info!("no update to apply"),
    }
    Ok(())
}

/// Single foreground cycle
async fn cmd_check(resolver: &EnvironmentResolver) -> Result<()> {
    let config = resolver
        .load_config()
        .context("Failed to load update config")?;
    let installer = Arc::new(DeferredInstaller::new(resolver.pending_marker_path()));
    let controller =
        UpdateController::new(config, installer).context("Failed to build update controller")?;

    match controller.check_now().await {
        UpdateState::Failed(reason) => anyhow::bail!("update check failed: {reason}"),
        state => println!("{state}"),
    }
    Ok(())
}

fn cmd_compare(a: &str, b: &str) -> Result<()> {
    let a: Version = a.parse().context("Invalid first version")?;
    let b: Version = b.parse().context("Invalid second version")?;
    let word = match compare(&a, &b) {
        std::cmp::Ordering::Less => "less",
        std::cmp::Ordering::Equal => "equal",
        std::cmp::Ordering::Greater => "greater",
    };
    println!("{word}");
    Ok(())
}

async fn cmd_digest(file: &Path) -> Result<()> {
    let digest = Sha256Digest::of_file(file)
        .await
        .with_context(|| format!("Failed to hash {}", file.display()))?;
    println!("{digest}  {}", file.display());
    Ok(())
}

fn cmd_config_show(resolver: &EnvironmentResolver) -> Result<()> {
    let file = resolver
        .load_config_file()
        .context("Failed to load update config")?;
    println!("{}", serde_json::to_string_pretty(&file)?);
    Ok(())
}

fn cmd_config_init(resolver: &EnvironmentResolver) -> Result<()> {
    let path = resolver.config_path();
    if resolver.init_config().context("Failed to write config")? {
        println!("Created {}", path.display());
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}

async fn cmd_pending(resolver: &EnvironmentResolver) -> Result<()> {
    let installer = DeferredInstaller::new(resolver.pending_marker_path());
    match installer
        .take_pending()
        .await
        .context("Failed to read pending install")?
    {
        Some(pending) => println!("{}", serde_json::to_string_pretty(&pending)?),
        None => println!("No pending update"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_with_installer_args() {
        let cli = Cli::parse_from([
            "autoupdate",
            "--env",
            "prod",
            "run",
            "--installer",
            "/opt/app/install",
            "--",
            "--quiet",
            "-y",
        ]);
        assert_eq!(cli.env, Some(Environment::Production));
        match cli.command {
            Commands::Run {
                installer,
                installer_args,
                heartbeat,
            } => {
                assert_eq!(installer, Some(PathBuf::from("/opt/app/install")));
                assert_eq!(installer_args, vec!["--quiet", "-y"]);
                assert_eq!(heartbeat, 30);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_env() {
        assert!(Cli::try_parse_from(["autoupdate", "--env", "staging", "check"]).is_err());
    }

    #[test]
    fn test_compare_rejects_bad_versions() {
        assert!(cmd_compare("1.0.0", "1.0.1").is_ok());
        assert!(cmd_compare("1.0", "1.0.1").is_err());
    }

    #[test]
    fn test_cli_debug_assert() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
