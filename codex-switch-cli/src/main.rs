use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use codex_switch_core::{default_data_dir, AppContext, RefreshPolicy, VaultState};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroize;

/// Codex account switcher - manage, switch, and monitor codex CLI credentials
#[derive(Parser)]
#[command(name = "codex-switch")]
#[command(about = "Manage, switch, and monitor codex CLI credentials", long_about = None)]
struct Cli {
    /// Override the application data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Show info-level logs
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the encrypted vault
    Init,

    /// Show vault and CLI status
    Status,

    /// Import a credential into the vault
    Import {
        /// Import from a file instead of the live auth file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Drive `codex login` and import the fresh credential
        #[arg(long, conflicts_with = "file")]
        login: bool,

        /// Account name (defaults to Account-<fingerprint>)
        #[arg(long, default_value = "")]
        name: String,

        /// Tags, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List registered accounts
    List,

    /// Update an account's name and tags
    Update {
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Delete an account
    Delete { id: String },

    /// Switch the live auth file to an account
    Switch {
        id: String,

        /// Terminate running codex CLI processes after the switch
        #[arg(long)]
        restart: bool,
    },

    /// Roll the live auth file back to a history entry's snapshot
    Rollback { history_id: String },

    /// Show switch history
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Refresh quota snapshots
    Refresh {
        /// Refresh a single account instead of all
        #[arg(long)]
        account: Option<String>,

        /// Bypass the snapshot cache
        #[arg(long)]
        force: bool,
    },

    /// Show every account with its latest quota snapshot
    Dashboard,

    /// List stored quota snapshots for an account
    Snapshots {
        account_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Update the quota refresh policy
    SetPolicy {
        #[arg(long)]
        timeout_ms: u64,

        #[arg(long)]
        cache_ttl_s: u64,

        #[arg(long)]
        max_concurrency: usize,
    },

    /// Show runtime diagnostics
    Diagnostics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::INFO } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let ctx = AppContext::open(data_dir).context("failed to open application context")?;

    match cli.command {
        Commands::Init => {
            if ctx.vault_status()?.state != VaultState::Uninitialized {
                bail!("vault is already initialized; use other commands directly");
            }
            let mut password = rpassword::prompt_password("Choose a master password: ")?;
            let mut confirm = rpassword::prompt_password("Confirm master password: ")?;
            let matches = password == confirm;
            confirm.zeroize();
            if !matches {
                password.zeroize();
                bail!("passwords do not match");
            }
            let status = ctx.init_vault(&password);
            password.zeroize();
            status?;
            println!("Vault initialized and unlocked for this session.");
        }
        Commands::Status => {
            let vault = ctx.vault_status()?;
            let cli_status = ctx.get_cli_status()?;
            print_json(&serde_json::json!({
                "vault": vault,
                "cli": cli_status,
            }))?;
        }
        Commands::Import {
            file,
            login,
            name,
            tags,
        } => {
            unlock(&ctx)?;
            let account = if login {
                ctx.import_via_login(&name, tags).await?
            } else if let Some(path) = file {
                ctx.import_from_file(&path, &name, tags)?
            } else {
                ctx.import_current(&name, tags)?
            };
            println!("Imported account \"{}\" ({})", account.name, account.id);
        }
        Commands::List => {
            print_json(&ctx.list_accounts()?)?;
        }
        Commands::Update { id, name, tags } => {
            ctx.update_account_meta(&id, &name, tags)?;
            println!("Account updated.");
        }
        Commands::Delete { id } => {
            ctx.delete_account(&id)?;
            println!("Account deleted.");
        }
        Commands::Switch { id, restart } => {
            unlock(&ctx)?;
            let report = ctx.switch_account(&id, restart)?;
            if restart {
                println!(
                    "Switched. Terminated {} codex process(es). History entry {}.",
                    report.terminated_processes, report.history_id
                );
            } else {
                println!("Switched. History entry {}.", report.history_id);
            }
        }
        Commands::Rollback { history_id } => {
            let report = ctx.rollback(&history_id)?;
            println!("Rolled back. History entry {}.", report.history_id);
        }
        Commands::History { limit } => {
            print_json(&ctx.list_history(limit)?)?;
        }
        Commands::Refresh { account, force } => {
            unlock(&ctx)?;
            let snapshots = ctx.refresh_quota(account.as_deref(), force).await?;
            print_json(&snapshots)?;
        }
        Commands::Dashboard => {
            print_json(&ctx.quota_dashboard()?)?;
        }
        Commands::Snapshots { account_id, limit } => {
            print_json(&ctx.list_snapshots(&account_id, limit)?)?;
        }
        Commands::SetPolicy {
            timeout_ms,
            cache_ttl_s,
            max_concurrency,
        } => {
            let applied = ctx.set_refresh_policy(RefreshPolicy {
                timeout_ms,
                cache_ttl_s,
                max_concurrency,
            })?;
            println!(
                "Policy applied: timeout {}ms, TTL {}s, concurrency {}.",
                applied.timeout_ms, applied.cache_ttl_s, applied.max_concurrency
            );
        }
        Commands::Diagnostics => {
            print_json(&ctx.get_runtime_diagnostics()?)?;
        }
    }

    Ok(())
}

/// Prompt for the master password and unlock the vault for this invocation.
fn unlock(ctx: &AppContext) -> Result<()> {
    match ctx.vault_status()?.state {
        VaultState::Unlocked => return Ok(()),
        VaultState::Uninitialized => {
            bail!("vault is not initialized; run `codex-switch init` first")
        }
        VaultState::Locked => {}
    }
    let mut password = rpassword::prompt_password("Master password: ")?;
    let result = ctx.unlock_vault(&password);
    password.zeroize();
    result?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
