//! `ddk` — operator CLI: migrations, status, sweeps, purges, audit checks.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ddk_reconcile::{drift_sweep, Saga};

#[derive(Parser)]
#[command(name = "ddk")]
#[command(about = "DealDesk operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Flip every active offer past its expiry to EXPIRED
    SweepExpired,

    /// Delete expired idempotency records
    PurgeIdempotency,

    /// Run one drift-correction sweep against the job store
    DriftSweep,

    /// Verify the hash chain of an ops log file
    VerifyAudit {
        /// Path to the JSONL ops log
        path: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => {
                let pool = ddk_db::connect_from_env(2).await?;
                let st = ddk_db::status(&pool).await?;
                println!("db ok:      {}", st.ok);
                println!("has schema: {}", st.has_schema);
            }
            DbCmd::Migrate => {
                let pool = ddk_db::connect_from_env(2).await?;
                ddk_db::migrate(&pool).await?;
                println!("migrations applied");
            }
        },

        Commands::ConfigHash { paths } => {
            let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = ddk_config::load_layered_yaml(&refs).context("load config")?;
            println!("config_hash: {}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::SweepExpired => {
            let pool = ddk_db::connect_from_env(2).await?;
            let n = ddk_db::sweep_expired_offers(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("expired offers: {n}");
        }

        Commands::PurgeIdempotency => {
            let pool = ddk_db::connect_from_env(2).await?;
            let n = ddk_db::idempotency_purge_expired(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("purged records: {n}");
        }

        Commands::DriftSweep => {
            let pool = ddk_db::connect_from_env(2).await?;
            let saga = Saga::new(ddk_db::pg_saga_ports(&pool));
            let report = drift_sweep(&saga)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("examined:       {}", report.examined);
            println!("corrected:      {}", report.corrected);
            println!("target missing: {}", report.target_missing);
        }

        Commands::VerifyAudit { path } => match ddk_audit::verify_chain(&path)? {
            ddk_audit::VerifyResult::Valid { lines } => {
                println!("chain valid ({lines} events)");
            }
            ddk_audit::VerifyResult::Broken { line, reason } => {
                bail!("chain BROKEN at line {line}: {reason}");
            }
        },
    }

    Ok(())
}
