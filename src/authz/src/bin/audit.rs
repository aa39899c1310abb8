//! # Authorization audit tool
//!
//! Runs the authorization engine over a JSON snapshot of roles,
//! permissions, policies and resources.
//!
//! ## Commands
//!
//! - `validate` - Report broken role hierarchies and malformed conditions
//! - `check` - Authorize one request and print the decision as JSON
//! - `permissions` - List a principal's effective permissions
//!
//! ## Configuration
//!
//! - `RUST_LOG` - Log level (default: info), logs go to stderr
//! - `AUTHZ_CONCURRENT_EVALUATION`, `AUTHZ_BUSINESS_HOURS_START`,
//!   `AUTHZ_BUSINESS_HOURS_END` - Engine configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iam_authz::{
    AuthorizationContext, AuthorizationEngine, EngineConfig, InMemoryStore, Snapshot,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Offline checks against an authorization snapshot
#[derive(Parser, Debug)]
#[command(name = "authz-audit", version, about = "Authorization snapshot audit tool")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate role hierarchies and policy conditions
    Validate {
        #[arg(long, env = "AUTHZ_SNAPSHOT")]
        snapshot: PathBuf,
    },

    /// Authorize a single request
    Check {
        #[arg(long, env = "AUTHZ_SNAPSHOT")]
        snapshot: PathBuf,

        #[arg(long)]
        principal: Uuid,

        #[arg(long)]
        resource_type: String,

        #[arg(long)]
        action: String,

        #[arg(long)]
        organization: Option<Uuid>,

        #[arg(long)]
        resource: Option<Uuid>,
    },

    /// List effective permissions of a principal
    Permissions {
        #[arg(long, env = "AUTHZ_SNAPSHOT")]
        snapshot: PathBuf,

        #[arg(long)]
        principal: Uuid,

        #[arg(long)]
        organization: Option<Uuid>,

        #[arg(long)]
        resource_type: Option<String>,
    },
}

async fn load_engine(path: &Path) -> Result<AuthorizationEngine> {
    let snapshot = Snapshot::from_path(path)
        .with_context(|| format!("failed to load snapshot {}", path.display()))?;
    let store = Arc::new(InMemoryStore::from_snapshot(snapshot).await?);
    let config = EngineConfig::from_env()?;

    Ok(AuthorizationEngine::with_config(
        store.clone(),
        store.clone(),
        store,
        config,
    ))
}

async fn run(args: Args) -> Result<ExitCode> {
    match args.command {
        Command::Validate { snapshot } => {
            let snapshot = Snapshot::from_path(&snapshot)
                .with_context(|| format!("failed to load snapshot {}", snapshot.display()))?;
            let issues = snapshot.audit();

            if issues.is_empty() {
                println!(
                    "OK: {} roles, {} policies",
                    snapshot.roles.len(),
                    snapshot.policies.len()
                );
                return Ok(ExitCode::SUCCESS);
            }

            for issue in &issues {
                println!("{}", issue);
            }
            info!("{} issues found", issues.len());
            Ok(ExitCode::FAILURE)
        }

        Command::Check {
            snapshot,
            principal,
            resource_type,
            action,
            organization,
            resource,
        } => {
            let engine = load_engine(&snapshot).await?;
            let ctx = AuthorizationContext::new(principal, resource_type, action)
                .with_organization(organization)
                .with_resource_id(resource);

            let decision = engine.authorize(&ctx).await;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            info!("{}", decision.summary());

            Ok(if decision.is_allowed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Permissions {
            snapshot,
            principal,
            organization,
            resource_type,
        } => {
            let engine = load_engine(&snapshot).await?;
            let permissions = engine
                .get_user_permissions(principal, organization, resource_type.as_deref())
                .await?;

            for grant in &permissions {
                println!(
                    "{:<32} via {}",
                    grant.permission.full_name(),
                    grant.source_roles.join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("authz-audit v{}", iam_authz::VERSION);

    run(Args::parse()).await
}
