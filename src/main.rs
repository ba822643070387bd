//! Worksync CLI
//!
//! Drives workspace synchronization cycles: pull, commit-and-push, and
//! atomic artifact swaps.

use std::path::PathBuf;

use worksync::alert::{AlertGateway, CommandSink, Severity};
use worksync::config::{Config, Validate};
use worksync::error::Result;
use worksync::provision::{InterpreterSandboxBuilder, Provisioner};
use worksync::replace::{prune_stale, CleanupRegistry, DirectoryReplacer};
use worksync::secrets::SecretsVault;
use worksync::sync::{Orchestrator, Workspace};

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage(&args[0]);
        std::process::exit(1);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let warnings = match config.validate().into_result() {
        Ok(warnings) => warnings,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    for warning in warnings {
        tracing::warn!("{}", warning);
    }

    prune_stale(&config.temp_root, config.retention());

    let registry = CleanupRegistry::new();
    let cycle_id = uuid::Uuid::new_v4();
    tracing::info!(cycle = %cycle_id, command = %args[1], "starting sync cycle");

    // The guard must drop before the process picks its exit status, since
    // std::process::exit skips destructors.
    let result = {
        let _cleanup = registry.guard();
        run_command(&config, &registry, &args)
    };

    if let Err(e) = result {
        report_failure(&config, &e);
        eprintln!("worksync failed: {}", e);
        std::process::exit(1);
    }

    tracing::info!(cycle = %cycle_id, "sync cycle complete");
}

fn run_command(config: &Config, registry: &CleanupRegistry, args: &[String]) -> Result<()> {
    let orchestrator = Orchestrator::new(&config.remote, &config.branch);

    match args[1].as_str() {
        "pull" => {
            ensure_sandbox(config)?;
            let workspace = Workspace::open(workspace_arg(config, args))?;
            orchestrator.pull(&workspace)
        }
        "push" => {
            let workspace = Workspace::open(workspace_arg(config, args))?;
            orchestrator.push(&workspace)
        }
        "commit" => {
            let workspace = Workspace::open(workspace_arg(config, args))?;
            let extra = if args.len() > 3 {
                args[3..].to_vec()
            } else {
                vec!["-m".to_string(), "Automated build commit".to_string()]
            };
            orchestrator.commit_and_push(&workspace, &extra)?;
            Ok(())
        }
        "swap" => {
            if args.len() < 4 {
                usage(&args[0]);
                return Err(worksync::Error::Config(
                    "swap needs a source and a target".to_string(),
                ));
            }
            let replacer = DirectoryReplacer::new(registry);
            replacer.replace(
                &PathBuf::from(&args[2]),
                &PathBuf::from(&args[3]),
                None,
            )
        }
        other => {
            usage(&args[0]);
            Err(worksync::Error::Config(format!(
                "unknown command '{}'",
                other
            )))
        }
    }
}

fn workspace_arg(config: &Config, args: &[String]) -> PathBuf {
    args.get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.workspace_root.clone())
}

fn ensure_sandbox(config: &Config) -> Result<()> {
    let mut provisioner = Provisioner::new(
        InterpreterSandboxBuilder,
        &config.sandbox_root,
        &config.interpreter,
    );
    if let Some(debug) = &config.debug_interpreter {
        provisioner = provisioner.with_debug_interpreter(debug);
    }
    provisioner.ensure()
}

/// Best-effort operator alert on the failure path.
fn report_failure(config: &Config, error: &worksync::Error) {
    let vault = SecretsVault::new(
        &config.secrets_dir,
        &config.secrets_bundle,
        &config.secrets_password,
    );
    let gateway = AlertGateway::new(
        CommandSink::new(&config.notifier),
        vault,
        config.alert_channel.clone(),
        config.alert_sender.clone(),
    );

    if let Err(e) = gateway.alert(Severity::Error, &format!("sync failed: {}", error)) {
        tracing::warn!(error = %e, "could not deliver failure alert");
    }
}

fn usage(binary: &str) {
    eprintln!("Usage: {} <command> [args]", binary);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  pull [workspace]            reset and rebase onto the remote branch");
    eprintln!("  push [workspace]            rebase then push, rolling back on failure");
    eprintln!("  commit [workspace] [args]   stage all, commit, and push");
    eprintln!("  swap <source> <target>      atomically replace a directory");
    eprintln!();
    eprintln!("Configuration comes from WORKSYNC_* environment variables;");
    eprintln!("see Config for the full list and defaults.");
}
