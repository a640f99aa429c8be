//! Hoist - build and deployment pipelines for local folders
//!
//! Usage:
//!   hoist deploy [FOLDERS]...   # Provision pipelines, resuming a prior run
//!   hoist status                # Show what the checkpoint records
//!   hoist undeploy              # Delete everything that was created
//!   hoist reset                 # Forget the checkpoint
//!   hoist sandbox init          # Seed the local platform

mod interactive;
mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hoist_core::checkpoint::{CheckpointDocument, RunStatus, Slot};
use hoist_core::collab::{Collaborators, ConfigAuthProvider, FixedParameters, NamePrompt, ParameterSource};
use hoist_core::config::{ConfigScope, HoistConfig};
use hoist_core::context::AppContext;
use hoist_core::deploy::{DeployRequest, Orchestrator, Teardown, TeardownReport};
use hoist_core::progress::ChannelSink;

use crate::interactive::{PrefilledOptions, PromptParameters};

#[derive(Parser)]
#[command(name = "hoist")]
#[command(about = "Build and deployment pipelines for local folders", long_about = None)]
struct Cli {
    /// Log every step, not only warnings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy folders, resuming an interrupted or failed run
    Deploy(DeployArgs),

    /// Show what the checkpoint records
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete every resource the checkpoint records
    Undeploy {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Discard the checkpoint without touching remote resources
    Reset {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Manage the local platform sandbox
    Sandbox(SandboxArgs),
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Args)]
struct DeployArgs {
    /// Folders to deploy (defaults to the current directory)
    folders: Vec<PathBuf>,
    /// Add the folders to an existing devops project
    #[arg(long, value_name = "PROJECT_ID")]
    add_to: Option<String>,
    /// Name of the devops project to create
    #[arg(long)]
    project_name: Option<String>,
    /// Target compartment (id or name)
    #[arg(long)]
    compartment: Option<String>,
    /// Authentication profile
    #[arg(long)]
    profile: Option<String>,
    /// Do not set up deployment to a cluster
    #[arg(long)]
    no_cluster: bool,
    /// Build container images without storing build artifacts
    #[arg(long)]
    bypass_artifacts: bool,
    /// Skip native executable pipelines
    #[arg(long)]
    no_native: bool,
    /// Accept defaults instead of prompting (for CI/CD)
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(Args)]
struct SandboxArgs {
    #[command(subcommand)]
    command: SandboxSubcommand,
}

#[derive(Subcommand)]
enum SandboxSubcommand {
    /// Create a compartment (and optionally a cluster) in the sandbox
    Init {
        /// Compartment name
        #[arg(long, default_value = "sandbox")]
        compartment: String,
        /// Also create a cluster in the compartment
        #[arg(long)]
        with_cluster: bool,
        /// Region written to hoist.toml when none is configured
        #[arg(long, default_value = "us-ashburn-1")]
        region: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let ctx = AppContext::from_env()?;
    match cli.command {
        Commands::Deploy(args) => run_deploy(&ctx, args).await,
        Commands::Status { format } => run_status(&ctx, format),
        Commands::Undeploy { yes } => run_undeploy(&ctx, yes).await,
        Commands::Reset { yes } => run_reset(&ctx, yes),
        Commands::Sandbox(args) => run_sandbox(&ctx, args).await,
    }
}

/// Log filter used when `RUST_LOG` is unset.
fn default_filter(verbose: bool) -> &'static str {
    if verbose { "hoist=debug,info" } else { "hoist=info,warn" }
}

async fn run_deploy(ctx: &AppContext, args: DeployArgs) -> Result<()> {
    let mut config = ctx.load_config()?;
    if args.profile.is_some() {
        config.profile = args.profile.clone();
    }

    let folders = resolve_folders(ctx.project_root(), &args.folders);
    let request = build_request(&args, folders, &config);

    let (params, names): (Arc<dyn ParameterSource>, Arc<dyn NamePrompt>) = if args.yes {
        let mut fixed = FixedParameters::new()
            .with_cluster(!request.skip_cluster)
            .deriving_replacements();
        if let Some(compartment) = &args.compartment {
            fixed = fixed.with_compartment(compartment);
        }
        if let Some(name) = &args.project_name {
            fixed = fixed.with_project_name(name);
        }
        let fixed = Arc::new(fixed);
        (fixed.clone(), fixed)
    } else {
        let prompts = Arc::new(PromptParameters::new(PrefilledOptions {
            compartment: args.compartment.clone(),
            project_name: args.project_name.clone(),
            no_cluster: request.skip_cluster,
        }));
        (prompts.clone(), prompts)
    };

    if !args.yes {
        let prompt = format!("Deploy {} folder(s)?", request.folders.len());
        if !interactive::confirm(&prompt, true)? {
            println!("Deployment cancelled.");
            return Ok(());
        }
    }

    let platform = Arc::new(ctx.open_platform(&config)?);
    let collab = Collaborators::standard(&config, params, names);
    let (sink, events) = ChannelSink::channel();
    let renderer = tokio::spawn(progress::render(events));

    let orchestrator = Orchestrator::for_platform(platform, collab)
        .with_progress(Arc::new(sink))
        .with_name_conflict_retries(config.name_conflict_retries());

    let cancel = orchestrator.cancel_flag();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Stopping after the current step...", style("!").yellow().bold());
            cancel.cancel();
        }
    });

    let mut checkpoint = ctx.open_checkpoint()?;
    let outcome = orchestrator.run(&request, &mut checkpoint).await;

    interrupt.abort();
    drop(orchestrator);
    let _ = renderer.await;

    if let Some(error) = outcome.error {
        anyhow::bail!(error);
    }
    let doc = checkpoint.doc();
    println!(
        "{} Deployed to devops project '{}'",
        style("✓").green(),
        doc.project_name.as_deref().unwrap_or("?")
    );
    Ok(())
}

fn build_request(args: &DeployArgs, folders: Vec<PathBuf>, config: &HoistConfig) -> DeployRequest {
    let mut request = match &args.add_to {
        Some(project_id) => DeployRequest::incremental(folders, project_id.clone()),
        None => DeployRequest::new(folders),
    }
    .with_config(config);

    request.project_name = args.project_name.clone();
    if args.no_cluster {
        request.skip_cluster = true;
    }
    if args.bypass_artifacts {
        request.bypass_artifacts = true;
    }
    if args.no_native {
        request.native_pipelines = false;
    }
    request
}

fn resolve_folders(root: &Path, folders: &[PathBuf]) -> Vec<PathBuf> {
    if folders.is_empty() {
        return vec![root.to_path_buf()];
    }
    folders
        .iter()
        .map(|folder| {
            if folder.is_absolute() {
                folder.clone()
            } else {
                root.join(folder)
            }
        })
        .collect()
}

fn run_status(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let store = ctx.checkpoint_store();
    let checkpoint = ctx.open_checkpoint()?;
    let doc = checkpoint.doc();

    match format {
        OutputFormat::Table => {
            if !store.exists() {
                println!("No deployment recorded for {}", ctx.project_root().display());
                return Ok(());
            }
            print_table(doc);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "workspace": ctx.project_root(),
                "checkpoint": store.path(),
                "exists": store.exists(),
                "document": doc,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_table(doc: &CheckpointDocument) {
    let project = match (&doc.project_name, doc.project.id()) {
        (Some(name), Some(id)) => format!("{name} ({id})"),
        (Some(name), None) => name.clone(),
        (None, _) => "-".to_string(),
    };
    println!("Project: {}", project);
    if let Some(compartment) = &doc.compartment {
        println!("Compartment: {} ({})", compartment.name, compartment.id);
    }
    if let Some(cluster) = &doc.cluster {
        println!("Cluster: {}", cluster.id);
    }
    println!("Status: {}", status_label(doc.status));
    if let Some(updated) = doc.updated_at {
        println!("Updated: {}", updated.to_rfc3339());
    }
    println!();

    let slots = doc.recorded_slots();
    if slots.is_empty() {
        println!("No resources recorded.");
        return;
    }
    println!("Resources ({}):", slots.len());
    println!("  {:<60} {:<24} State", "Step", "Kind");
    for (slot_ref, slot) in &slots {
        println!(
            "  {:<60} {:<24} {}",
            truncate(&slot_ref.path(), 60),
            slot_ref.kind().to_string(),
            slot_symbol(slot)
        );
    }

    let pending = slots.iter().filter(|(_, s)| s.is_in_progress()).count();
    println!();
    if pending > 0 {
        println!(
            "Summary: {} recorded, {} unconfirmed (run 'hoist deploy' to resume)",
            slots.len(),
            pending
        );
    } else {
        println!("Summary: {} recorded, all confirmed", slots.len());
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running (interrupted)",
        RunStatus::Failed => "failed",
        RunStatus::Completed => "completed",
    }
}

fn slot_symbol(slot: &Slot) -> String {
    match slot {
        Slot::Created(id) => format!("✓ {id}"),
        Slot::InProgress => "… unconfirmed".to_string(),
        Slot::NotAttempted => "-".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

async fn run_undeploy(ctx: &AppContext, yes: bool) -> Result<()> {
    let config = ctx.load_config()?;
    let mut checkpoint = ctx.open_checkpoint()?;
    if checkpoint.doc().is_empty() {
        println!("Nothing to undeploy.");
        return Ok(());
    }
    if !yes && !interactive::confirm("Delete every resource created by hoist?", false)? {
        println!("Undeploy cancelled.");
        return Ok(());
    }

    let platform = Arc::new(ctx.open_platform(&config)?);
    let teardown = Teardown::new(
        platform.clone(),
        platform,
        Arc::new(ConfigAuthProvider::new(&config)),
    );
    let report = teardown.run(&mut checkpoint).await?;
    print_teardown(&report);
    if !report.is_clean() {
        anyhow::bail!("{} resource(s) could not be deleted", report.failed.len());
    }
    Ok(())
}

fn print_teardown(report: &TeardownReport) {
    for resource in &report.deleted {
        println!("{} Deleted {}", style("✓").green(), resource);
    }
    for resource in &report.swept {
        println!("{} Deleted unconfirmed {}", style("✓").green(), resource);
    }
    for resource in &report.failed {
        println!("  ⚠ Could not delete {}", resource);
    }
}

fn run_reset(ctx: &AppContext, yes: bool) -> Result<()> {
    let store = ctx.checkpoint_store();
    if !store.exists() {
        println!("No checkpoint to reset.");
        return Ok(());
    }
    if !yes && !interactive::confirm("Forget the recorded deployment? Remote resources are kept.", false)? {
        println!("Reset cancelled.");
        return Ok(());
    }
    store.remove()?;
    println!("✓ Removed {}", store.path().display());
    Ok(())
}

async fn run_sandbox(ctx: &AppContext, args: SandboxArgs) -> Result<()> {
    match args.command {
        SandboxSubcommand::Init {
            compartment,
            with_cluster,
            region,
        } => {
            let mut config = ctx.load_config()?;
            if config.region.is_none() {
                let store = ctx.config_store(ConfigScope::Project);
                let mut project = store.load()?;
                project.region = Some(region.clone());
                store.save(&project)?;
                config.region = Some(region);
                println!("✓ Saved region to {}", store.config_path().display());
            }

            let platform = ctx.open_platform(&config)?;
            let created = platform.add_compartment(&compartment).await?;
            println!("✓ Created compartment '{}' ({})", created.name, created.id);
            if with_cluster {
                let cluster = platform
                    .add_cluster(&created.id, &format!("{compartment}-cluster"))
                    .await?;
                println!("✓ Created cluster '{}' ({})", cluster.name, cluster.id);
            }
            println!("  Sandbox: {}", ctx.platform_dir(&config).display());
        }
    }
    Ok(())
}
