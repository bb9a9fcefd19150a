use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::adapters::{
    build_job_executor, build_station_provider, ConsoleRenderer, TracingNotifier,
};
use crate::config::AppConfig;
use crate::domain::{Job, StationSnapshot};
use crate::error::{Result, SpoolmapError};
use crate::workflow::{
    ActorSettings, ControllerSettings, SessionId, SlotSelection, SubmissionResult, WorkflowActor,
    WorkflowController, WorkflowEvent, WorkflowHandle, WorkflowView,
};

#[derive(Parser)]
#[command(name = "spoolmap")]
#[command(version = "0.1.0")]
#[command(about = "Bind print job tools to feed station slots", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", env = "SPOOLMAP_CONFIG_DIR")]
    pub config_dir: PathBuf,

    /// Print every intermediate render
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay bindings against a station snapshot and report the result
    Check {
        #[command(flatten)]
        replay: ReplayArgs,
    },
    /// Replay bindings and start the job when the mapping is complete
    Start {
        #[command(flatten)]
        replay: ReplayArgs,
        /// Send use_leveling=false with the start request
        #[arg(long)]
        no_leveling: bool,
        /// Send the request to executor.start_url instead of a dry run
        #[arg(long)]
        live: bool,
    },
    /// Fetch and print the station snapshot
    Status {
        /// Read the snapshot from a JSON file instead of station.status_url
        #[arg(short, long)]
        station: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Job description (JSON)
    #[arg(short, long)]
    pub job: PathBuf,
    /// Station snapshot (JSON); defaults to station.status_url
    #[arg(short, long)]
    pub station: Option<PathBuf>,
    /// Binding as TOOL=SLOT, slot numbered from 1 (repeatable)
    #[arg(short, long = "bind", value_parser = parse_binding_arg)]
    pub bindings: Vec<(u32, u32)>,
}

/// Parse a `TOOL=SLOT` argument
pub fn parse_binding_arg(raw: &str) -> std::result::Result<(u32, u32), String> {
    let (tool, slot) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TOOL=SLOT, got '{}'", raw))?;
    let tool = tool
        .trim()
        .trim_start_matches(['T', 't'])
        .parse::<u32>()
        .map_err(|e| format!("invalid tool in '{}': {}", raw, e))?;
    let slot = slot
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid slot in '{}': {}", raw, e))?;
    if slot == 0 {
        return Err(format!("slots are numbered from 1 in '{}'", raw));
    }
    Ok((tool, slot))
}

/// The one line printed for a failed command
pub fn failure_line(err: &dyn std::fmt::Display) -> String {
    format!("\x1b[31m✗ {}\x1b[0m", err)
}

pub fn load_job(path: &Path) -> Result<Job> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Commands::Check { replay } => {
            let handle = spawn_workflow(&config, &replay, false, cli.verbose)?;
            let view = replay_bindings(&handle, &replay).await?;
            print_summary(&view);
            Ok(())
        }
        Commands::Start {
            replay,
            no_leveling,
            live,
        } => {
            let mut config = config;
            if no_leveling {
                config.workflow.use_leveling = false;
            }
            let handle = spawn_workflow(&config, &replay, live, cli.verbose)?;
            let view = replay_bindings(&handle, &replay).await?;
            print_summary(&view);

            match handle.submit().await? {
                SubmissionResult::Started => {
                    println!("\x1b[32m✓ Job {} started\x1b[0m", view.job_id.unwrap_or_default());
                    Ok(())
                }
                SubmissionResult::Failed(reason) => Err(SpoolmapError::SubmissionFailure(reason)),
                SubmissionResult::Unconfirmed(reason) => {
                    Err(SpoolmapError::StartUnconfirmed(reason))
                }
                SubmissionResult::Stale => Err(SpoolmapError::NoSession),
            }
        }
        Commands::Status { station, json } => {
            let provider = build_station_provider(&config, station.as_deref())?;
            let fetch = provider.fetch(config.station.context_id.as_deref());
            let snapshot = tokio::time::timeout(config.station.fetch_timeout(), fetch)
                .await
                .map_err(|_| SpoolmapError::Timeout {
                    operation: "station snapshot fetch".to_string(),
                    elapsed_ms: config.station.fetch_timeout_ms,
                })??;
            print_snapshot(snapshot.as_ref(), json)
        }
    }
}

fn spawn_workflow(
    config: &AppConfig,
    replay: &ReplayArgs,
    live: bool,
    verbose: bool,
) -> Result<WorkflowHandle> {
    let provider = build_station_provider(config, replay.station.as_deref())?;
    let executor = build_job_executor(config, live)?;
    if executor.is_dry_run() {
        info!("Job start runs in dry-run mode");
    }

    let controller = WorkflowController::new(
        ControllerSettings::from(config),
        Arc::new(TracingNotifier),
        Arc::new(ConsoleRenderer::new(verbose)),
    );
    Ok(WorkflowActor::spawn(
        controller,
        provider,
        executor,
        ActorSettings::from(config),
    ))
}

async fn wait_for_snapshot(
    events: &mut broadcast::Receiver<WorkflowEvent>,
    session_id: SessionId,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(WorkflowEvent::SnapshotApplied { session_id: id, .. }) if id == session_id => {
                return Ok(())
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return Err(SpoolmapError::ChannelClosed),
        }
    }
}

/// Open the job, wait for the station, then apply each `TOOL=SLOT` pair in order.
pub async fn replay_bindings(handle: &WorkflowHandle, replay: &ReplayArgs) -> Result<WorkflowView> {
    let job = load_job(&replay.job)?;
    let mut events = handle.subscribe();
    let session_id = handle.open(job).await?;
    wait_for_snapshot(&mut events, session_id).await?;

    let view = handle.view().await?;
    for &(tool_id, display_id) in &replay.bindings {
        let Some(slot) = view
            .snapshot
            .as_ref()
            .and_then(|s| s.slot_by_display_id(display_id))
            .cloned()
        else {
            println!(
                "\x1b[31m✗ T{} -> slot {}: slot not reported by the station\x1b[0m",
                tool_id, display_id
            );
            continue;
        };

        // Selecting is a toggle; make sure this tool ends up selected.
        if handle.select_tool(tool_id).await? != Some(tool_id) {
            handle.select_tool(tool_id).await?;
        }

        match handle.select_slot(slot).await? {
            SlotSelection::Bound(outcome) => {
                println!(
                    "\x1b[32m✓ T{} -> slot {}\x1b[0m",
                    outcome.binding.tool_id,
                    outcome.binding.slot_display_id()
                );
                if let Some(advisory) = outcome.advisory {
                    println!("\x1b[33m! {}\x1b[0m", advisory);
                }
            }
            SlotSelection::Rejected(e) => {
                println!("\x1b[31m✗ T{} -> slot {}: {}\x1b[0m", tool_id, display_id, e);
                // Drop the selection so the next pair starts clean.
                handle.select_tool(tool_id).await?;
            }
        }
    }

    let view = handle.view().await?;
    debug!(bindings = view.bindings.len(), complete = view.complete, "Replay finished");
    Ok(view)
}

fn print_summary(view: &WorkflowView) {
    println!();
    println!("{}", ConsoleRenderer::requirements_table(&view.requirements));
    println!(
        "{}",
        ConsoleRenderer::slots_table(view.snapshot.as_ref(), view.degraded)
    );
    println!("{}", ConsoleRenderer::bindings_table(&view.bindings));

    let unbound: Vec<String> = view
        .requirements
        .iter()
        .filter(|r| r.bound_slot.is_none())
        .map(|r| r.requirement.label())
        .collect();
    if unbound.is_empty() {
        println!("\x1b[32mMapping complete\x1b[0m");
    } else {
        println!(
            "\x1b[33mMapping incomplete, unbound: {}\x1b[0m",
            unbound.join(", ")
        );
    }
}

fn print_snapshot(snapshot: Option<&StationSnapshot>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    match snapshot {
        Some(s) => {
            println!(
                "Station {} ({} of {} slots loaded)",
                if s.connected { "connected" } else { "disconnected" },
                s.loaded_count(),
                s.slots.len()
            );
            println!("{}", ConsoleRenderer::slots_table(Some(s), !s.connected));
        }
        None => println!("Station status unknown"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_binding_accepts_tool_prefix() {
        assert_eq!(parse_binding_arg("0=1"), Ok((0, 1)));
        assert_eq!(parse_binding_arg("T3=4"), Ok((3, 4)));
        assert_eq!(parse_binding_arg(" t2 = 2 "), Ok((2, 2)));
    }

    #[test]
    fn parse_binding_rejects_bad_input() {
        assert!(parse_binding_arg("0-1").is_err());
        assert!(parse_binding_arg("x=1").is_err());
        assert!(parse_binding_arg("0=0").is_err());
    }

    #[test]
    fn failure_line_uses_display_form_only() {
        let line = failure_line(&SpoolmapError::StartUnconfirmed("no answer".to_string()));
        assert_eq!(line.matches("no answer").count(), 1);
        assert!(line.starts_with("\x1b[31m✗ Previous job start"));
        assert!(!line.contains("StartUnconfirmed("));
    }

    #[test]
    fn cli_parses_start_flags() {
        let cli = Cli::try_parse_from([
            "spoolmap", "start", "--job", "job.json", "--bind", "0=1", "--bind", "1=2",
            "--no-leveling",
        ])
        .expect("parse");
        match cli.command {
            Commands::Start {
                replay,
                no_leveling,
                live,
            } => {
                assert_eq!(replay.bindings, vec![(0, 1), (1, 2)]);
                assert!(no_leveling);
                assert!(!live);
                assert!(replay.station.is_none());
            }
            _ => panic!("expected start"),
        }
    }
}
