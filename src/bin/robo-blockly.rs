//! Robo Blockly CLI - run and inspect block programs
//!
//! Programs run against the simulated controller, so they can be exercised
//! without hardware attached.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use robo_blockly::config::AppConfig;
use robo_blockly::interpreter::{
    CancelToken, Diagnostic, DiagnosticSink, Interpreter, RunSummary, Severity, Step, ThreadDelay,
    TracingOnly, count_steps,
};
use robo_blockly::robot::{RobotSession, SimulatedRobot};
use robo_blockly::storage;
use robo_blockly::waypoint::{PlaybackSummary, WaypointProgram};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "robo-blockly")]
#[command(about = "Interpreter for block-authored robot arm programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program against the simulated robot
    Run {
        /// Program file (JSON array of steps)
        program: PathBuf,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Connect before the first step
        #[arg(long)]
        connect: bool,

        /// Only log through tracing; do not echo diagnostics
        #[arg(short, long)]
        quiet: bool,
    },

    /// Play back a saved waypoint table against the simulated robot
    Playback {
        /// Waypoint file (JSON)
        table: PathBuf,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of passes over the table
        #[arg(short, long, default_value_t = 1)]
        loops: i64,
    },

    /// Parse a program and print its step tree
    Check {
        /// Program file (JSON array of steps)
        program: PathBuf,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

/// Prints diagnostics to the terminal as they arrive.
struct ConsoleSink;

impl DiagnosticSink for ConsoleSink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Output | Severity::Info => println!("{}", diagnostic),
            Severity::Warning => println!("warning: {}", diagnostic),
            Severity::Error => eprintln!("error: {}", diagnostic),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            program,
            config,
            connect,
            quiet,
        } => {
            let config = load_config(config.as_deref())?;
            let summary = run(program, config, connect, quiet).await?;
            println!(
                "Executed {} step(s){}",
                summary.steps_executed,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
            if !summary.variables.is_empty() {
                println!("Variables:");
            }
            for (name, value) in summary.variables.iter() {
                println!("  {} = {}", name, value);
            }
        }

        Commands::Playback {
            table,
            config,
            loops,
        } => {
            let config = load_config(config.as_deref())?;
            let summary = playback(table, config, loops).await?;
            println!(
                "Submitted {} move(s) over {} pass(es){}",
                summary.steps_executed,
                summary.loops_completed,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
        }

        Commands::Check { program } => {
            let steps = storage::load_program(&program)?;
            println!(
                "{}: {} top-level step(s), {} in total, {} motion",
                program.display(),
                steps.len(),
                count_steps(&steps),
                count_motion(&steps)
            );
            print_tree(&steps, 1);
        }

        Commands::InitConfig { path } => {
            AppConfig::default().save(&path)?;
            println!("Wrote default configuration to {:?}", path);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

/// Cancel `token` when Ctrl-C arrives.
fn cancel_on_interrupt(token: &CancelToken) -> tokio::task::JoinHandle<()> {
    let watcher = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling program");
            watcher.cancel();
        }
    })
}

async fn run(program: PathBuf, config: AppConfig, connect: bool, quiet: bool) -> Result<RunSummary> {
    let steps = storage::load_program(&program)?;
    let cancel = CancelToken::new();
    let ctrl_c = cancel_on_interrupt(&cancel);

    let worker = tokio::task::spawn_blocking(move || -> Result<RunSummary> {
        let mut session = RobotSession::new(SimulatedRobot::new(), &config);
        if connect {
            session
                .connect()
                .context("failed to connect to simulated robot")?;
        }

        let mut console = ConsoleSink;
        let mut silent = TracingOnly;
        let sink: &mut dyn DiagnosticSink = if quiet { &mut silent } else { &mut console };
        let mut delay =
            ThreadDelay::new(Duration::from_millis(config.interpreter.delay_tick_ms));
        let summary = Interpreter::new(&mut session, sink, &mut delay)
            .with_cancel_token(cancel)
            .with_label(config.interpreter.context_label.clone())
            .run_program(&steps);
        Ok(summary)
    });

    let summary = worker.await.context("interpreter task panicked")?;
    ctrl_c.abort();
    summary
}

async fn playback(table: PathBuf, config: AppConfig, loops: i64) -> Result<PlaybackSummary> {
    let program = WaypointProgram::load(&table)?;
    let cancel = CancelToken::new();
    let ctrl_c = cancel_on_interrupt(&cancel);

    let worker = tokio::task::spawn_blocking(move || -> Result<PlaybackSummary> {
        let mut session = RobotSession::new(SimulatedRobot::new(), &config);
        session
            .connect()
            .context("failed to connect to simulated robot")?;
        let summary = program
            .run_loop(&mut session, loops, &cancel)
            .context("playback failed")?;
        Ok(summary)
    });

    let summary = worker.await.context("playback task panicked")?;
    ctrl_c.abort();
    summary
}

fn count_motion(steps: &[Step]) -> usize {
    steps
        .iter()
        .map(|step| {
            usize::from(step.is_motion())
                + step.children().into_iter().map(count_motion).sum::<usize>()
        })
        .sum()
}

fn print_tree(steps: &[Step], depth: usize) {
    for (index, step) in steps.iter().enumerate() {
        println!("{}{}. {}", "  ".repeat(depth), index + 1, step.tag());
        for child in step.children() {
            print_tree(child, depth + 1);
        }
    }
}

