use anyhow::{Context, Result};
use chunkpipe::cli::output::*;
use chunkpipe::cli::Cli;
use chunkpipe::{ExecutionEvent, PipelineConfig, PipelineController, PipelineRun, StagesConfig};
use clap::error::ErrorKind;
use indicatif::ProgressBar;
use std::sync::{Arc, Mutex};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Malformed arguments or unusable configuration
const EXIT_USAGE: i32 = -1;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_from_args() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                std::process::exit(EXIT_USAGE);
            }
        },
    };

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{} {:#}", CROSS, e);
        std::process::exit(EXIT_USAGE);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            println!("{} {:#}", CROSS, style(&e).red());
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set logging subscriber")
}

/// Run the pipeline, returning the process exit code
async fn run(cli: Cli) -> Result<i32> {
    let config = match PipelineConfig::new(cli.chunk_count, cli.working_directory(), &cli.input) {
        Ok(config) => config,
        Err(e) => {
            println!("{} {}", CROSS, style(&e).red());
            return Ok(e.exit_code());
        }
    };

    let stages_config = match &cli.stages {
        Some(path) => StagesConfig::from_file(path)
            .with_context(|| format!("Failed to load stage file {}", path.display()))?,
        None => StagesConfig::default_stages(),
    };
    let stages = stages_config.to_stages()?;

    println!("{} Proceeding with options:", INFO);
    println!("  Processes (-p)        = {}", style(config.chunk_count).cyan());
    println!("  Output directory (-d) = {}", style(config.working_directory.display()).cyan());
    println!("  Input file (-f)       = {}", style(config.input_path.display()).cyan());
    println!(
        "  Stages                = {}",
        style(
            stages
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        )
        .cyan()
    );
    println!();

    let mut controller = PipelineController::new();
    let progress: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
    controller.add_event_handler(move |event| handle_event(&progress, event));

    let mut run = PipelineRun::new(config, stages);
    let result = controller.execute(&mut run).await;

    if cli.json {
        let summary = run.summary();
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    match result {
        Ok(()) => {
            println!(
                "\n{} Completed all stages {} in {}",
                CHECK,
                style("successfully").green(),
                format_duration(run.stages_elapsed())
            );
            Ok(0)
        }
        Err(e) => {
            println!(
                "\n{} Run {} during {}",
                CROSS,
                style("failed").red(),
                style(run.failed_phase.map(|p| p.to_string()).unwrap_or_default()).bold()
            );
            error!("{}", e);
            Ok(e.exit_code())
        }
    }
}

/// Print events, keeping a progress bar alive while a stage runs
fn handle_event(progress: &Mutex<Option<ProgressBar>>, event: ExecutionEvent) {
    let line = format_execution_event(&event);
    let mut bar = match progress.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    match &event {
        ExecutionEvent::StageStarted { chunk_count, .. } => {
            println!("{}", line);
            *bar = Some(create_progress_bar(*chunk_count));
        }
        ExecutionEvent::ChunkCompleted { .. } | ExecutionEvent::ChunkFailed { .. } => match bar.as_ref() {
            Some(pb) => {
                pb.println(line);
                pb.inc(1);
            }
            None => println!("{}", line),
        },
        ExecutionEvent::StageCompleted { .. } | ExecutionEvent::StageFailed { .. } => {
            if let Some(pb) = bar.take() {
                pb.finish_and_clear();
            }
            println!("{}", line);
        }
        _ => println!("{}", line),
    }
}
