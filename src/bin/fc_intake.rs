use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use flowcell_intake::app::App;
use flowcell_intake::config::{ConfigLoader, ResolvedConfig};
use flowcell_intake::domain::{FlowcellId, Organism};
use flowcell_intake::error::IntakeError;
use flowcell_intake::output::{JsonOutput, OutputMode, TextOutput};
use flowcell_intake::pipeline::NextflowInvoker;
use flowcell_intake::samplesheet::SamplesheetOutcome;
use flowcell_intake::transfer::RsyncTransferAgent;

#[derive(Parser)]
#[command(name = "fc-intake")]
#[command(about = "Bulk RNA-seq flowcell intake: fetch, split by organism, run nf-core/rnaseq, archive")]
#[command(version, author)]
struct Cli {
    /// Path to flowcell-intake.json
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Advance every RNA flowcell in the metadata sheet, newest first")]
    Run,
    #[command(about = "Advance a single flowcell")]
    Advance(FlowcellArgs),
    #[command(about = "Show the stage of each flowcell partition")]
    Status(StatusArgs),
    #[command(about = "Build the samplesheet of one organism partition")]
    Samplesheet(SamplesheetArgs),
}

#[derive(Args)]
struct FlowcellArgs {
    flowcell: String,
}

#[derive(Args)]
struct StatusArgs {
    flowcell: Option<String>,
}

#[derive(Args)]
struct SamplesheetArgs {
    flowcell: String,
    organism: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<IntakeError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IntakeError) -> u8 {
    match error {
        IntakeError::MissingConfig
        | IntakeError::ConfigRead(_)
        | IntakeError::ConfigParse(_)
        | IntakeError::ConfigInvalid(_) => 2,
        IntakeError::MissingTool(_) | IntakeError::LockHeld(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = build_app(config);

    match cli.command {
        Commands::Run => run_flowcells(&app, None, output_mode),
        Commands::Advance(args) => {
            let flowcell = args.flowcell.parse::<FlowcellId>()?;
            run_flowcells(&app, Some(&flowcell), output_mode)
        }
        Commands::Status(args) => {
            let flowcell = args
                .flowcell
                .map(|value| value.parse::<FlowcellId>())
                .transpose()?;
            let report = app.status(flowcell.as_ref())?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_status(&report).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_status(&report),
            }
            Ok(())
        }
        Commands::Samplesheet(args) => {
            let flowcell = args.flowcell.parse::<FlowcellId>()?;
            let organism = args.organism.parse::<Organism>()?;
            let outcome = app.samplesheet(&flowcell, &organism)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_samplesheet(&outcome).into_diagnostic()?,
                OutputMode::Text => match &outcome {
                    SamplesheetOutcome::Existing { path } => println!("{path} (existing)"),
                    SamplesheetOutcome::Written { path, samples } => {
                        println!("{path} ({samples} samples)")
                    }
                },
            }
            Ok(())
        }
    }
}

fn build_app(config: ResolvedConfig) -> App<RsyncTransferAgent, NextflowInvoker> {
    let transfer = RsyncTransferAgent::new(config.transfer.clone());
    let pipeline = NextflowInvoker::new(config.pipeline.clone(), config.reference_root.clone());
    App::new(config, transfer, pipeline)
}

fn run_flowcells(
    app: &App<RsyncTransferAgent, NextflowInvoker>,
    only: Option<&FlowcellId>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let report = app.run(only)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_run(&report),
    }
    Ok(())
}
