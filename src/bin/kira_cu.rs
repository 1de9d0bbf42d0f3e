use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use kira_codon_usage::config::ConfigLoader;
use kira_codon_usage::domain::Kingdom;
use kira_codon_usage::error::KiraError;
use kira_codon_usage::fetch::ReqwestTransport;
use kira_codon_usage::harvest::{Harvester, RunOutcome, RunRequest};
use kira_codon_usage::output::{JsonOutput, OutputMode};
use kira_codon_usage::parser::SideChannels;
use kira_codon_usage::progress::{Liveness, ProgressSink, StatusEvent};
use kira_codon_usage::store::{JsonStore, ResultStore, StoredNode};

#[derive(Parser)]
#[command(name = "kira-cu")]
#[command(about = "Harvests replicon records per kingdom and computes codon usage statistics")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download and process the organisms of the selected kingdoms")]
    Run(RunArgs),
    #[command(about = "Show the stored results of a kingdom")]
    Tree(TreeArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long = "kingdom", value_enum, required = true)]
    kingdoms: Vec<Kingdom>,

    #[arg(long)]
    bio_project: Option<String>,

    #[arg(long)]
    gene_text: bool,

    #[arg(long)]
    genome_text: bool,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct TreeArgs {
    #[arg(long, value_enum)]
    kingdom: Kingdom,

    #[arg(long)]
    config: Option<String>,
}

struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: StatusEvent) {
        match event {
            StatusEvent::Task(progress) => {
                debug!(
                    state = %progress.state,
                    current = progress.current,
                    total = progress.total,
                    "progress"
                );
            }
            StatusEvent::Download(download) => {
                if let Some(label) = download.downloaded {
                    debug!(count = download.count, "downloaded {label}");
                }
            }
            StatusEvent::Api(status) => match status.liveness {
                Liveness::Online => debug!("{}", status.message),
                Liveness::Trouble | Liveness::Offline => warn!("{}", status.message),
            },
            StatusEvent::Eta(Some(eta)) => {
                let secs = eta.as_secs();
                info!(
                    "ETA: {}h {}min {}s",
                    secs / 3600,
                    (secs / 60) % 60,
                    secs % 60
                );
            }
            StatusEvent::Eta(None) => {}
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidKingdom(_)
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::InvalidConfig(_) => 2,
        KiraError::Transport(_)
        | KiraError::HttpStatus { .. }
        | KiraError::EmptyResponse { .. } => 3,
        KiraError::NothingToProcess => 4,
        KiraError::Interrupted => 130,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_harvest(args, output_mode),
        Commands::Tree(args) => run_tree(args, output_mode),
    }
}

/// Prokaryotes are filed under Bacteria and Archaea, so both are scheduled
/// along with it. The harvester processes an organism listed by several of
/// them once.
fn expand_kingdoms(kingdoms: &[Kingdom]) -> Vec<Kingdom> {
    let mut expanded = Vec::new();
    for kingdom in kingdoms {
        expanded.push(*kingdom);
        if *kingdom == Kingdom::Prokaryotes {
            expanded.push(Kingdom::Bacteria);
            expanded.push(Kingdom::Archaea);
        }
    }
    expanded
}

fn run_harvest(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let transport = ReqwestTransport::new(&config)?;
    let store = JsonStore::new(config.output_root.clone());
    let sink: Arc<dyn ProgressSink> = match output_mode {
        OutputMode::Interactive => Arc::new(LogSink),
        OutputMode::NonInteractive => Arc::new(JsonOutput),
    };
    let harvester = Harvester::new(config, transport, store, vec![sink])?;
    let cancel = harvester.cancel_token();
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping after in-flight genes");
        cancel.cancel();
    })
    .into_diagnostic()?;

    let request = RunRequest {
        kingdoms: expand_kingdoms(&args.kingdoms),
        bio_project: args.bio_project,
        channels: SideChannels {
            gene_text: args.gene_text,
            genome_text: args.genome_text,
        },
    };
    let outcome = harvester.run(&request)?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_run(&outcome).into_diagnostic()?,
        OutputMode::Interactive => print_run_summary(&outcome),
    }
    match outcome_error(&outcome) {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn outcome_error(outcome: &RunOutcome) -> Option<KiraError> {
    match outcome {
        RunOutcome::Finished(_) => None,
        RunOutcome::Interrupted(_) => Some(KiraError::Interrupted),
        RunOutcome::NothingToProcess => Some(KiraError::NothingToProcess),
    }
}

fn run_tree(args: TreeArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let store = JsonStore::new(config.output_root);
    let tree = store.tree(args.kingdom)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_tree(&tree).into_diagnostic()?,
        OutputMode::Interactive => print_tree(&tree, 0),
    }
    Ok(())
}

fn print_run_summary(outcome: &RunOutcome) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}KIRA-CU summary{reset}");
    println!("{}", outcome.message());
    let Some(summary) = outcome.summary() else {
        return;
    };
    for kingdom in &summary.kingdoms {
        println!("{cyan}  {}: {} organisms{reset}", kingdom.kingdom, kingdom.organisms);
    }
    println!(
        "{green}Organisms processed: {}/{}{reset}",
        summary.processed.organisms, summary.eligible
    );
    println!("{green}Genes processed: {}{reset}", summary.processed.genes);
    if summary.processed.reused > 0 {
        println!("{green}Plasmids reused: {}{reset}", summary.processed.reused);
    }
    println!("{yellow}Genes missing: {}{reset}", summary.processed.missing);
    if summary.api_degraded {
        println!("{yellow}API Online - Could not get all data (server issues){reset}");
    }
}

fn print_tree(node: &StoredNode, depth: usize) {
    let marker = if node.is_file { "" } else { "/" };
    println!("{}{}{marker}", "  ".repeat(depth), node.name);
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}
