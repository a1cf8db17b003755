use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use genebase::app::{App, ProgressSink, RunResult, dedup_file, read_terms, write_organism_table};
use genebase::config::{ConfigLoader, ConfigOverrides};
use genebase::dedup::DedupSummary;
use genebase::error::GenebaseError;
use genebase::output::{JsonOutput, OutputMode, StderrProgress};
use genebase::store::OutputLayout;
use genebase::uniprot::UniprotHttpClient;

#[derive(Parser)]
#[command(name = "genebase")]
#[command(about = "Collect taxon-scoped UniProt proteins for a gene list and deduplicate them")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch every term of an input file and deduplicate the result")]
    Fetch(FetchArgs),
    #[command(about = "Deduplicate an existing FASTA collection")]
    Dedup(DedupArgs),
    #[command(about = "Rebuild the protein/organism table from raw per-term files")]
    Taxa(TaxaArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Text file with one gene or protein name per line
    #[arg(long, short)]
    input: Utf8PathBuf,

    #[arg(long, short, default_value = "genebase-out")]
    out_dir: Utf8PathBuf,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    taxonomy_filter: Option<String>,

    #[arg(long)]
    per_taxon_cap: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    page_size: Option<usize>,
}

#[derive(Args)]
struct DedupArgs {
    input: Utf8PathBuf,

    #[arg(long, short, default_value = "genebase-out")]
    out_dir: Utf8PathBuf,
}

#[derive(Args)]
struct TaxaArgs {
    #[arg(long, short, default_value = "genebase-out")]
    out_dir: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<GenebaseError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GenebaseError) -> u8 {
    match error {
        GenebaseError::InputRead(_)
        | GenebaseError::ConfigRead(_)
        | GenebaseError::ConfigParse(_)
        | GenebaseError::InvalidTerm(_)
        | GenebaseError::InvalidAccession(_) => 2,
        GenebaseError::UniprotHttp(_)
        | GenebaseError::UniprotTransient(_)
        | GenebaseError::UniprotStatus { .. }
        | GenebaseError::UniprotPayload(_)
        | GenebaseError::Fetch { .. } => 3,
        GenebaseError::Cancelled => 130,
        GenebaseError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Dedup(args) => run_dedup(args, output_mode),
        Commands::Taxa(args) => run_taxa(args, output_mode),
    }
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let overrides = ConfigOverrides {
        taxonomy_filter: args.taxonomy_filter,
        per_taxon_cap: args.per_taxon_cap,
        batch_size: args.batch_size,
        page_size: args.page_size,
    };
    let config = ConfigLoader::resolve(args.config.as_deref(), &overrides)?;
    let terms = read_terms(&args.input)?;
    let layout = OutputLayout::new(args.out_dir);
    let client = UniprotHttpClient::new(config.timeout())?;
    let app = App::new(client, config);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &StderrProgress,
    };
    let result = app.run(&terms, &layout, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&result).into_diagnostic()?,
        OutputMode::Human => print_run_summary(&result),
    }
    Ok(())
}

fn run_dedup(args: DedupArgs, output_mode: OutputMode) -> miette::Result<()> {
    let layout = OutputLayout::new(args.out_dir);
    let summary = dedup_file(&args.input, &layout)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_dedup(&summary).into_diagnostic()?,
        OutputMode::Human => print_dedup_summary(&summary, &layout),
    }
    Ok(())
}

fn run_taxa(args: TaxaArgs, output_mode: OutputMode) -> miette::Result<()> {
    let layout = OutputLayout::new(args.out_dir);
    let table = write_organism_table(&layout)?;
    if matches!(output_mode, OutputMode::Human) {
        println!(
            "{} term(s) written to {}",
            table.rows().len(),
            layout.organism_table_path()
        );
    }
    Ok(())
}

fn print_run_summary(result: &RunResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}genebase summary{reset}");
    println!(
        "{green}terms with records: {}{reset}",
        result.terms.len() - result.not_found.len()
    );
    println!("{yellow}terms not found: {}{reset}", result.not_found.len());
    println!("{green}combined records: {}{reset}", result.combined_records);
    match &result.dedup {
        Some(summary) => {
            println!(
                "{green}unique sequences: {} (duplicates dropped: {}){reset}",
                summary.unique_records, summary.duplicate_records
            );
            println!("{cyan}   dedup: {}{reset}", result.paths.dedup);
            println!("{cyan}   report: {}{reset}", result.paths.report);
        }
        None => println!("{yellow}no records found, nothing to deduplicate{reset}"),
    }
    if !result.not_found.is_empty() {
        println!("{yellow}   not found: {}{reset}", result.paths.not_found);
    }
}

fn print_dedup_summary(summary: &DedupSummary, layout: &OutputLayout) {
    println!(
        "{} record(s), {} unique, {} duplicate(s)",
        summary.total_records, summary.unique_records, summary.duplicate_records
    );
    println!("dedup: {}", layout.dedup_path());
    println!("report: {}", layout.report_path());
}
