//! # CLI Module
//!
//! Command-line interface for the signing pipeline.
//!
//! ## Usage
//! ```bash
//! # Sign the Fibonacci sample
//! signer sign
//!
//! # Sign explicit numbers
//! signer sign 4 8 15 16 23 42
//!
//! # Simulate slow primitives and give up after two seconds
//! signer sign 1 2 3 --checksum-delay-ms 100 --digest-delay-ms 10 --timeout-ms 2000
//!
//! # JSON output
//! signer sign 1 2 3 --output json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use pipeline_signer::core::signer::SignerConfig;
use pipeline_signer::core::stages::{standard_pipeline, MULTI_HASH_STAGE};
use pipeline_signer::core::PipelineBuilder;
use pipeline_signer::error::Result;
use pipeline_signer::events::{Event, EventChannel, PipelineEvent, PipelineSummary, StageEvent};
use std::thread;
use std::time::Duration;

/// Items signed when none are given on the command line
const SAMPLE_ITEMS: [i64; 7] = [0, 1, 1, 2, 3, 5, 8];

/// Pipeline Signer - deterministic signatures from concurrent hashing
#[derive(Parser, Debug)]
#[command(name = "signer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute the combined signature of a list of integers
    Sign {
        /// Integers to sign (defaults to 0 1 1 2 3 5 8)
        #[arg(allow_negative_numbers = true)]
        items: Vec<i64>,

        /// Capacity of each queue between stages
        #[arg(long, default_value = "100")]
        capacity: usize,

        /// Worker threads for the expansion stage (default: CPU count)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Worker threads for the dual-hash stage (default: CPU count)
        #[arg(long)]
        signing_workers: Option<usize>,

        /// Abort if the run takes longer than this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Simulated latency of every checksum call
        #[arg(long, default_value = "0")]
        checksum_delay_ms: u64,

        /// Simulated latency of every digest call
        #[arg(long, default_value = "0")]
        digest_delay_ms: u64,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// The signature only
    Plain,
}

/// Options of one `sign` invocation
struct SignOptions {
    items: Vec<i64>,
    capacity: usize,
    workers: Option<usize>,
    signing_workers: Option<usize>,
    timeout: Option<Duration>,
    checksum_delay: Duration,
    digest_delay: Duration,
    output: OutputFormat,
    verbose: bool,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sign {
            items,
            capacity,
            workers,
            signing_workers,
            timeout_ms,
            checksum_delay_ms,
            digest_delay_ms,
            output,
            verbose,
        } => run_sign(SignOptions {
            items: if items.is_empty() {
                SAMPLE_ITEMS.to_vec()
            } else {
                items
            },
            capacity,
            workers,
            signing_workers,
            timeout: timeout_ms.map(Duration::from_millis),
            checksum_delay: Duration::from_millis(checksum_delay_ms),
            digest_delay: Duration::from_millis(digest_delay_ms),
            output,
            verbose,
        }),
    }
}

fn run_sign(options: SignOptions) -> Result<()> {
    let term = Term::stderr();
    let pretty = matches!(options.output, OutputFormat::Pretty);

    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("Pipeline Signer").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let signer = SignerConfig::new()
        .checksum_delay(options.checksum_delay)
        .digest_delay(options.digest_delay)
        .build();

    let mut builder = PipelineBuilder::new()
        .queue_capacity(options.capacity)
        .signer(signer);
    if let Some(workers) = options.workers {
        builder = builder.expansion_workers(workers);
    }
    if let Some(workers) = options.signing_workers {
        builder = builder.signing_workers(workers);
    }
    if let Some(timeout) = options.timeout {
        builder = builder.deadline(timeout);
    }

    let item_count = options.items.len();
    let pipeline = standard_pipeline(builder, options.items);

    let (sender, receiver) = EventChannel::new();

    let progress = if pretty {
        let pb = ProgressBar::new(item_count as u64);
        if let Ok(bar_style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("█▓░"));
        }
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();
    let verbose = options.verbose;

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        let mut summary: Option<PipelineSummary> = None;
        for event in receiver.iter() {
            match event {
                Event::Stage(StageEvent::Started { stage }) if verbose => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_message(stage);
                    }
                }
                Event::Stage(StageEvent::Progress(p)) if p.stage == MULTI_HASH_STAGE => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_position(p.emitted as u64);
                    }
                }
                Event::Stage(StageEvent::Failed { stage, message }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.println(format!("{} {}: {}", style("✗").red(), stage, message));
                    }
                }
                Event::Pipeline(PipelineEvent::Completed { summary: s }) => {
                    summary = Some(s);
                    if let Some(ref pb) = progress_clone {
                        pb.finish_and_clear();
                    }
                }
                Event::Pipeline(PipelineEvent::Error { .. })
                | Event::Pipeline(PipelineEvent::Cancelled { .. }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.abandon();
                    }
                }
                _ => {}
            }
        }
        summary
    });

    let result = pipeline.run_single_with_events(&sender);

    // Drop sender to signal event thread to finish. After a deadline the
    // detached stages still hold senders, so don't wait on the listener then.
    drop(sender);
    let summary = if result.is_ok() {
        event_thread.join().ok().flatten()
    } else {
        None
    };

    let signature = result?;

    match options.output {
        OutputFormat::Pretty => print_pretty_result(&term, &signature, summary.as_ref(), verbose),
        OutputFormat::Json => print_json_result(&signature, summary.as_ref()),
        OutputFormat::Plain => println!("{}", signature),
    }

    Ok(())
}

fn print_pretty_result(
    term: &Term,
    signature: &str,
    summary: Option<&PipelineSummary>,
    verbose: bool,
) {
    term.write_line(&format!("{} Signed", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    if let Some(summary) = summary {
        term.write_line(&format!(
            "  {} items signed in {:.3}s",
            style(summary.source_items()).cyan(),
            summary.duration_ms as f64 / 1000.0
        ))
        .ok();

        if verbose {
            term.write_line(&format!("  {} {}", style("run").dim(), summary.run_id))
                .ok();
            for stage in &summary.stages {
                term.write_line(&format!(
                    "    {:<16} {} emitted",
                    stage.stage,
                    style(stage.items_emitted).cyan()
                ))
                .ok();
            }
        }
        term.write_line("").ok();
    }

    println!("{}", signature);
}

fn print_json_result(signature: &str, summary: Option<&PipelineSummary>) {
    let output = serde_json::json!({
        "signature": signature,
        "summary": summary,
    });

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to render JSON: {}", e),
    }
}
