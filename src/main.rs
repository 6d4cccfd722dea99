use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::Level;

use netdict::io_utils::{netdict_cli_error, simple_cli_error};
use netdict::{
    build_merge_sources, dump, merge_to_file, resolve_inputs, verify_output_path,
    write_history_csv, ChangelistFilter, DictionaryGenerator, GenerationReport, GeneratorConfig,
    ZstdCodec,
};

/// Build network compression dictionaries from packet captures.
#[derive(Parser)]
#[command(name = "netdict", version)]
struct Cli {
    /// More logging (-v debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// JSON settings file with default tunables
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one dictionary per capture directory of a project
    #[command(alias = "AutoGenerateDictionaries")]
    AutoGenerate {
        /// Project directory holding the capture and dictionary folders
        project: PathBuf,
        /// Only use captures whose names contain this changelist ("all" for every capture)
        changelist: Option<String>,
        #[command(flatten)]
        tunables: Tunables,
        #[command(flatten)]
        output: OutputFlags,
    },
    /// Merge capture files into one capture
    #[command(alias = "MergePackets")]
    Merge {
        /// Merged capture to write
        output: PathBuf,
        /// Capture files or directories, optionally comma separated
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<String>,
        /// Overwrite the output without asking
        #[arg(long)]
        force: bool,
    },
    /// Generate a dictionary from capture files
    #[command(alias = "GenerateDictionary")]
    Generate {
        /// Dictionary file to write
        output: PathBuf,
        /// Substring capture names must contain ("all" for every capture)
        filename_filter: String,
        /// Changelist capture names must contain ("all" for every capture)
        changelist: String,
        /// Capture files or directories, optionally comma separated
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<String>,
        #[command(flatten)]
        tunables: Tunables,
        #[command(flatten)]
        output_flags: OutputFlags,
        /// Write the per-generation search history as CSV
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Convert captures to the flat .bin layout, mirroring the directory tree
    #[command(alias = "DebugDump")]
    DebugDump {
        /// Directory receiving the .bin files
        output_dir: PathBuf,
        /// Directory searched for captures
        capture_dir: PathBuf,
        /// Only dump captures whose names contain this changelist
        changelist: Option<String>,
    },
}

/// Overrides for the settings file.
#[derive(Args, Default)]
struct Tunables {
    /// Hash table size in bits
    #[arg(long)]
    hash_table_bits: Option<u32>,
    /// Target dictionary size in bytes
    #[arg(long)]
    dictionary_size: Option<usize>,
    /// Trials per generation
    #[arg(long)]
    trials: Option<usize>,
    /// Percent of the selection replaced per trial
    #[arg(long)]
    randomness: Option<u32>,
    /// Number of generations
    #[arg(long)]
    generations: Option<usize>,
    /// Percent of randomness kept from one generation to the next
    #[arg(long)]
    randomness_decay: Option<u32>,
    /// Seed for the trial search
    #[arg(long)]
    seed: Option<u64>,
    /// Train on the whole dictionary pool without trials
    #[arg(long)]
    no_trials: bool,
    /// Reserve packets and report compression with the new dictionary
    #[arg(long)]
    compression_test: bool,
    /// Show a progress bar during the search
    #[arg(long)]
    progress: bool,
}

#[derive(Args, Default)]
struct OutputFlags {
    /// Overwrite existing dictionaries without asking
    #[arg(long)]
    force: bool,
    /// Print the generation report as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            GeneratorConfig::load(path).map_err(|e| netdict_cli_error("loading settings", e))?
        }
        None => GeneratorConfig::default(),
    };

    match cli.command {
        Command::AutoGenerate {
            project,
            changelist,
            tunables,
            output,
        } => {
            apply_tunables(&mut config, &tunables);
            let changelist = ChangelistFilter::parse(changelist.as_deref().unwrap_or("all"));
            let codec = codec_for(&config);
            let reports = DictionaryGenerator::new(&config, &codec)
                .with_progress(tunables.progress)
                .auto_generate(&project, &changelist, |path| {
                    output.force || confirm_overwrite(path)
                })
                .map_err(|e| netdict_cli_error("auto-generating dictionaries", e))?;
            if reports.is_empty() {
                eprintln!("No dictionaries written: every existing output was kept");
            }
            for report in &reports {
                print_report(report, output.json)?;
            }
        }
        Command::Merge {
            output,
            inputs,
            force,
        } => {
            if !verify_output_path(&output, |p| force || confirm_overwrite(p)) {
                return Err(simple_cli_error("merge cancelled: output exists").into());
            }
            let filter = config.layout.capture_filter();
            let files = resolve_inputs(&inputs, &filter)
                .map_err(|e| netdict_cli_error("resolving inputs", e))?;
            let sources = build_merge_sources(&files, &filter, false)
                .map_err(|e| netdict_cli_error("merging captures", e))?;
            let count = merge_to_file(sources, &output)
                .map_err(|e| netdict_cli_error("merging captures", e))?;
            eprintln!("Merged {} packets from {} files into {}", count, files.len(), output.display());
        }
        Command::Generate {
            output,
            filename_filter,
            changelist,
            inputs,
            tunables,
            output_flags,
            history,
        } => {
            apply_tunables(&mut config, &tunables);
            if !verify_output_path(&output, |p| output_flags.force || confirm_overwrite(p)) {
                return Err(simple_cli_error("generation cancelled: output exists").into());
            }
            let filter = config
                .layout
                .capture_filter()
                .with_filename(&filename_filter)
                .with_changelist(ChangelistFilter::parse(&changelist));
            let files = resolve_inputs(&inputs, &filter)
                .map_err(|e| netdict_cli_error("resolving inputs", e))?;
            let codec = codec_for(&config);
            let report = DictionaryGenerator::new(&config, &codec)
                .with_progress(tunables.progress)
                .generate(&files, &output)
                .map_err(|e| netdict_cli_error("generating dictionary", e))?;
            if let Some(path) = history {
                write_history_csv(&report.history, &path)
                    .map_err(|e| netdict_cli_error("writing search history", e))?;
            }
            print_report(&report, output_flags.json)?;
        }
        Command::DebugDump {
            output_dir,
            capture_dir,
            changelist,
        } => {
            let filter = config
                .layout
                .capture_filter()
                .with_changelist(ChangelistFilter::parse(changelist.as_deref().unwrap_or("all")));
            let summary = dump(&capture_dir, &output_dir, &filter, &config.layout.dump_extension)
                .map_err(|e| netdict_cli_error("debug dump", e))?;
            eprintln!(
                "Debug dump: {} succeeded, {} failed",
                summary.succeeded.len(),
                summary.failed.len()
            );
            for failure in &summary.failed {
                eprintln!("  {failure}");
            }
            if !summary.is_clean() {
                return Err(simple_cli_error(&format!(
                    "debug dump finished with {} failed file(s)",
                    summary.failed.len()
                ))
                .into());
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::WARN
    } else if verbose > 0 {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn apply_tunables(config: &mut GeneratorConfig, t: &Tunables) {
    let trial = &mut config.trial;
    if let Some(v) = t.hash_table_bits {
        trial.hash_table_bits = v;
    }
    if let Some(v) = t.dictionary_size {
        trial.dictionary_size = v;
    }
    if let Some(v) = t.trials {
        trial.trials = v;
    }
    if let Some(v) = t.randomness {
        trial.randomness_percent = v;
    }
    if let Some(v) = t.generations {
        trial.generations = v;
    }
    if let Some(v) = t.randomness_decay {
        trial.randomness_decay_percent = v;
    }
    if let Some(v) = t.seed {
        trial.seed = v;
    }
    trial.no_trials |= t.no_trials;
    config.pool.compression_test |= t.compression_test;
}

fn codec_for(config: &GeneratorConfig) -> ZstdCodec {
    ZstdCodec::new(config.trial.dictionary_size)
}

fn confirm_overwrite(path: &Path) -> bool {
    eprint!("'{}' already exists. Overwrite? [y/N] ", path.display());
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_report(report: &GenerationReport, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    eprintln!(
        "Wrote {} ({} bytes, sha256 {})",
        report.output.display(),
        report.dictionary_bytes,
        report.sha256
    );
    eprintln!(
        "Read {} packets from {} files; trained on {} packets ({} bytes)",
        report.pools.packets_read, report.sources, report.selected_packets, report.selected_bytes
    );
    for g in &report.history {
        eprintln!(
            "  generation {}: randomness {}%, best trial {} scored {:.4}, carried {:.4}{}",
            g.generation,
            g.randomness_percent,
            g.winning_trial,
            g.winning_score,
            g.carried_score,
            if g.improved { " (improved)" } else { "" }
        );
    }
    if let Some(test) = &report.compression_test {
        test.report();
    }
    Ok(())
}
