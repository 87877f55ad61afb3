//! ami-kernel: drive the behavioral AMI equalization model from the command line.

mod config;
mod output;
mod probe;
mod runner;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_ami_model::ModelConfig;
use lib_params::ParameterView;
use lib_types::units::{BitsPerSecond, Seconds};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ami-kernel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Run PRBS lanes through the model in-process
    Run {
        /// Path to the run file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Also write results into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a parameter string and show what the model would build
    Params {
        /// File holding the parameter string
        file: PathBuf,

        /// Data rate used to resolve timing (Gb/s)
        #[arg(long, default_value = "10")]
        data_rate_gbps: f64,

        /// Samples per UI used to resolve timing
        #[arg(long, default_value = "16")]
        samples_per_ui: usize,
    },

    /// Call AMI_Init/AMI_Close of a compiled model on an ideal impulse
    Probe {
        /// Path to the shared library
        #[arg(short, long)]
        library: PathBuf,

        /// Parameter string passed to AMI_Init
        #[arg(short, long, default_value = "")]
        params: String,

        /// Data rate (Gb/s)
        #[arg(long, default_value = "10")]
        data_rate_gbps: f64,

        /// Samples per UI
        #[arg(long, default_value = "16")]
        samples_per_ui: usize,

        /// Post-cursors to print
        #[arg(long, default_value = "4")]
        post_cursors: usize,
    },

    /// Generate a PRBS NRZ waveform as CSV
    Prbs {
        /// PRBS order (7, 9, 11, 15, 23, 31)
        #[arg(short, long, default_value = "7")]
        order: u8,

        /// Number of bits to generate
        #[arg(short, long, default_value = "1000")]
        bits: usize,

        /// Samples per bit
        #[arg(short, long, default_value = "16")]
        samples_per_bit: usize,

        /// Data rate (Gb/s), sets the time axis
        #[arg(long, default_value = "10")]
        data_rate_gbps: f64,

        /// Output file path (stdout when absent)
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Run { config, output } => {
            run_lanes(&config, output.as_deref(), cli.format)?;
        }
        Commands::Params { file, data_rate_gbps, samples_per_ui } => {
            show_params(&file, data_rate_gbps, samples_per_ui)?;
        }
        Commands::Probe { library, params, data_rate_gbps, samples_per_ui, post_cursors } => {
            probe_library(&library, &params, data_rate_gbps, samples_per_ui, post_cursors)?;
        }
        Commands::Prbs { order, bits, samples_per_bit, data_rate_gbps, output } => {
            generate_prbs(order, bits, samples_per_bit, data_rate_gbps, output)?;
        }
    }

    Ok(())
}

fn run_lanes(config_path: &Path, output_dir: Option<&Path>, format: OutputFormat) -> Result<()> {
    tracing::info!("Loading run file {:?}", config_path);

    let config = config::load_config(config_path)?;
    let results = runner::Runner::new(config).run()?;

    output::render(&results, format, &mut std::io::stdout().lock())?;

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
        output::write_results(&results, dir, format)?;
    }
    Ok(())
}

fn show_params(file: &Path, data_rate_gbps: f64, samples_per_ui: usize) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let view = ParameterView::parse(&text)?;

    println!("Root: {}", view.root_name());
    for (path, leaf) in view.leaves() {
        let usage = leaf.usage.map(|u| format!(" [{u:?}]")).unwrap_or_default();
        println!("  {path} = {}{usage}", leaf.value);
    }

    if samples_per_ui == 0 {
        anyhow::bail!("samples_per_ui must be at least 1");
    }
    let bit_time = BitsPerSecond::from_gbps(data_rate_gbps).ui();
    let sample_interval: Seconds = bit_time / samples_per_ui as f64;
    let model = ModelConfig::from_view(&view, sample_interval, bit_time)?;
    let pipeline = model.build_pipeline()?;

    println!();
    println!("Samples per UI: {}", model.samples_per_ui);
    println!("Stages: {}", pipeline.stage_names().join(" -> "));
    for warning in pipeline.warnings() {
        println!("  warning: {warning}");
    }
    for note in &model.notes {
        println!("  note: {note}");
    }
    Ok(())
}

fn probe_library(
    library: &Path,
    params: &str,
    data_rate_gbps: f64,
    samples_per_ui: usize,
    post_cursors: usize,
) -> Result<()> {
    if samples_per_ui == 0 {
        anyhow::bail!("samples_per_ui must be at least 1");
    }
    let bit_time = BitsPerSecond::from_gbps(data_rate_gbps).ui();
    let report = probe::probe(library, params, bit_time.0, samples_per_ui, post_cursors)?;

    println!("AMI_Init status: {}", report.status);
    println!("Message: {}", report.message);
    if !report.params_out.is_empty() {
        println!("Parameters out: {}", report.params_out);
    }
    if let Some((pre, rest)) = report.cursors.split_first() {
        println!("Pre-cursor:  {pre:.6}");
        if let Some((main, post)) = rest.split_first() {
            println!("Main cursor: {main:.6}");
            for (k, v) in post.iter().enumerate() {
                println!("Post-cursor {}: {v:.6}", k + 1);
            }
        }
    }

    if report.status != 1 {
        anyhow::bail!("AMI_Init failed: {}", report.message);
    }
    Ok(())
}

fn generate_prbs(
    order: u8,
    bits: usize,
    samples_per_bit: usize,
    data_rate_gbps: f64,
    output: Option<PathBuf>,
) -> Result<()> {
    use lib_dsp::prbs::PrbsGenerator;
    use std::io::Write;

    tracing::info!("Generating PRBS-{} with {} bits", order, bits);

    if samples_per_bit == 0 {
        anyhow::bail!("samples_per_bit must be at least 1");
    }
    let dt = BitsPerSecond::from_gbps(data_rate_gbps).ui() / samples_per_bit as f64;
    let mut gen = PrbsGenerator::new(order)?;
    let waveform = gen.generate_nrz(bits, samples_per_bit, dt);

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    writeln!(writer, "time_ps,value")?;
    for (i, &v) in waveform.samples.iter().enumerate() {
        writeln!(writer, "{},{}", waveform.time_at(i).as_ps(), v)?;
    }
    writer.flush()?;

    if let Some(path) = output {
        tracing::info!("Wrote {} samples to {:?}", waveform.len(), path);
    }
    Ok(())
}
