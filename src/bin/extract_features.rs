//! Extract HuBERT features for a batch of WAV files.
//!
//! Writes one `[C, T]` array per input (`.npy`, or raw little-endian f32 with
//! `--format raw`) and prints a JSON summary line per file on stdout.
//!
//! Usage:
//!     cargo run --release --features cli --bin extract_features -- \
//!         --extractor ChineseHubert --downsample 2 -o features/ data/wavs/
//!     cargo run --release --features cli --bin extract_features -- \
//!         --config extractor.json --device cuda speech.wav

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use candle_core::Tensor;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use hubert_frontend::{
    device_info, parse_device, AudioInput, ExecutionContext, ExtractorConfig, ExtractorRegistry,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// NumPy `.npy`, f32, shape [C, T]
    Npy,
    /// Headerless little-endian f32, channel-major
    Raw,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Npy => "npy",
            OutputFormat::Raw => "f32",
        }
    }
}

/// Extract frame-level HuBERT features from WAV files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WAV files or directories containing WAV files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Extractor key: ChineseHubertSoft, ChineseHubert or EnsembleHubert
    #[arg(short, long, default_value = "ChineseHubert")]
    extractor: String,

    /// JSON extractor config (overrides --extractor)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channels kept per frame (ChineseHubertSoft)
    #[arg(long)]
    gate_size: Option<usize>,

    /// Local soft checkpoint (ChineseHubertSoft)
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Hub model id or local directory (ChineseHubert)
    #[arg(long)]
    model: Option<String>,

    /// Comma-separated model list (EnsembleHubert)
    #[arg(long, value_delimiter = ',')]
    models: Option<Vec<String>>,

    /// Integer time downsampling factor
    #[arg(short, long)]
    downsample: Option<usize>,

    /// Device: auto, cpu, cuda, cuda:N, metal
    #[arg(long, default_value = "auto")]
    device: String,

    /// Output directory
    #[arg(short, long, default_value = "features")]
    output_dir: PathBuf,

    /// Output file format
    #[arg(long, value_enum, default_value_t = OutputFormat::Npy)]
    format: OutputFormat,
}

fn build_config(args: &Args) -> Result<ExtractorConfig> {
    let mut config = match &args.config {
        Some(path) => ExtractorConfig::from_file(path)
            .with_context(|| format!("Failed to read extractor config {}", path.display()))?,
        None => match ExtractorConfig::default_for(&args.extractor) {
            Some(config) => config,
            None => bail!(
                "unknown extractor '{}'. Supported: {}",
                args.extractor,
                ExtractorRegistry::with_builtins().names().join(", ")
            ),
        },
    };

    match &mut config {
        ExtractorConfig::ChineseHubertSoft(opts) => {
            if let Some(gate_size) = args.gate_size {
                opts.gate_size = gate_size;
            }
            if let Some(checkpoint) = &args.checkpoint {
                opts.checkpoint_path = Some(checkpoint.clone());
            }
        }
        ExtractorConfig::ChineseHubert(opts) => {
            if let Some(model) = &args.model {
                opts.model = model.clone();
            }
        }
        ExtractorConfig::EnsembleHubert(opts) => {
            if let Some(models) = &args.models {
                opts.models = models.clone();
            }
        }
    }

    let soft = matches!(config, ExtractorConfig::ChineseHubertSoft(_));
    if !soft && (args.gate_size.is_some() || args.checkpoint.is_some()) {
        bail!("--gate-size and --checkpoint only apply to ChineseHubertSoft");
    }
    if args.downsample.is_some() {
        config = config.with_downsample(args.downsample)?;
    }
    Ok(config)
}

/// Expand directories into their `.wav` files, sorted by name.
///
/// Outputs are named by file stem, so two inputs sharing a stem are rejected.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut wavs: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("Failed to list {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
                })
                .collect();
            wavs.sort();
            files.extend(wavs);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            bail!("input not found: {}", input.display());
        }
    }

    let mut seen: HashMap<String, &PathBuf> = HashMap::new();
    for file in &files {
        if let Some(first) = seen.insert(output_stem(file), file) {
            bail!(
                "{} and {} would write the same output file",
                first.display(),
                file.display()
            );
        }
    }
    Ok(files)
}

fn output_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "features".to_string())
}

fn write_raw_f32(path: &Path, features: &Tensor) -> Result<()> {
    let values: Vec<f32> = features.flatten_all()?.to_vec1()?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writer.write_f32::<LittleEndian>(value)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_features(path: &Path, features: &Tensor, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Npy => features.write_npy(path)?,
        OutputFormat::Raw => write_raw_f32(path, features)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let _profiling_guard = hubert_frontend::profiling::init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let inputs = collect_inputs(&args.inputs)?;
    if inputs.is_empty() {
        bail!("no WAV files found");
    }

    let device = parse_device(&args.device)?;
    tracing::info!("Device: {}", device_info(&device));
    let ctx = ExecutionContext::for_device(device);

    let registry = ExtractorRegistry::with_builtins();
    let extractor = registry
        .build(&config, &ctx)
        .with_context(|| format!("Failed to build {}", config.key()))?;

    fs::create_dir_all(&args.output_dir)?;

    let progress = ProgressBar::new(inputs.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("#>-"),
    );

    for input in &inputs {
        let start = Instant::now();
        let features = extractor
            .extract(AudioInput::Path(input.as_path()), &ctx)
            .with_context(|| format!("Failed to extract {}", input.display()))?;
        // [1, C, T] -> [C, T]
        let features = features.squeeze(0)?;
        let (channels, frames) = features.dims2()?;

        let stem = output_stem(input);
        let output = args
            .output_dir
            .join(format!("{stem}.{}", args.format.extension()));
        write_features(&output, &features, args.format)?;

        let summary = serde_json::json!({
            "input": input.display().to_string(),
            "output": output.display().to_string(),
            "extractor": extractor.name(),
            "channels": channels,
            "frames": frames,
            "elapsed_ms": start.elapsed().as_secs_f64() * 1000.0,
        });
        progress.suspend(|| println!("{summary}"));
        progress.inc(1);
    }

    progress.finish_and_clear();
    tracing::info!(
        "Wrote {} feature files to {}",
        inputs.len(),
        args.output_dir.display()
    );
    Ok(())
}
