use clap::{Parser, Subcommand};
use image_variants::config::{self, ImagingConfig};
use image_variants::imaging::{
    self, BackendSelector, BackendVariant, CropSpec, ImageBackend, VariantRequest, VariantSummary,
};
use image_variants::output::{self, BatchOutcome};
use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Options shared by `variant` and `batch`.
#[derive(clap::Args, Clone)]
struct VariantArgs {
    /// Downscale to fit within this width (keeps aspect ratio)
    #[arg(long)]
    max_width: Option<u32>,

    /// Downscale to fit within this height (keeps aspect ratio)
    #[arg(long)]
    max_height: Option<u32>,

    /// Crop after resizing, as JSON: '{"gravity":"center","width":400,"height":300}'
    /// or '{"left":10,"top":10,"right":410,"bottom":310}'
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropSpec>,

    /// Output format (jpeg, png, webp, avif, ...). `jpg` is accepted
    #[arg(long)]
    format: Option<String>,
}

impl VariantArgs {
    fn request(&self) -> VariantRequest {
        let max_size = match (self.max_width, self.max_height) {
            (None, None) => None,
            (w, h) => Some((w.unwrap_or(u32::MAX), h.unwrap_or(u32::MAX))),
        };
        VariantRequest {
            max_size,
            crop: self.crop.clone(),
            format: self.format.clone(),
        }
    }
}

fn parse_crop(s: &str) -> Result<CropSpec, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid crop JSON: {e}"))
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "image-variants")]
#[command(about = "Resize, crop, and re-encode images with ImageMagick or pure Rust")]
#[command(long_about = "\
Resize, crop, and re-encode images with ImageMagick or pure Rust

The richest available engine is picked at startup: ImageMagick when the
`magick` or `convert` binary works, the built-in Rust engine otherwise.

Crop gravities:

  north_west ── north ── north_east
      │           │           │
    west ───── center ───── east
      │           │           │
  south_west ── south ── south_east

Run 'image-variants gen-config' to generate a documented imaging.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory containing imaging.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Force a backend instead of probing in priority order
    #[arg(long, global = true)]
    backend: Option<BackendVariant>,

    /// Log every backend operation to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print an image's format, mimetype and dimensions
    Identify {
        input: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write one variant of an image
    Variant {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        args: VariantArgs,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a variant of every input into a directory, in parallel
    Batch {
        output_dir: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[command(flatten)]
        args: VariantArgs,
    },
    /// Probe every backend and show which one would be used
    Backends,
    /// Print a stock imaging.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let load = || -> Result<(ImagingConfig, BackendSelector), config::ConfigError> {
        let config = config::load_config(&cli.config_dir)?;
        let selector = BackendSelector::from_config(&config);
        Ok((config, selector))
    };

    match cli.command {
        Command::Identify { input, json } => {
            let (_, selector) = load()?;
            let backend = active_backend(&selector, cli.backend)?;
            let mut reader = BufReader::new(File::open(&input)?);
            let info = imaging::identify(backend.as_ref(), &mut reader)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                output::print_identify(&input, &info);
            }
        }
        Command::Variant {
            input,
            output: output_path,
            args,
            json,
        } => {
            let (config, selector) = load()?;
            let backend = active_backend(&selector, cli.backend)?;
            let request = args
                .request()
                .or_format(format_from_extension(&output_path).as_deref())
                .or_format(config.output.format.as_deref());

            let summary = write_variant(backend.as_ref(), &input, &output_path, &request)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                output::print_variant(&input, &output_path, &summary);
            }
        }
        Command::Batch {
            output_dir,
            inputs,
            args,
        } => {
            let (config, selector) = load()?;
            let backend = active_backend(&selector, cli.backend)?;
            let request = args.request().or_format(config.output.format.as_deref());
            std::fs::create_dir_all(&output_dir)?;
            init_thread_pool(&config);

            let clashes = stem_clashes(&inputs);
            let results: Vec<(PathBuf, BatchOutcome)> = inputs
                .into_par_iter()
                .zip(clashes)
                .map(|(input, clash)| {
                    let outcome = match clash {
                        Some(first) => BatchOutcome::Failed(format!(
                            "output name clashes with {}",
                            first.display()
                        )),
                        None => match write_into(backend.as_ref(), &input, &output_dir, &request) {
                            Ok((output, summary)) => BatchOutcome::Written { output, summary },
                            Err(e) => BatchOutcome::Failed(e.to_string()),
                        },
                    };
                    (input, outcome)
                })
                .collect();
            output::print_batch(&results);

            let failed = results
                .iter()
                .filter(|(_, o)| matches!(o, BatchOutcome::Failed(_)))
                .count();
            if failed > 0 {
                return Err(format!("{failed} of {} inputs failed", results.len()).into());
            }
        }
        Command::Backends => {
            let (_, selector) = load()?;
            let report = selector.probe_all();
            let selected = active_backend(&selector, cli.backend)
                .map(|b| b.variant())
                .map_err(|e| e.to_string());
            output::print_backend_report(selector.priority(), &report, selected);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// The forced backend, or the first available one in priority order.
fn active_backend(
    selector: &BackendSelector,
    forced: Option<BackendVariant>,
) -> Result<Arc<dyn ImageBackend>, imaging::BackendError> {
    match forced {
        Some(variant) => selector.select(variant),
        None => selector.resolve(),
    }
}

type BoxError = Box<dyn std::error::Error>;

/// Decode, transform, and encode `input` entirely in memory.
fn encode_file(
    backend: &dyn ImageBackend,
    input: &Path,
    request: &VariantRequest,
) -> Result<(VariantSummary, Vec<u8>), BoxError> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut encoded = Vec::new();
    let summary = imaging::create_variant(backend, &mut reader, &mut encoded, request)?;
    Ok((summary, encoded))
}

/// Write one variant to `output`. The file is only created once encoding
/// has succeeded, so a failed request leaves nothing behind.
fn write_variant(
    backend: &dyn ImageBackend,
    input: &Path,
    output: &Path,
    request: &VariantRequest,
) -> Result<VariantSummary, BoxError> {
    let (summary, encoded) = encode_file(backend, input, request)?;
    std::fs::write(output, &encoded)?;
    Ok(summary)
}

/// Encode one batch input, then write it as `<dir>/<stem>.<ext>`.
///
/// The extension follows the output format, which may come from the source
/// when the request leaves it unset, so the file is named after encoding.
fn write_into(
    backend: &dyn ImageBackend,
    input: &Path,
    output_dir: &Path,
    request: &VariantRequest,
) -> Result<(PathBuf, VariantSummary), BoxError> {
    let stem = input
        .file_stem()
        .ok_or_else(|| format!("{} has no file name", input.display()))?;
    let (summary, encoded) = encode_file(backend, input, request)?;

    let mut output = output_dir.join(stem);
    output.set_extension(imaging::extension_for(&summary.output.format));
    std::fs::write(&output, &encoded)?;
    debug!(input = %input.display(), output = %output.display(), bytes = encoded.len(), "wrote variant");
    Ok((output, summary))
}

/// For each batch input, the earlier input sharing its file stem, if any.
///
/// Batch outputs are named `<stem>.<ext>`, so `a.png` and `a.jpg` would race
/// for the same file; only the first of them is processed.
fn stem_clashes(inputs: &[PathBuf]) -> Vec<Option<PathBuf>> {
    let mut first_by_stem: HashMap<&OsStr, &Path> = HashMap::new();
    inputs
        .iter()
        .map(|input| {
            let stem = input.file_stem()?;
            match first_by_stem.entry(stem) {
                Entry::Occupied(first) => Some(first.get().to_path_buf()),
                Entry::Vacant(slot) => {
                    slot.insert(input);
                    None
                }
            }
        })
        .collect()
}

/// Output format implied by a path's extension, when it names one.
fn format_from_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let format = imaging::normalize_format(&ext);
    (imaging::mimetype_for(&format) != imaging::FALLBACK_MIMETYPE).then_some(format)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; users can constrain down, not up.
fn init_thread_pool(config: &ImagingConfig) {
    let threads = config::effective_threads(&config.processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Install the stderr log subscriber. `RUST_LOG` wins unless `--verbose`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
