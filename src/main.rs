use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use bibtag::batch::{BatchItem, detect_all};
use bibtag::{
    BibDetector, BibNumber, DebugConfig, DetectionOutcome, DetectorConfig, LabelSession,
    OcrsRecognizer, RecognitionBackend,
};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    /// Pure Rust OCR with ocrs models
    Ocrs,
    /// System Tesseract (needs the `tesseract` build feature)
    Tesseract,
}

#[derive(Parser)]
#[command(name = "bibtag")]
#[command(about = "Detect race bib numbers in photos and label the files")]
struct Cli {
    /// Image files, or directories of png/jpg/jpeg images
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Base name for labeled copies; without it detections are only reported
    #[arg(short, long)]
    base_name: Option<String>,

    /// Directory receiving `{base}-{number}{ext}` copies
    #[arg(short, long, value_name = "DIR", default_value = "labeled")]
    output: PathBuf,

    /// TOML file with detector settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the binary threshold
    #[arg(long)]
    threshold: Option<u8>,

    /// Override how many of the largest contours are examined
    #[arg(long)]
    max_regions: Option<usize>,

    /// OCR engine
    #[arg(long, value_enum, default_value_t = Engine::Ocrs)]
    engine: Engine,

    /// Directory holding text-detection.rten and text-recognition.rten
    #[arg(long, value_name = "DIR")]
    models: Option<PathBuf>,

    /// Images processed in parallel
    #[arg(short, long, default_value_t = 4)]
    jobs: usize,

    /// Confirm or correct every image by hand
    #[arg(short, long)]
    interactive: bool,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// Save intermediate images to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct ImageReport {
    path: PathBuf,
    number: Option<String>,
    diagnostic: Option<String>,
    labeled_as: Option<PathBuf>,
}

impl ImageReport {
    fn new(item: &BatchItem) -> Self {
        Self {
            path: item.path.clone(),
            number: item.outcome.number().map(|n| n.to_string()),
            diagnostic: item.outcome.diagnostic().map(|e| e.to_string()),
            labeled_as: None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "bibtag=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let backend = build_backend(&args)?;
    let detector = Arc::new(BibDetector::with_backend(config, backend));

    let paths = collect_images(&args.inputs)?;
    if paths.is_empty() {
        bail!("no png/jpg/jpeg images found in the given inputs");
    }
    info!(images = paths.len(), engine = detector.backend().name(), "starting detection");

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let items = runtime.block_on(detect_all(detector.clone(), paths, args.jobs));

    if let Some(debug_dir) = &args.debug_out {
        let debug = DebugConfig::new(debug_dir.clone())?;
        dump_debug_images(&detector, &items, &debug);
    }

    let mut reports: Vec<ImageReport> = items.iter().map(ImageReport::new).collect();

    match &args.base_name {
        Some(base_name) => label_images(&args, base_name, &items, &mut reports)?,
        None if !args.json => print_detections(&items),
        None => {}
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    Ok(())
}

fn load_config(args: &Cli) -> anyhow::Result<DetectorConfig> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DetectorConfig::default(),
    };

    if let Some(threshold) = args.threshold {
        config.binary_threshold = threshold;
    }
    if let Some(max_regions) = args.max_regions {
        config.max_contours = max_regions;
    }
    config.validate()?;
    Ok(config)
}

fn build_backend(args: &Cli) -> anyhow::Result<Box<dyn RecognitionBackend>> {
    match args.engine {
        Engine::Ocrs => {
            let model_dir = match &args.models {
                Some(dir) => dir.clone(),
                None => OcrsRecognizer::default_model_dir()
                    .context("cannot locate home directory; pass --models")?,
            };
            let recognizer = OcrsRecognizer::new(model_dir);
            recognizer.check_models()?;
            Ok(Box::new(recognizer))
        }
        #[cfg(feature = "tesseract")]
        Engine::Tesseract => Ok(Box::new(bibtag::TesseractRecognizer::new(None, "eng"))),
        #[cfg(not(feature = "tesseract"))]
        Engine::Tesseract => {
            bail!("this build has no Tesseract support; rebuild with --features tesseract")
        }
    }
}

/// Expand directories into their image files, sorted by name.
fn collect_images(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("failed to read directory {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            found.sort();
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn dump_debug_images(detector: &BibDetector, items: &[BatchItem], debug: &DebugConfig) {
    for (idx, item) in items.iter().enumerate() {
        let stem = item
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{:02}_{}", idx + 1, stem);

        let saved = image::open(&item.path)
            .map_err(anyhow::Error::from)
            .and_then(|img| detector.trace(&img).map_err(anyhow::Error::from))
            .and_then(|trace| trace.save_debug_images(debug, &name));
        match saved {
            Ok(dir) => info!(dir = %dir.display(), "debug images saved"),
            Err(e) => warn!(path = %item.path.display(), error = %e, "no debug images"),
        }
    }
}

fn print_detections(items: &[BatchItem]) {
    println!("\n=== Bib Number Detection Results ===");
    for item in items {
        match &item.outcome {
            DetectionOutcome::Detected(number) => println!("  {}: {}", item.path.display(), number),
            DetectionOutcome::NotDetected(reason) => {
                println!("  {}: not detected ({})", item.path.display(), reason)
            }
        }
    }
    let detected = items.iter().filter(|i| i.outcome.is_detected()).count();
    println!("Detected {} of {} images", detected, items.len());
}

enum Decision {
    Accept(BibNumber),
    Skip,
}

fn label_images(
    args: &Cli,
    base_name: &str,
    items: &[BatchItem],
    reports: &mut [ImageReport],
) -> anyhow::Result<()> {
    let pending = items.iter().map(|i| i.path.clone()).collect();
    let mut session = LabelSession::new(base_name, &args.output, pending)?;
    let stdin = std::io::stdin();
    let mut input = stdin.lock();

    while !session.is_finished() {
        let index = session.position();
        let item = &items[index];
        let progress = session.progress();
        if !args.json {
            println!("\nImage {} of {}: {}", index + 1, progress.total, item.path.display());
        }

        let decision = if args.interactive {
            ask_operator(&mut input, &item.outcome)?
        } else {
            match item.outcome.number() {
                Some(number) => Decision::Accept(number.clone()),
                None => Decision::Skip,
            }
        };

        match decision {
            Decision::Accept(number) => {
                let labeled = session.accept(number)?;
                if !args.json {
                    println!("  Saved as {}", labeled.destination.display());
                }
                reports[index].labeled_as = Some(labeled.destination.clone());
            }
            Decision::Skip => {
                session.skip()?;
                if !args.json {
                    println!("  Skipped");
                }
            }
        }
    }

    let progress = session.progress();
    info!(
        labeled = progress.labeled,
        total = progress.total,
        output = %session.output_dir().display(),
        "labeling finished"
    );
    if !args.json {
        println!(
            "\nLabeled {} of {} images into {}",
            progress.labeled,
            progress.total,
            session.output_dir().display()
        );
    }
    Ok(())
}

/// Prompt until the operator accepts, corrects or skips. EOF skips.
fn ask_operator(input: &mut impl BufRead, outcome: &DetectionOutcome) -> anyhow::Result<Decision> {
    loop {
        match outcome {
            DetectionOutcome::Detected(number) => {
                print!("  Detected {number}. Enter to confirm, type a correction, or 's' to skip: ")
            }
            DetectionOutcome::NotDetected(reason) => {
                print!(
                    "  No number detected ({reason}). Enter the number, or leave empty to skip: "
                )
            }
        }
        std::io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Decision::Skip);
        }
        let answer = line.trim();

        match (answer, outcome.number()) {
            ("", Some(number)) => return Ok(Decision::Accept(number.clone())),
            ("", None) | ("s", _) | ("S", _) => return Ok(Decision::Skip),
            (typed, _) => match BibNumber::parse(typed) {
                Ok(number) => return Ok(Decision::Accept(number)),
                Err(e) => println!("  {e}. Please enter 1-3 digits."),
            },
        }
    }
}
