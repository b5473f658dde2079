//! notescan-convert - one-shot sheet-music image to MIDI conversion
//!
//! Prints the MIDI path on success. `--setup-only` checks the OMR toolchain
//! without converting anything.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use notescan_common::config::{OmrEngineKind, RootFolderResolver, TomlConfig, TranslatorKind};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notescan_server::omr::build_engine;
use notescan_server::pipeline::ConversionPipeline;
use notescan_server::translate::build_translator;

#[derive(Parser, Debug)]
#[command(name = "notescan-convert")]
#[command(about = "Convert a sheet-music image to MIDI")]
#[command(version)]
struct Args {
    /// Sheet-music image (PNG, JPEG, TIFF or PDF)
    input: Option<PathBuf>,

    /// Directory receiving OMR output and the MIDI file
    #[arg(default_value = "audiveris_output")]
    output_dir: PathBuf,

    /// Only check that the OMR toolchain is installed
    #[arg(long)]
    setup_only: bool,

    /// OMR engine: audiveris, oemer or demo (overrides config)
    #[arg(long)]
    engine: Option<OmrEngineKind>,

    /// MusicXML translator: builtin or command (overrides config)
    #[arg(long)]
    translator: Option<TranslatorKind>,

    /// Config file (default: ~/.config/notescan/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base folder for relative Audiveris JAR locations (default: current directory)
    #[arg(short, long, env = "NOTESCAN_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let (mut config, _) =
        TomlConfig::discover(args.config.as_deref()).context("Failed to load configuration")?;

    // stdout carries only the result path
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(engine) = args.engine {
        config.omr.engine = engine;
    }
    if let Some(translator) = args.translator {
        config.translator.kind = translator;
    }

    let base_dir = match args.root_folder {
        Some(dir) => dir,
        None if config.root_folder.is_some() => {
            RootFolderResolver::new(None, &config).resolve()
        }
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let pipeline = ConversionPipeline::new(
        build_engine(&config.omr, &base_dir),
        build_translator(&config.translator),
        args.output_dir.clone(),
    );

    let detail = pipeline
        .check()
        .await
        .with_context(|| format!("{} setup check failed", pipeline.engine_name()))?;
    info!("OMR toolchain: {}", detail);

    if args.setup_only {
        println!("{} is ready: {}", pipeline.engine_name(), detail);
        return Ok(());
    }

    let Some(input) = args.input else {
        bail!("No input image given (use --setup-only to only check the toolchain)");
    };

    info!(
        input = %input.display(),
        output = %args.output_dir.display(),
        engine = pipeline.engine_name(),
        translator = pipeline.translator_name(),
        "Converting"
    );
    let midi = pipeline
        .convert_into(&input, &args.output_dir)
        .await
        .with_context(|| format!("Conversion of {} failed", input.display()))?;

    println!("{}", midi.display());
    Ok(())
}
