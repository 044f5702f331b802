use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::Parser;
use stub_gen::layout::DEFAULT_LAYOUT;
use stub_gen::{DescriptorSource, RunConfig, SlotLayout};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser)]
#[clap(
    name = "stub-gen",
    about = "Generates the flasher stub table of esp-serial-flasher from published stub descriptors"
)]
struct Cli {
    /// Version of the stubs to embed, without the leading `v`.
    version: String,
    /// Base URL the stub releases are published under. Ignored if OVERRIDE is given.
    url: String,
    /// Root of the esp-serial-flasher tree. Templates are read from `cmake/`, the generated
    /// files are written to `private_include/` and `src/`.
    root: PathBuf,
    /// Read the stub descriptors from this directory instead of downloading them.
    #[arg(value_name = "OVERRIDE")]
    override_dir: Option<PathBuf>,
    /// Slot layout to generate: the name of a built-in layout or the path to a YAML file.
    #[arg(long, default_value = DEFAULT_LAYOUT)]
    layout: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = try_main().await {
        eprintln!("\nError: {e:?}");
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let layout = SlotLayout::load(&cli.layout)
        .with_context(|| format!("Failed to load slot layout '{}'", cli.layout))?;

    let source = match &cli.override_dir {
        Some(dir) => {
            tracing::info!("Using stub descriptors from {}", dir.display());
            DescriptorSource::local(dir)
        }
        None => {
            DescriptorSource::remote(&cli.url, &cli.version, layout.descriptor_dir.as_deref())
        }
    };

    let config = RunConfig {
        version: cli.version,
        root: cli.root,
        current_year: chrono::Local::now().year(),
    };

    let generated_files = stub_gen::run(&layout, &source, &config)
        .await
        .with_context(|| format!("Failed to generate stubs into {}", config.root.display()))?;

    println!("Generated {} file(s):", generated_files.len());
    for file in generated_files {
        println!("\t{}", file.display());
    }

    Ok(())
}
