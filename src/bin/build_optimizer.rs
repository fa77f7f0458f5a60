use anyhow::{bail, Context, Result};
use build_optimizer_native::cache::{ResultCache, DEFAULT_CACHE_DIR};
use build_optimizer_native::discovery::{
    check_input_path, default_output_path, optimize_directory, optimize_file, BatchOptions,
    OPTIMIZED_SUFFIX,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "build-optimizer")]
#[command(author, version, about = "Strips decorator metadata and marks top-level calls pure", long_about = None)]
struct Cli {
    /// Input .js/.ts file, or a directory to process recursively
    input: PathBuf,

    /// Output file. Defaults to `<input>.ngo.js` next to the input
    output: Option<PathBuf>,

    /// Fail on malformed input instead of passing it through
    #[arg(long)]
    strict: bool,

    /// Do not write `.map` files
    #[arg(long)]
    no_source_map: bool,

    /// Do not read or write the result cache
    #[arg(long)]
    no_cache: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let options = BatchOptions {
        emit_source_map: !cli.no_source_map,
        strict: cli.strict,
    };
    let cache = (!cli.no_cache).then(|| ResultCache::new(DEFAULT_CACHE_DIR));

    if cli.input.is_dir() {
        let report = optimize_directory(&cli.input, options, cache.as_ref());
        info!(
            processed = report.processed,
            cached = report.cached,
            failed = report.failed.len(),
            "done"
        );
        if !report.failed.is_empty() {
            for (path, err) in &report.failed {
                error!(file = %path.display(), "{}", err);
            }
            bail!("{} file(s) failed", report.failed.len());
        }
        return Ok(());
    }

    let input = cli.input.to_string_lossy().into_owned();
    check_input_path(&input)?;
    let output = match cli.output {
        Some(output) => output,
        None => PathBuf::from(default_output_path(&input, OPTIMIZED_SUFFIX)?),
    };
    let from_cache = optimize_file(Path::new(&input), &output, options, cache.as_ref())
        .with_context(|| format!("Failed to optimize {}", input))?;
    info!(output = %output.display(), from_cache, "wrote");
    Ok(())
}
