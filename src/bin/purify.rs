use anyhow::{bail, Context, Result};
use build_optimizer_native::discovery::{
    check_input_path, default_output_path, purify_directory, purify_file, PURIFIED_SUFFIX,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "purify")]
#[command(author, version, about = "Adds pure markers to bundled output", long_about = None)]
struct Cli {
    /// Bundle file, or a directory whose `*.bundle.js` files are purified in place
    input: PathBuf,

    /// Output file. Defaults to `<input>.purify.js` next to the input
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if cli.input.is_dir() {
        let report = purify_directory(&cli.input);
        info!(processed = report.processed, failed = report.failed.len(), "done");
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
        None => PathBuf::from(default_output_path(&input, PURIFIED_SUFFIX)?),
    };
    purify_file(Path::new(&input), &output)
        .with_context(|| format!("Failed to purify {}", input))?;
    info!(output = %output.display(), "wrote");
    Ok(())
}
