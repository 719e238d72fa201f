//! netmod pipeline entrypoint: one pass over the input directory.
//!
//! Usage: `netmod-pipeline [INPUT_DIR] [OUTPUT_DIR]`; everything else comes
//! from the JSON config at `NETMOD_CONFIG_PATH` (default `config.json`).

use clap::Parser;
use netmod_pipeline::{
    config::PipelineConfig, error::PipelineError, logging::StructuredLogger, pipeline::Pipeline,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

static STOP: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "netmod-pipeline")]
#[command(version)]
#[command(about = "Packet captures to windowed traffic features and sequence datasets", long_about = None)]
struct Args {
    /// Directory walked for packet sources (overrides the config)
    input_dir: Option<PathBuf>,

    /// Directory receiving features, datasets and the run summary
    output_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, env = "NETMOD_CONFIG_PATH", default_value = "config.json")]
    config: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let mut config = PipelineConfig::load(&args.config)?;
    if let Some(input) = args.input_dir {
        config.input_dir = input;
    }
    if let Some(output) = args.output_dir {
        config.output_dir = output;
    }

    StructuredLogger::init(config.log.json, &config.log.level);
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        window_secs = config.window.window_secs,
        sequence_length = config.sequence.length,
        "netmod pipeline starting"
    );

    if let Err(e) = ctrlc::set_handler(|| STOP.store(true, Ordering::Relaxed)) {
        warn!(error = %e, "ctrl-c handler not installed");
    }

    let pipeline = Pipeline::new(config)?;
    let summary = pipeline.run_dir(&STOP)?;
    summary.log();
    StructuredLogger::emit_json(&summary.totals(), &mut std::io::stdout())?;

    if summary.cancelled {
        return Err(PipelineError::Cancelled.into());
    }
    info!("netmod pipeline complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn positional_dirs_are_optional() {
        let args = Args::try_parse_from(["netmod-pipeline"]).unwrap();
        assert!(args.input_dir.is_none());
        let args = Args::try_parse_from(["netmod-pipeline", "caps", "out"]).unwrap();
        assert_eq!(args.input_dir, Some(PathBuf::from("caps")));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn help_and_stray_args_are_not_directories() {
        let err = Args::try_parse_from(["netmod-pipeline", "--help"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(Args::try_parse_from(["netmod-pipeline", "a", "b", "c"]).is_err());
        assert!(Args::try_parse_from(["netmod-pipeline", "--bogus"]).is_err());
    }
}
