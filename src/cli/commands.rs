//! CLI Command Implementations

use std::path::Path;

use log::info;

use crate::error::Result;
use crate::pipeline::{OnsetPipeline, PipelineConfig};

/// Run the default pipeline on `path` and print its summary.
pub fn detect(path: &Path, nothing_before_ms: f64, plot: bool, json: bool) -> Result<()> {
    info!("Running onset detection: {}", path.display());

    let config = PipelineConfig::new(nothing_before_ms, plot);
    let report = OnsetPipeline::default().run(path, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
