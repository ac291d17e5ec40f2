use anyhow::Context;
use respeak_foundation::PipelineConfig;
use std::path::Path;

/// Load the pipeline configuration from a TOML file, falling back to
/// defaults when no path is given. Invalid fields resolve per-field through
/// `sanitize`; only an unreadable or unparseable file is an error.
pub fn load(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    Ok(config.sanitize())
}
