use crate::Cli;
use anyhow::{Context, Result};
use borgpack_core::{Error, Settings};
use directories::ProjectDirs;
use std::path::Path;
use tracing::debug;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "borgpack")
}

/// Settings from the config file, overridden by flags and `BORGPACK_*`
/// variables.
///
/// An explicit `--config` must exist; the default location may be absent.
pub fn load(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => read(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match project_dirs().map(|dirs| dirs.config_dir().join("config.toml")) {
            Some(path) if path.is_file() => read(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            _ => Settings::default(),
        },
    };

    if let Some(packer) = cli.packer {
        settings.packer = Some(packer);
    }
    if let Some(compressor) = cli.compressor {
        settings.compressor = Some(compressor);
    }
    if let Some(state_dir) = &cli.state_dir {
        settings.state_dir = Some(state_dir.clone());
    }
    if let Some(borg) = &cli.borg {
        settings.borg_binary = borg.clone();
    }
    if settings.state_dir.is_none() {
        settings.state_dir = project_dirs().map(|dirs| dirs.data_local_dir().join("state"));
    }

    settings.validate()?;
    Ok(settings)
}

fn read(path: &Path) -> Result<Settings, Error> {
    let text = std::fs::read_to_string(path)?;
    let settings = toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
    debug!(path = %path.display(), "loaded config file");
    Ok(settings)
}
