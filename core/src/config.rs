use crate::{Compressor, Error, PackTool, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User-tunable behaviour. Every field has a default so a partial config
/// file, or none at all, is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Force a pack tool instead of probing for the best one.
    pub packer: Option<PackTool>,
    /// Force a compressor instead of probing for the best one.
    pub compressor: Option<Compressor>,
    pub compression_level: u32,
    pub borg_binary: String,
    /// Compression setting handed to `borg create --compression`.
    pub borg_compression: String,
    /// Parent directory for temporary repositories; system temp when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Where the mount registry lives.
    pub state_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            packer: None,
            compressor: None,
            compression_level: 9,
            borg_binary: "borg".to_string(),
            borg_compression: "zstd,9".to_string(),
            scratch_dir: None,
            state_dir: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=19).contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression_level must be between 1 and 19, got {}",
                self.compression_level
            )));
        }
        if self.borg_binary.trim().is_empty() {
            return Err(Error::Config("borg_binary must not be empty".to_string()));
        }
        if self.borg_compression.trim().is_empty() {
            return Err(Error::Config(
                "borg_compression must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Level accepted by the chosen compressor; gzip-family tools stop at 9.
    pub fn level_for(&self, compressor: Compressor) -> u32 {
        match compressor {
            Compressor::Zstd => self.compression_level,
            Compressor::Pigz | Compressor::Gzip => self.compression_level.min(9),
        }
    }

    pub fn state_dir_or_default(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("borgpack-state"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"packer": "tar"}"#).unwrap();
        assert_eq!(settings.packer, Some(PackTool::Tar));
        assert_eq!(settings.compression_level, 9);
        assert_eq!(settings.borg_binary, "borg");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let settings = Settings {
            compression_level: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        let settings = Settings {
            compression_level: 19,
            ..Default::default()
        };
        assert_eq!(settings.level_for(Compressor::Gzip), 9);
        assert_eq!(settings.level_for(Compressor::Zstd), 19);
    }
}
