pub mod check;
pub mod create;
pub mod expand;
pub mod extract;
pub mod list;
pub mod mount;
pub mod tools;
pub mod update;

use crate::output;
use anyhow::Result;
use borgpack_backends::{BorgRepository, SystemCodecs, ToolLocator, Toolchain};
use borgpack_core::{ArchiveEngine, CodecBackend, MountRegistry, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Resolved settings shared by every subcommand.
pub struct Context {
    pub settings: Settings,
    quiet: bool,
}

impl Context {
    pub fn new(settings: Settings, quiet: bool) -> Self {
        Self { settings, quiet }
    }

    /// Probes the host once. Without forced choices a failed probe falls
    /// back to tar+gzip, so commands that never pack still run and the
    /// missing tool is reported where it is actually needed.
    pub fn toolchain(&self) -> Result<Toolchain> {
        let locator = ToolLocator::new();
        match locator.probe(&self.settings) {
            Ok(toolchain) => Ok(toolchain),
            Err(e) if self.settings.packer.is_none() && self.settings.compressor.is_none() => {
                warn!(error = %e, "no preferred codec tools found, assuming tar+gzip");
                Ok(Toolchain {
                    backend: CodecBackend::baseline(),
                    locator,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Engine wired to the system tools; `create_args` go to every
    /// `borg create`.
    pub fn engine(&self, create_args: &[String]) -> Result<ArchiveEngine> {
        let codecs = SystemCodecs::new(self.toolchain()?, self.settings.clone());
        let repository = BorgRepository::new(&self.settings).with_create_args(create_args);
        let mounts = MountRegistry::new(self.settings.state_dir_or_default());
        Ok(
            ArchiveEngine::new(Arc::new(codecs), Arc::new(repository), mounts)
                .with_scratch_dir(self.settings.scratch_dir.clone()),
        )
    }

    pub fn spinner(&self, message: impl Into<String>) -> Spinner {
        if self.quiet {
            return Spinner(None);
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.into());
        pb.enable_steady_tick(Duration::from_millis(120));
        output::attach(&pb);
        Spinner(Some(pb))
    }
}

/// Stderr spinner that clears itself when dropped, including on error paths.
/// Log lines written while it runs are printed above it.
pub struct Spinner(Option<ProgressBar>);

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(pb) = &self.0 {
            output::detach();
            pb.finish_and_clear();
        }
    }
}
