use super::Context;
use anyhow::{Context as _, Result, bail};
use clap::Args;
use std::path::PathBuf;
use tracing::warn;

/// Adds a snapshot. What gets updated depends on the two paths:
///
/// - archive + source directory: new snapshot in the archive
/// - expanded repository + source directory: new snapshot in place
/// - archive + expanded repository: the repository replaces the archive
#[derive(Args)]
pub struct UpdateCommand {
    #[arg(help = "Archive file or expanded repository to update")]
    target: PathBuf,

    #[arg(help = "Directory to snapshot, or an expanded repository to collapse into the archive")]
    source: PathBuf,

    #[arg(long, help = "Tag for the new snapshot (default: UTC timestamp)")]
    tag: Option<String>,

    #[arg(last = true, help = "Extra arguments passed to borg create")]
    borg_args: Vec<String>,
}

impl UpdateCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&self.borg_args)?;
        let repository = engine.repository();
        let target_is_repo = self.target.is_dir() && repository.is_repository(&self.target).await;
        let source_is_repo = self.source.is_dir() && repository.is_repository(&self.source).await;

        let spinner = ctx.spinner(format!("Updating {}", self.target.display()));
        match (target_is_repo, source_is_repo) {
            (true, true) => {
                bail!(
                    "Both {} and {} are repositories; pass an archive or a source directory",
                    self.target.display(),
                    self.source.display()
                );
            }
            (false, true) => {
                if self.tag.is_some() {
                    warn!("--tag is ignored when collapsing a repository into an archive");
                }
                engine
                    .collapse(&self.source, &self.target, true)
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to collapse {} into {}",
                            self.source.display(),
                            self.target.display()
                        )
                    })?;
                drop(spinner);
                println!(
                    "Replaced {} with repository {}",
                    self.target.display(),
                    self.source.display()
                );
            }
            (true, false) => {
                let record = engine
                    .update_expanded(&self.target, &self.source, self.tag.as_deref())
                    .await
                    .with_context(|| format!("Failed to update repository {}", self.target.display()))?;
                drop(spinner);
                println!("Added tag {} to {}", record.name, self.target.display());
            }
            (false, false) => {
                let record = engine
                    .update(&self.target, &self.source, self.tag.as_deref())
                    .await
                    .with_context(|| format!("Failed to update archive {}", self.target.display()))?;
                drop(spinner);
                println!("Added tag {} to {}", record.name, self.target.display());
            }
        }
        Ok(())
    }
}
