use super::Context;
use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ExpandCommand {
    #[arg(help = "Archive file to expand")]
    archive: PathBuf,

    #[arg(help = "Repository directory to create (must be absent or empty)")]
    repo_dir: PathBuf,
}

impl ExpandCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&[])?;

        let spinner = ctx.spinner(format!("Expanding {}", self.archive.display()));
        engine
            .expand(&self.archive, &self.repo_dir)
            .await
            .with_context(|| format!("Failed to expand {}", self.archive.display()))?;
        drop(spinner);

        println!(
            "Expanded {} into {}",
            self.archive.display(),
            self.repo_dir.display()
        );
        Ok(())
    }
}

#[derive(Args)]
pub struct CollapseCommand {
    #[arg(help = "Repository directory to collapse")]
    repo_dir: PathBuf,

    #[arg(help = "Archive file to write")]
    archive: PathBuf,

    #[arg(long, help = "Keep the repository directory afterwards")]
    keep_repo: bool,
}

impl CollapseCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&[])?;

        let spinner = ctx.spinner(format!("Collapsing {}", self.repo_dir.display()));
        engine
            .collapse(&self.repo_dir, &self.archive, self.keep_repo)
            .await
            .with_context(|| format!("Failed to collapse {}", self.repo_dir.display()))?;
        drop(spinner);

        println!(
            "Collapsed {} into {}",
            self.repo_dir.display(),
            self.archive.display()
        );
        Ok(())
    }
}
