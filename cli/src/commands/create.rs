use super::Context;
use anyhow::{Context as _, Result};
use borgpack_core::CreateOptions;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct CreateCommand {
    #[arg(help = "Archive file to create")]
    archive: PathBuf,

    #[arg(help = "Directory to snapshot")]
    source: PathBuf,

    #[arg(long, help = "Tag for the first snapshot (default: UTC timestamp)")]
    tag: Option<String>,

    #[arg(long, help = "Replace an existing archive")]
    force: bool,

    #[arg(last = true, help = "Extra arguments passed to borg create")]
    borg_args: Vec<String>,
}

impl CreateCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&self.borg_args)?;
        let options = CreateOptions {
            overwrite: self.force,
            tag: self.tag.clone(),
        };

        let spinner = ctx.spinner(format!("Creating {}", self.archive.display()));
        let record = engine
            .create(&self.archive, &self.source, &options)
            .await
            .with_context(|| format!("Failed to create archive {}", self.archive.display()))?;
        drop(spinner);

        info!(archive = %self.archive.display(), tag = %record.name, "archive created");
        println!("Created {} with tag {}", self.archive.display(), record.name);
        Ok(())
    }
}

#[derive(Args)]
pub struct CreateExpandedCommand {
    #[arg(help = "Repository directory to create")]
    repo_dir: PathBuf,

    #[arg(help = "Directory to snapshot")]
    source: PathBuf,

    #[arg(long, help = "Tag for the first snapshot (default: UTC timestamp)")]
    tag: Option<String>,

    #[arg(last = true, help = "Extra arguments passed to borg create")]
    borg_args: Vec<String>,
}

impl CreateExpandedCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&self.borg_args)?;

        let spinner = ctx.spinner(format!("Creating {}", self.repo_dir.display()));
        let record = engine
            .create_expanded(&self.repo_dir, &self.source, self.tag.as_deref())
            .await
            .with_context(|| format!("Failed to create repository {}", self.repo_dir.display()))?;
        drop(spinner);

        println!(
            "Created repository {} with tag {}",
            self.repo_dir.display(),
            record.name
        );
        Ok(())
    }
}
