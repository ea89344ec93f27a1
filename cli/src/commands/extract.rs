use super::Context;
use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ExtractCommand {
    #[arg(help = "Archive file to read")]
    archive: PathBuf,

    #[arg(help = "Destination directory (must be absent or empty)")]
    dest: PathBuf,

    #[arg(long, help = "Tag to extract (default: latest)")]
    tag: Option<String>,
}

impl ExtractCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&[])?;

        let spinner = ctx.spinner(format!("Extracting {}", self.archive.display()));
        let tag = engine
            .extract(&self.archive, &self.dest, self.tag.as_deref())
            .await
            .with_context(|| format!("Failed to extract {}", self.archive.display()))?;
        drop(spinner);

        println!("Extracted tag {} to {}", tag, self.dest.display());
        Ok(())
    }
}
