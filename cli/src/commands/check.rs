use super::Context;
use anyhow::{Context as _, Result};
use borgpack_core::Error;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckCommand {
    #[arg(help = "Archive file or expanded repository")]
    target: PathBuf,
}

impl CheckCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&[])?;

        let spinner = ctx.spinner(format!("Checking {}", self.target.display()));
        let result = if self.target.is_dir() {
            let repository = engine.repository();
            if repository.is_repository(&self.target).await {
                repository.check(&self.target).await
            } else {
                Err(Error::NotARepository {
                    path: self.target.clone(),
                })
            }
        } else {
            engine.verify(&self.target).await
        };
        result.with_context(|| format!("Check of {} failed", self.target.display()))?;
        drop(spinner);

        println!("{}: ok", self.target.display());
        Ok(())
    }
}
