use super::Context;
use anyhow::{Context as _, Result};
use borgpack_core::TagRecord;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args)]
pub struct ListCommand {
    #[arg(help = "Archive file or expanded repository")]
    target: PathBuf,

    #[arg(long, value_enum, default_value = "table", help = "Output format")]
    format: OutputFormat,
}

impl ListCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&[])?;

        let spinner = ctx.spinner(format!("Reading {}", self.target.display()));
        let tags = if self.target.is_dir() {
            engine.list_expanded(&self.target).await
        } else {
            engine.list_tags(&self.target).await
        }
        .with_context(|| format!("Failed to list {}", self.target.display()))?;
        drop(spinner);

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tags)?),
            OutputFormat::Table => print_table(&tags),
        }
        Ok(())
    }
}

fn print_table(tags: &[TagRecord]) {
    if tags.is_empty() {
        println!("No tags found");
        return;
    }
    let width = tags
        .iter()
        .map(|record| record.name.len())
        .max()
        .unwrap_or(0)
        .max(3);
    println!("{:<width$}  {}", "TAG", "CREATED", width = width);
    println!("{:-<1$}", "", width + 21);
    for record in tags {
        println!(
            "{:<width$}  {}",
            record.name,
            record.created.format("%Y-%m-%d %H:%M:%S"),
            width = width
        );
    }
}
