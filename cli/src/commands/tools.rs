use super::Context;
use anyhow::Result;
use borgpack_backends::ToolLocator;
use clap::Args;

#[derive(Args)]
pub struct ToolsCommand {
    #[arg(long, help = "Print as JSON")]
    json: bool,
}

impl ToolsCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let report = ToolLocator::new().report();
        let selected = ToolLocator::new()
            .probe(&ctx.settings)
            .map(|toolchain| toolchain.backend.to_string());

        if self.json {
            let payload = serde_json::json!({
                "tools": report,
                "backend": selected.as_ref().ok(),
                "problem": selected.as_ref().err().map(ToString::to_string),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            return Ok(());
        }

        for status in &report {
            match &status.path {
                Some(path) => println!("{:<12} {}", status.name, path.display()),
                None => println!("{:<12} not found", status.name),
            }
        }
        match selected {
            Ok(backend) => println!("\nnew archives use {}", backend),
            Err(e) => println!("\nno usable codec: {}", e),
        }
        Ok(())
    }
}
