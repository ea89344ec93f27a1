use super::Context;
use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct MountCommand {
    #[arg(help = "Archive file to mount")]
    archive: PathBuf,

    #[arg(help = "Mount point (created if missing)")]
    mount_point: PathBuf,

    #[arg(long, help = "Tag to mount (default: latest)")]
    tag: Option<String>,
}

impl MountCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&[])?;

        let spinner = ctx.spinner(format!("Mounting {}", self.archive.display()));
        let record = engine
            .mount(&self.archive, &self.mount_point, self.tag.as_deref())
            .await
            .with_context(|| format!("Failed to mount {}", self.archive.display()))?;
        drop(spinner);

        println!(
            "Mounted tag {} at {} (read-only)",
            record.tag,
            record.mount_point.display()
        );
        Ok(())
    }
}

#[derive(Args)]
pub struct UmountCommand {
    #[arg(help = "Mount point to release")]
    mount_point: PathBuf,
}

impl UmountCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let engine = ctx.engine(&[])?;

        let spinner = ctx.spinner(format!("Unmounting {}", self.mount_point.display()));
        let record = engine
            .umount(&self.mount_point)
            .await
            .with_context(|| format!("Failed to unmount {}", self.mount_point.display()))?;
        drop(spinner);

        match record {
            Some(record) => println!(
                "Unmounted {} (tag {} of {})",
                self.mount_point.display(),
                record.tag,
                record.archive.display()
            ),
            None => println!("Unmounted {}", self.mount_point.display()),
        }
        Ok(())
    }
}
