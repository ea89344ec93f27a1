mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    Context,
    check::CheckCommand,
    create::{CreateCommand, CreateExpandedCommand},
    expand::{CollapseCommand, ExpandCommand},
    extract::ExtractCommand,
    list::ListCommand,
    mount::{MountCommand, UmountCommand},
    tools::ToolsCommand,
    update::UpdateCommand,
};
use borgpack_core::{Compressor, PackTool};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "borgpack",
    version,
    about = "Keep a borg repository in a single compressed archive file",
    long_about = "Borgpack stores a deduplicating borg repository as one portable compressed file \
                  and expands it on demand to create, update, list, extract or mount snapshots"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Only print warnings and errors")]
    quiet: bool,

    #[arg(long, global = true, env = "BORGPACK_CONFIG", help = "Path to config.toml")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "BORGPACK_PACKER", help = "Force a pack tool (squashfs, tar)")]
    packer: Option<PackTool>,

    #[arg(long, global = true, env = "BORGPACK_COMPRESSOR", help = "Force a compressor (zstd, pigz, gzip)")]
    compressor: Option<Compressor>,

    #[arg(long, global = true, env = "BORGPACK_STATE_DIR", help = "Directory holding the mount registry")]
    state_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "BORGPACK_BORG", help = "borg executable to run")]
    borg: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new archive from a directory")]
    Create(CreateCommand),

    #[command(about = "Create an expanded repository from a directory")]
    CreateExpanded(CreateExpandedCommand),

    #[command(about = "List the tags in an archive or expanded repository")]
    List(ListCommand),

    #[command(about = "Add a snapshot to an archive or expanded repository")]
    Update(UpdateCommand),

    #[command(about = "Extract a snapshot into a directory")]
    Extract(ExtractCommand),

    #[command(about = "Mount a snapshot read-only")]
    Mount(MountCommand),

    #[command(alias = "unmount", about = "Unmount a mounted snapshot and clean up")]
    Umount(UmountCommand),

    #[command(about = "Expand an archive into a persistent repository directory")]
    Expand(ExpandCommand),

    #[command(about = "Collapse a repository directory into an archive")]
    Collapse(CollapseCommand),

    #[command(about = "Check repository consistency")]
    Check(CheckCommand),

    #[command(about = "Show the external tools borgpack found")]
    Tools(ToolsCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let settings = config::load(cli)?;
    debug!(?settings, "resolved settings");
    let ctx = Context::new(settings, cli.quiet);

    match &cli.command {
        Commands::Create(cmd) => cmd.run(&ctx).await,
        Commands::CreateExpanded(cmd) => cmd.run(&ctx).await,
        Commands::List(cmd) => cmd.run(&ctx).await,
        Commands::Update(cmd) => cmd.run(&ctx).await,
        Commands::Extract(cmd) => cmd.run(&ctx).await,
        Commands::Mount(cmd) => cmd.run(&ctx).await,
        Commands::Umount(cmd) => cmd.run(&ctx).await,
        Commands::Expand(cmd) => cmd.run(&ctx).await,
        Commands::Collapse(cmd) => cmd.run(&ctx).await,
        Commands::Check(cmd) => cmd.run(&ctx).await,
        Commands::Tools(cmd) => cmd.run(&ctx).await,
    }
}

/// Prints `error[<kind>]: <context chain>` to stderr.
fn report(err: &anyhow::Error) {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<borgpack_core::Error>())
        .map(borgpack_core::Error::kind)
        .unwrap_or("error");
    eprintln!("error[{}]: {:#}", kind, err);
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "borgpack={level},borgpack_core={level},borgpack_backends={level}"
        ))
    });
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(output::LogWriter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: could not install logger: {}", e);
    }
}
