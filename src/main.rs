use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use isoflash::catalog::{self, CatalogEntry, CatalogSource, RemoteCatalog};
use isoflash::config::AppConfig;
use isoflash::device::{self, format_size};
use isoflash::download;
use isoflash::flash::{FlashOutcome, FlashWorkflow, ProcessRunner};
use isoflash::logging::{self, LogConfig};
use isoflash::verify::{self, VerifyOutcome};

#[derive(Parser)]
#[command(name = "isoflash")]
#[command(about = "Download and flash OS images to removable drives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: GlobalArgs,
}

#[derive(Args, Serialize)]
struct GlobalArgs {
    /// Catalog endpoint to fetch image metadata from
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    catalog_url: Option<String>,

    /// Directory downloaded images are stored in
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,

    /// Enable debug logging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    verbose: Option<bool>,

    /// Emit logs as JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    json_logs: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// List images available in the catalog
    List,
    /// List removable drives on this machine
    Drives,
    /// Download an image by name or version, then verify it
    Download {
        /// Image name or version, matched exactly
        identifier: String,
    },
    /// Flash a previously downloaded image to a drive
    Flash {
        /// Image name or version, matched exactly
        identifier: String,
        /// Device path to write to, e.g. /dev/sdb or /dev/disk2
        #[arg(short, long)]
        drive: String,
    },
    /// Verify a downloaded image against the catalog checksum
    Verify {
        /// Image name or version, matched exactly
        identifier: String,
        /// Check this file instead of the derived download name
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::new(Some(&cli.overrides))?;

    logging::init(LogConfig {
        verbose: config.verbose,
        json: config.json_logs,
    });

    let catalog = RemoteCatalog::new(config.catalog_url.clone());

    match cli.command {
        Commands::List => run_list(&catalog).await.context("Failed to list images")?,
        Commands::Drives => run_drives().context("Failed to list drives")?,
        Commands::Download { identifier } => run_download(&catalog, &config, &identifier)
            .await
            .context("Download failed")?,
        Commands::Flash { identifier, drive } => run_flash(&catalog, &config, &identifier, &drive)
            .await
            .context("Flash failed")?,
        Commands::Verify { identifier, file } => {
            run_verify(&catalog, &config, &identifier, file.as_deref())
                .await
                .context("Verification failed")?
        }
    }

    Ok(())
}

async fn run_list(catalog: &dyn CatalogSource) -> Result<()> {
    let entries = catalog.fetch().await?;

    println!("Available images:");
    println!();
    println!("{:<28} {:<12} DESCRIPTION", "NAME", "VERSION");
    for entry in &entries {
        println!(
            "{:<28} {:<12} {}",
            entry.name, entry.version, entry.description
        );
    }

    Ok(())
}

fn run_drives() -> Result<()> {
    let policy = device::host_policy();
    let devices = policy.list_removable_devices()?;

    if devices.is_empty() {
        println!("No removable drives found.");
        return Ok(());
    }

    println!("{:<16} {:>10}  LABEL", "DEVICE", "SIZE");
    for dev in &devices {
        println!(
            "{:<16} {:>10}  {}",
            dev.name,
            format_size(dev.size_bytes),
            dev.label
        );
    }

    Ok(())
}

async fn run_download(
    catalog: &dyn CatalogSource,
    config: &AppConfig,
    identifier: &str,
) -> Result<()> {
    let entries = catalog.fetch().await?;
    let entry = catalog::resolve(&entries, identifier)?;

    let client = reqwest::Client::new();
    let path = download::download(&client, entry, &config.download_dir).await?;
    println!("Downloaded {} to {}", entry.name, path.display());

    verify_and_report(entry, &path).await
}

async fn run_verify(
    catalog: &dyn CatalogSource,
    config: &AppConfig,
    identifier: &str,
    file: Option<&Path>,
) -> Result<()> {
    let entries = catalog.fetch().await?;
    let entry = catalog::resolve(&entries, identifier)?;

    let path = match file {
        Some(path) => path.to_path_buf(),
        None => config.download_dir.join(entry.file_name()?),
    };

    verify_and_report(entry, &path).await
}

async fn run_flash(
    catalog: &dyn CatalogSource,
    config: &AppConfig,
    identifier: &str,
    drive: &str,
) -> Result<()> {
    let policy = device::host_policy();
    let mut runner = ProcessRunner;
    let mut workflow = FlashWorkflow::new(
        catalog,
        policy.as_ref(),
        &mut runner,
        config.download_dir.clone(),
    );

    let stdin = io::stdin();
    match workflow.run(identifier, drive, &mut stdin.lock()).await? {
        FlashOutcome::Completed { .. } | FlashOutcome::Cancelled => Ok(()),
    }
}

async fn verify_and_report(entry: &CatalogEntry, path: &Path) -> Result<()> {
    let spinner = verify_spinner(path);
    let outcome = verify::verify_file(path, entry.sha256.as_deref()).await;
    spinner.finish_and_clear();

    match outcome? {
        VerifyOutcome::Verified => {
            println!("Checksum verified for {}", path.display());
            Ok(())
        }
        VerifyOutcome::Skipped => {
            warn!(name = %entry.name, "No checksum available; integrity was not confirmed");
            Ok(())
        }
        VerifyOutcome::Mismatch { expected, actual } => {
            bail!(
                "checksum mismatch for {}: expected {expected}, got {actual}",
                path.display()
            )
        }
    }
}

fn verify_spinner(path: &Path) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Verifying {}", path.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
