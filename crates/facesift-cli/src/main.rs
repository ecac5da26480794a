use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facesift_scan::{ScanPolicy, ARCHIVE_FILE_NAME};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";

#[derive(Parser)]
#[command(name = "facesift", about = "Find photos of yourself in a shared Google Drive folder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a selfie and download every matching photo as a ZIP
    Scan {
        /// Clear photo of your face
        #[arg(long)]
        selfie: PathBuf,
        /// Shared Google Drive folder link
        #[arg(long)]
        folder: String,
        /// Where to write the archive
        #[arg(short, long, default_value = ARCHIVE_FILE_NAME)]
        out: PathBuf,
        #[arg(long, env = "FACESIFT_SERVER", default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Show daemon status
    Status {
        #[arg(long, env = "FACESIFT_SERVER", default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Print the scan policy applied to a folder of `total` photos
    Policy { total: usize },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { selfie, folder, out, server } => scan(&server, &selfie, &folder, &out).await,
        Commands::Status { server } => status(&server).await,
        Commands::Policy { total } => {
            println!("{}", describe_policy(total));
            Ok(())
        }
    }
}

async fn scan(server: &str, selfie: &Path, folder: &str, out: &Path) -> Result<()> {
    let bytes = tokio::fs::read(selfie)
        .await
        .with_context(|| format!("cannot read {}", selfie.display()))?;
    let file_name = selfie
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let form = Form::new()
        .part("selfie", Part::bytes(bytes).file_name(file_name))
        .text("drive_link", folder.to_string());

    println!("Scanning {folder} ...");
    tracing::debug!(server, "posting to /process");

    // Large folders take a while: 80 downloads at up to 15 s each.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30 * 60))
        .build()?;
    let response = client
        .post(format!("{}/process", server.trim_end_matches('/')))
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("cannot reach facesiftd at {server}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("{} ({})", error_message(&body), status.as_u16());
    }

    let archive = response.bytes().await?;
    tokio::fs::write(out, &archive)
        .await
        .with_context(|| format!("cannot write {}", out.display()))?;
    println!("Saved {} ({} bytes)", out.display(), archive.len());
    Ok(())
}

async fn status(server: &str) -> Result<()> {
    let json = fetch_status(server).await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn fetch_status(server: &str) -> Result<serde_json::Value> {
    let response = reqwest::get(format!("{}/status", server.trim_end_matches('/')))
        .await
        .with_context(|| format!("facesiftd: not reachable at {server}"))?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        bail!("{} ({})", error_message(&body), status.as_u16());
    }
    serde_json::from_str(&body).context("facesiftd returned invalid status JSON")
}

/// Pull `error` out of a daemon JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn describe_policy(total: usize) -> String {
    let policy = ScanPolicy::for_total(total);
    let early_exit = match policy.early_exit_threshold {
        Some(n) => format!("after {n} matches"),
        None => "never".to_string(),
    };
    format!(
        "{total} photos: {:?} tier, examine {}, tolerance {:.2}, early exit {early_exit}",
        policy.tier, policy.max_to_examine, policy.tolerance
    )
}
