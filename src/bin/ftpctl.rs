//! `ftpctl` — thin demo CLI driving `ftpcore::ftp::service::FtpService`.
//! Stands in for the interactive "plug-in host" the engine itself stays
//! agnostic of: loads connection settings from TOML, opens one session,
//! and runs a single operation against it.

use clap::{Parser, Subcommand};
use ftpcore::ftp::service::FtpService;
use ftpcore::ftp::types::{EngineConfig, FtpConnectionConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[clap(name = "ftpctl", author, version, about = "Drive an FTP/FTPS session from the command line", long_about = None)]
struct Cli {
    /// Path to a TOML file holding the `[connection]` table (see
    /// `FtpConnectionConfig`). Defaults to `ftpctl.toml` in the cwd.
    #[clap(short, long, default_value = "ftpctl.toml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a remote directory.
    #[clap(name = "ls")]
    List { path: Option<String> },
    /// Download a remote file.
    #[clap(name = "get")]
    Get { remote: String, local: String },
    /// Upload a local file.
    #[clap(name = "put")]
    Put { local: String, remote: String },
    /// Remove a remote file.
    #[clap(name = "rm")]
    Delete { path: String },
    /// Create a remote directory.
    #[clap(name = "mkdir")]
    Mkdir { path: String },
    /// Print session diagnostics (banner, SYST, FEAT, current dir).
    Info,
}

#[derive(serde::Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    connection: FtpConnectionConfig,
    #[serde(default)]
    engine: EngineConfig,
}

fn load_config(path: &Path) -> FileConfig {
    if !path.exists() {
        log::warn!("{} not found, using defaults (anonymous@localhost)", path.display());
        return FileConfig::default();
    }
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            log::error!("cannot read {}: {}", path.display(), e);
            return FileConfig::default();
        }
    };
    match toml::from_str(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("cannot parse {}: {}, using defaults", path.display(), e);
            FileConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let file_config = load_config(&cli.config);
    // Engine-level tuning (retry delays, ASCII masks, watchdog interval)
    // currently informs a host-owned worker driver, not this demo CLI's
    // direct single-shot command path.
    let _ = &file_config.engine;

    let service = FtpService::new();
    let mut svc = service.lock().await;

    let session_id = match svc.connect(file_config.connection).await {
        Ok(info) => {
            log::info!("connected: {} ({:?})", info.host, info.security);
            info.id
        }
        Err(e) => {
            eprintln!("connect failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run_command(&mut svc, &session_id, cli.command).await;
    let _ = svc.disconnect(&session_id).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(svc: &mut FtpService, session_id: &str, command: Commands) -> Result<(), String> {
    match command {
        Commands::List { path } => {
            let entries = svc.list_directory(session_id, path.as_deref(), None).await?;
            for entry in entries {
                println!("{:>12}  {:?}  {}", entry.size.unwrap_or(0), entry.kind, entry.name);
            }
            Ok(())
        }
        Commands::Get { remote, local } => {
            let bytes = svc.download(session_id, &remote, &local).await?;
            println!("downloaded {} bytes to {}", bytes, local);
            Ok(())
        }
        Commands::Put { local, remote } => {
            let bytes = svc.upload(session_id, &local, &remote).await?;
            println!("uploaded {} bytes to {}", bytes, remote);
            Ok(())
        }
        Commands::Delete { path } => svc.delete_file(session_id, &path).await,
        Commands::Mkdir { path } => svc.mkdir(session_id, &path).await.map(|_| ()),
        Commands::Info => {
            let diag = svc.get_diagnostics(session_id)?;
            println!("host: {}", diag.host);
            println!("security: {:?}", diag.security);
            println!("system: {}", diag.system_type.unwrap_or_else(|| "unknown".into()));
            println!("cwd: {}", diag.current_directory);
            Ok(())
        }
    }
}

