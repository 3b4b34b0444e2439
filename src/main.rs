mod activity;
mod api;
mod auth;
mod cli;
mod config;
mod donors;
mod logging;
mod map;
mod model;
mod profile;
mod registration;
mod render;
mod storage;
mod validation;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "donorlink", about = "Find and register blood donors")]
pub struct Args {
    #[arg(long, env = "DONORLINK_API_URL", help = "API base URL (overrides config)")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Session storage file (default ~/.donorlink/storage.json)")]
    pub storage: Option<PathBuf>,

    #[arg(long, help = "Never substitute demo donors")]
    pub no_fallback: bool,

    #[arg(long, help = "Verbose output (info logs)")]
    pub verbose: bool,

    #[arg(long, help = "Debug output (HTTP details and settings)")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<cli::Command>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    logging::init(args.verbose, args.debug);

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: ignoring configuration: {:#}", e);
            config::Config::default()
        })
    };

    if let Some(base_url) = &args.base_url {
        cfg.api.base_url = base_url.clone();
    }
    if let Some(path) = &args.storage {
        cfg.storage.path = Some(path.clone());
    }
    if args.no_fallback {
        cfg.donors.fallback = false;
    }

    if let Err(errors) = cfg.validate() {
        for error in &errors {
            eprintln!("Config error {}", error);
        }
        anyhow::bail!("Invalid configuration");
    }

    let storage_path = cfg
        .storage
        .path
        .clone()
        .unwrap_or_else(storage::FileStorage::default_path);
    let file_storage = storage::FileStorage::new(&storage_path);
    tracing::debug!(storage = %file_storage.path().display(), "session storage");
    let storage: Rc<dyn storage::Storage> = Rc::new(file_storage);
    let http = api::HttpApi::new(&cfg.api.base_url, cfg.api.timeout_ms, storage.clone());
    tracing::debug!(
        base_url = http.base_url(),
        timeout_ms = cfg.api.timeout_ms,
        fallback = cfg.donors.fallback,
        "settings"
    );

    let activity = if cfg.activity.enabled {
        match activity::ActivityLog::create(&cfg.activity.dir) {
            Ok(log) => {
                tracing::debug!(run_id = log.run_id(), path = %log.path.display(), "activity log");
                Some(log)
            }
            Err(e) => {
                eprintln!("Warning: activity log disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let input = Box::new(cli::EditorInput::new()?);
    let mut ctx = cli::Context::new(cfg, Rc::new(http), storage, input);
    if let Some(log) = activity {
        ctx = ctx.with_activity(log);
    }

    match args.command {
        Some(command) => cli::run_once(&ctx, command),
        None => cli::run_repl(&ctx),
    }
}
