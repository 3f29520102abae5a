use dbadmin::config::{self, Config};
use dbadmin::core::db::Session;
use dbadmin::repl;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

fn load_config() -> Config {
    let Some(path) = config::default_config_path().filter(|p| p.exists()) else {
        return Config::default();
    };
    match config::load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Ignoring config file {}: {}", path.display(), e);
            Config::default()
        }
    }
}

fn main() -> ExitCode {
    let config = load_config();
    let level = config.logging.max_level().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting dbadmin...");

    // A path on the command line wins over the configured database
    let db_path: Option<PathBuf> = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.session.database.clone());

    let session = match db_path {
        Some(path) => match Session::open(&path) {
            Ok(session) => {
                println!("Connected to {}", path.display());
                Some(session)
            }
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            warn!("no database given; use :open <path>");
            None
        }
    };

    if let Err(e) = repl::run_repl(session, &config) {
        error!(error = %e, "REPL terminated");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
