//! Reel binary: prepares the local library database.
//!
//! `reel-app [config-path]` opens the database and applies pending
//! migrations. `reel-app status [config-path]` prints the migration status
//! of an existing database as JSON without creating or changing anything.

use reel_app::config::{self, Config};
use reel_app::startup::StartupSequence;
use reel_db::Database;
use tracing_subscriber::EnvFilter;

enum Command {
    Start,
    Status,
}

fn parse_args() -> (Command, Option<String>) {
    let mut args = std::env::args().skip(1).peekable();
    let command = match args.peek().map(String::as_str) {
        Some("status") => {
            args.next();
            Command::Status
        }
        _ => Command::Start,
    };
    let path = args.next().filter(|value| !value.trim().is_empty());
    (command, path)
}

fn resolve_config_path(cli_path: Option<String>) -> (Option<String>, &'static str) {
    if let Some(path) = cli_path {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("REEL_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let (command, cli_path) = parse_args();
    let (resolved_config_path, config_source) = resolve_config_path(cli_path);
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; cannot start without valid config");

    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    match command {
        Command::Start => {
            let prepared = match StartupSequence::new(&config.database).run().await {
                Ok(prepared) => prepared,
                Err(e) => {
                    tracing::error!(error = %e, "database startup failed");
                    std::process::exit(1);
                }
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&prepared.summary)
                    .expect("summary is always serializable")
            );
            prepared.db.close();
        }
        Command::Status => {
            let db = match Database::open_existing(
                &config.database.path,
                config.database.runtime_settings(),
            ) {
                Ok(db) => db,
                Err(e) => {
                    tracing::error!(error = %e, "cannot report migration status");
                    std::process::exit(1);
                }
            };
            let status = reel_db::status(&db).expect("failed to read migration status");
            println!(
                "{}",
                serde_json::to_string_pretty(&status).expect("status is always serializable")
            );
        }
    }
}
