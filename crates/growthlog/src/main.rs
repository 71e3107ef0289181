//! `growthlog` - CLI for the plant growth tracker
//!
//! This binary runs the web server and offers a few read-only commands for
//! inspecting recorded entries and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::net::SocketAddr;

use clap::Parser;

use growthlog::cli::{Cli, Command, ConfigCommand, ServeCommand};
use growthlog::web::{self, AppState};
use growthlog::{init_logging, Config, Storage};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, &serve_cmd),
        Command::List(list_cmd) => handle_list(&config, list_cmd.json),
        Command::Stats(stats_cmd) => handle_stats(&config, stats_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn handle_serve(mut config: Config, cmd: &ServeCommand) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = cmd.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let state = AppState::new(&config)?;
    let addr = SocketAddr::new(config.server.bind_address, config.server.port);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(web::serve(state, addr))?;
    Ok(())
}

fn handle_list(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let storage = Storage::open(config.database_path())?;
    let entries = storage.list_all_ordered_by_date()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No entries recorded yet.");
        return Ok(());
    }

    println!(
        "{:>5}  {:<10}  {:>10}  {:<24}  Photo",
        "ID",
        "Date",
        "Height",
        "Plant"
    );
    println!("{}", "-".repeat(64));
    for entry in &entries {
        println!(
            "{:>5}  {:<10}  {:>7.1} cm  {:<24}  {}",
            entry.id,
            entry.date_string(),
            entry.height,
            entry.name,
            entry.photo.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn handle_stats(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let storage = Storage::open(config.database_path())?;
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "total_entries": stats.total_entries,
            "plants": stats.plants,
            "first_date": stats.first_date,
            "last_date": stats.last_date,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let date_or_dash =
            |d: Option<chrono::NaiveDate>| d.map_or_else(|| "-".to_string(), |d| d.to_string());

        println!("growthlog stats");
        println!("---------------");
        println!("Database:      {}", storage.path().display());
        println!("Entries:       {}", stats.total_entries);
        println!("Plants:        {}", stats.plants);
        println!("First entry:   {}", date_or_dash(stats.first_date));
        println!("Latest entry:  {}", date_or_dash(stats.last_date));
        println!("Size:          {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                let mut value = serde_json::to_value(config)?;
                value["server"]["secret_key"] = serde_json::json!("(redacted)");
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.server.bind_address);
                println!("  Port:               {}", config.server.port);
                println!(
                    "  Secret key:         {}",
                    if config.uses_default_secret() {
                        "(built-in default)"
                    } else {
                        "(set)"
                    }
                );
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Uploads]");
                println!("  Directory:          {}", config.upload_dir().display());
                println!("  Max upload bytes:   {}", config.uploads.max_upload_bytes);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
