//! tvhc - Command-line client for tvheadend
//!
//! Opens an HTSP session, waits for the initial sync and runs one command.

use clap::{Parser, Subcommand};
use colored::Colorize;
use htsp_client::{ClientError, EntityKind, Session, SessionConfig};
use htsp_protocol::{Message, Value, DEFAULT_PORT};
use std::collections::HashMap;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tvhc")]
#[command(about = "Command-line client for tvheadend over HTSP")]
#[command(version)]
struct Cli {
    /// Server host
    #[arg(short = 'H', long, env = "TVHC_HOST", default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Username
    #[arg(short, long, env = "TVHC_USER")]
    user: Option<String>,

    /// Password
    #[arg(long, env = "TVHC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Seconds to wait for the initial sync
    #[arg(long, default_value = "5")]
    sync_timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server details and entity counts
    Info,

    /// List channels as JSON lines
    Channels,

    /// List recordings as JSON lines
    Records,

    /// List tags as JSON lines
    Tags,

    /// Delete a recording
    Delete {
        /// Recording id
        id: i64,
    },

    /// Issue a raw HTSP call
    Call {
        /// Method name
        method: String,

        /// Arguments as key=value (integers are sent as s64)
        args: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = SessionConfig::new(&cli.host)
        .with_port(cli.port)
        .with_sync_timeout(Duration::from_secs(cli.sync_timeout));
    if let Some(ref user) = cli.user {
        config = config.with_username(user);
    }
    if let Some(ref password) = cli.password {
        config = config.with_password(password);
    }

    let session = Session::open(config).map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    let result = match cli.command {
        Some(Commands::Info) | None => print_info(&session),
        Some(Commands::Channels) => print_entities(session.channels()),
        Some(Commands::Records) => print_entities(session.records()),
        Some(Commands::Tags) => print_entities(session.tags()),
        Some(Commands::Delete { id }) => delete_record(&session, id),
        Some(Commands::Call { method, args }) => raw_call(&session, &method, &args),
    };

    session.close();

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn print_info(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let server = session.server_info();
    println!(
        "{} {} {}",
        "Server:".bold(),
        server.name.as_deref().unwrap_or("unknown").cyan(),
        server.version.as_deref().unwrap_or("")
    );
    if let Some(version) = server.htsp_version {
        println!("{} {}", "HTSP version:".bold(), version);
    }
    if !server.capabilities.is_empty() {
        println!("{} {}", "Capabilities:".bold(), server.capabilities.join(", "));
    }

    println!(
        "{} {} channels, {} recordings, {} tags",
        "Entities:".bold(),
        session.count(EntityKind::Channel).to_string().green(),
        session.count(EntityKind::Record).to_string().green(),
        session.count(EntityKind::Tag).to_string().green()
    );

    // Older servers lack getDiskSpace
    match session.disk_space() {
        Ok(space) => {
            if let (Some(free), Some(total)) = (
                space.get_i64("freediskspace"),
                space.get_i64("totaldiskspace"),
            ) {
                println!(
                    "{} {} free of {}",
                    "Disk:".bold(),
                    format_bytes(free).yellow(),
                    format_bytes(total)
                );
            }
        }
        Err(e) if e.is_recoverable() => {
            tracing::debug!("disk space unavailable: {}", e);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn print_entities(entities: HashMap<i64, Message>) -> Result<(), Box<dyn std::error::Error>> {
    let mut entities: Vec<_> = entities.into_iter().collect();
    entities.sort_by_key(|(id, _)| *id);
    for (_, entity) in entities {
        println!("{}", serde_json::to_string(&entity)?);
    }
    Ok(())
}

fn delete_record(session: &Session, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let title = session
        .record(id)
        .and_then(|r| r.get_str("title").map(str::to_string));

    match session.delete_record(id) {
        Ok(_) => {
            println!(
                "{} recording {}{}",
                "Deleted".green(),
                id.to_string().cyan(),
                title.map(|t| format!(" ({})", t)).unwrap_or_default()
            );
            Ok(())
        }
        Err(ClientError::Server { message, .. }) => {
            Err(format!("server refused to delete {}: {}", id, message).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn raw_call(
    session: &Session,
    method: &str,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut message = Message::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{}'", arg))?;
        message.insert(key, parse_arg(value));
    }

    let reply = session.call(method, message)?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

fn parse_arg(value: &str) -> Value {
    match value.parse::<i64>() {
        Ok(n) => Value::S64(n),
        Err(_) => Value::Str(value.to_string()),
    }
}

fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("42"), Value::S64(42));
        assert_eq!(parse_arg("-7"), Value::S64(-7));
        assert_eq!(parse_arg("news"), Value::Str("news".into()));
        assert_eq!(parse_arg(""), Value::Str(String::new()));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["tvhc", "--host", "tvh.local"]).unwrap();
        assert_eq!(cli.host, "tvh.local");
        assert_eq!(cli.port, 9982);
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["tvhc", "call", "getDiskSpace", "a=1"]).unwrap();
        match cli.command {
            Some(Commands::Call { method, args }) => {
                assert_eq!(method, "getDiskSpace");
                assert_eq!(args, vec!["a=1".to_string()]);
            }
            _ => panic!("expected call command"),
        }
    }
}
