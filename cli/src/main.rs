//! medsearch CLI
//!
//! Talks to the daemon over its Unix socket; search commands fall back to an
//! in-process session when the daemon is not running.
//!
//! Commands:
//! - medsearch search "martin" [--type patient] [--from 2024-01-01] [--json]
//! - medsearch suggest "mar"
//! - medsearch interactive
//! - medsearch history
//! - medsearch cache clear
//! - medsearch daemon start|stop|status
//! - medsearch doctor

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use medsearch_core::config::medsearch_home;
use medsearch_core::ipc::socket_path;
use medsearch_core::{
    DateRange, IpcClient, IpcMessage, IpcResponse, ResultType, SearchFilters, SearchSnapshot,
    SortOrder,
};

mod client;

use client::SearchClient;

#[derive(Parser)]
#[command(name = "medsearch")]
#[command(about = "Global search across patients, appointments, prescriptions and documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search and record the query in history
    Search {
        /// Search query
        query: String,

        #[command(flatten)]
        filters: FilterArgs,

        /// Print the raw snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show suggestions for partial input
    Suggest {
        /// Text typed so far
        text: String,
    },

    /// Read input line by line and show results as they settle
    Interactive {
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Show recent searches
    History,

    /// Result cache operations
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Run diagnostics
    Doctor,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Restrict to a result type (repeatable): patient, appointment,
    /// prescription, lab_order, document, doctor
    #[arg(long = "type", value_name = "TYPE", value_parser = parse_result_type)]
    types: Vec<ResultType>,

    /// Earliest date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Latest date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    #[arg(long)]
    status: Option<String>,

    #[arg(long)]
    city: Option<String>,

    /// Doctor id
    #[arg(long)]
    doctor: Option<String>,

    #[arg(long)]
    medication: Option<String>,

    /// Maximum results
    #[arg(long)]
    limit: Option<u32>,

    #[arg(long)]
    offset: Option<u32>,

    /// relevance, date_desc, date_asc or name
    #[arg(long, value_parser = parse_sort_order)]
    sort: Option<SortOrder>,
}

impl FilterArgs {
    fn into_filters(self) -> SearchFilters {
        let date_range = (self.from.is_some() || self.to.is_some()).then_some(DateRange {
            from: self.from,
            to: self.to,
        });

        SearchFilters {
            types: self.types,
            date_range,
            status: self.status,
            city: self.city,
            doctor_id: self.doctor,
            medication: self.medication,
            limit: self.limit,
            offset: self.offset,
            sort: self.sort,
        }
    }
}

fn parse_result_type(s: &str) -> Result<ResultType, String> {
    ResultType::parse(s).ok_or_else(|| format!("unknown result type '{}'", s))
}

fn parse_sort_order(s: &str) -> Result<SortOrder, String> {
    SortOrder::parse(s).ok_or_else(|| format!("unknown sort order '{}'", s))
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Drop every cached result
    Clear,
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon
    Start,

    /// Stop the daemon
    Stop,

    /// Check daemon status
    Status,
}

fn send_message(msg: &IpcMessage) -> Result<IpcResponse> {
    IpcClient::new()
        .send(msg)
        .with_context(|| format!("Failed to reach daemon at {:?}", socket_path()))
}

fn print_snapshot(snapshot: &SearchSnapshot) {
    if snapshot.results.is_empty() {
        println!("No results for \"{}\"", snapshot.query);
    } else {
        for result in &snapshot.results {
            let mut line = format!("[{}] {}", result.result_type.as_str(), result.title);
            if let Some(ref subtitle) = result.subtitle {
                line.push_str(" - ");
                line.push_str(subtitle);
            }
            if let Some(ref date) = result.date {
                line.push_str(&format!(" ({})", date));
            }
            println!("{}", line);
        }

        let counts: Vec<String> = snapshot
            .by_type
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind.as_str()))
            .collect();
        if counts.is_empty() {
            println!("\n{} total", snapshot.total);
        } else {
            println!("\n{} total ({})", snapshot.total, counts.join(", "));
        }
    }

    if !snapshot.settled {
        eprintln!("Warning: search still in progress after {:?}", client::SETTLE_TIMEOUT);
    }
}

fn print_suggestions(suggestions: &[String]) {
    if suggestions.is_empty() {
        println!("No suggestions");
    }
    for suggestion in suggestions {
        println!("  {}", suggestion);
    }
}

fn run_interactive(mut client: SearchClient, filters: SearchFilters) -> Result<()> {
    println!("Type to search. :enter saves the query, :refresh refetches, :clear empties the cache, :reset starts over, :quit exits.");

    let stdin = std::io::stdin();
    let mut last_query = String::new();
    prompt()?;

    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim() {
            ":quit" | ":q" => break,
            ":enter" => {
                if last_query.trim().is_empty() {
                    println!("Nothing to save");
                } else {
                    client.add_to_history(&last_query)?;
                    println!("Saved \"{}\"", last_query.trim());
                }
            }
            ":refresh" => {
                client.refetch()?;
                show(&mut client)?;
            }
            ":clear" => {
                client.clear_cache()?;
                println!("Cache cleared");
            }
            ":reset" => {
                client.reset()?;
                last_query.clear();
                println!("Reset");
            }
            _ => {
                client.input(&line, &filters)?;
                last_query = line;
                show(&mut client)?;
            }
        }
        prompt()?;
    }

    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

fn show(client: &mut SearchClient) -> Result<()> {
    let snapshot = client.settled()?;
    if snapshot.query.is_empty() {
        return Ok(());
    }
    if let Some(ref error) = snapshot.error {
        eprintln!("Search failed: {}", error);
    } else {
        print_snapshot(&snapshot);
    }
    if !snapshot.suggestions.is_empty() {
        println!("Suggestions:");
        print_suggestions(&snapshot.suggestions);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medsearch=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            query,
            filters,
            json,
        } => {
            let mut client = SearchClient::connect()?;
            client.input(&query, &filters.into_filters())?;
            let snapshot = client.settled()?;

            if let Some(ref error) = snapshot.error {
                eprintln!("Search failed: {}", error);
                std::process::exit(1);
            }

            // A submitted query is a confirmed one
            client.add_to_history(&query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
        }

        Commands::Suggest { text } => {
            let mut client = SearchClient::connect()?;
            client.input(&text, &SearchFilters::default())?;
            let snapshot = client.settled()?;
            print_suggestions(&snapshot.suggestions);
        }

        Commands::Interactive { filters } => {
            let client = SearchClient::connect()?;
            if client.is_local() {
                eprintln!("Start the daemon to keep results and history between runs: medsearch daemon start");
            }
            run_interactive(client, filters.into_filters())?;
        }

        Commands::History => match send_message(&IpcMessage::History) {
            Ok(IpcResponse::History(entries)) => {
                if entries.is_empty() {
                    println!("No recent searches");
                }
                for (i, query) in entries.iter().enumerate() {
                    println!("{:>2}. {}", i + 1, query);
                }
            }
            Ok(IpcResponse::Error(e)) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            Ok(_) => {
                eprintln!("Unexpected response");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("{:#}", e);
                eprintln!("History lives in the daemon. Try: medsearch daemon start");
                std::process::exit(1);
            }
        },

        Commands::Cache { command } => match command {
            CacheCommands::Clear => match send_message(&IpcMessage::ClearCache) {
                Ok(IpcResponse::Ok) => println!("Cache cleared"),
                Ok(IpcResponse::Error(e)) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                Ok(_) => {}
                Err(_) => println!("Daemon is not running; nothing is cached"),
            },
        },

        Commands::Daemon { command } => match command {
            DaemonCommands::Start => {
                // Check if already running
                let socket = socket_path();
                if socket.exists() {
                    if let Ok(IpcResponse::Pong { .. }) = send_message(&IpcMessage::Ping) {
                        println!("Daemon is already running");
                        return Ok(());
                    }
                    // Stale socket file - remove it
                    let _ = std::fs::remove_file(&socket);
                }

                // Find daemon binary (same directory as CLI)
                let daemon_path = std::env::current_exe()?
                    .parent()
                    .map(|p| p.join("medsearchd"))
                    .context("Could not determine executable directory")?;

                if !daemon_path.exists() {
                    eprintln!("Daemon binary not found at {:?}", daemon_path);
                    eprintln!("Hint: Build with 'cargo build --release' first");
                    std::process::exit(1);
                }

                let home = medsearch_home();
                let logs_dir = home.join("logs");
                std::fs::create_dir_all(&logs_dir).ok();

                use std::process::{Command, Stdio};
                let log_file = std::fs::File::create(logs_dir.join("daemon.log"))
                    .context("Failed to create log file")?;
                let err_file = std::fs::File::create(logs_dir.join("daemon.err"))
                    .context("Failed to create error log file")?;

                let child = Command::new(&daemon_path)
                    .stdout(Stdio::from(log_file))
                    .stderr(Stdio::from(err_file))
                    .spawn()
                    .context("Failed to start daemon")?;

                let pid_file = home.join("daemon.pid");
                std::fs::write(&pid_file, child.id().to_string())
                    .context("Failed to write PID file")?;

                println!("Daemon started with PID {}", child.id());
                println!("Logs: {}", logs_dir.display());

                // Wait a moment and verify it's running
                std::thread::sleep(Duration::from_millis(500));
                if let Ok(IpcResponse::Pong { .. }) = send_message(&IpcMessage::Ping) {
                    println!("Daemon is running and responding");
                } else {
                    eprintln!("Warning: Daemon started but not responding yet");
                    eprintln!("Check logs: {}", logs_dir.join("daemon.err").display());
                }
            }

            DaemonCommands::Stop => match send_message(&IpcMessage::Shutdown) {
                Ok(IpcResponse::Ok) => {
                    let _ = std::fs::remove_file(medsearch_home().join("daemon.pid"));
                    println!("Daemon stopped");
                }
                Ok(IpcResponse::Error(e)) => {
                    eprintln!("Error: {}", e);
                }
                Ok(_) => {}
                Err(_) => {
                    println!("Daemon is not running");
                }
            },

            DaemonCommands::Status => match IpcClient::new().ping() {
                Ok((uptime_secs, active_sessions)) => {
                    println!("Daemon: Running");
                    println!("Uptime: {}s", uptime_secs);
                    println!("Active sessions: {}", active_sessions);
                }
                Err(_) => {
                    println!("Daemon: Not running");
                }
            },
        },

        Commands::Doctor => {
            println!("medsearch Diagnostics");
            println!("=====================\n");

            let path = socket_path();
            println!("Socket: {:?}", path);
            if path.exists() {
                println!("  Status: ✓ exists");
            } else {
                println!("  Status: ✗ not found");
            }

            let config_path = medsearch_home().join("config.toml");
            println!("\nConfig: {:?}", config_path);
            match medsearch_core::Config::load_default() {
                Ok(config) if config_path.exists() => {
                    println!("  Status: ✓ loaded");
                    println!("  API: {}", config.api.base_url);
                }
                Ok(config) => {
                    println!("  Status: defaults (no file)");
                    println!("  API: {}", config.api.base_url);
                }
                Err(e) => println!("  Status: ✗ {}", e),
            }

            println!("\nDaemon:");
            match send_message(&IpcMessage::DoctorInfo) {
                Ok(IpcResponse::Doctor(info)) => {
                    println!("  Status: ✓ running");
                    println!("  Uptime: {}s", info.uptime_secs);
                    println!("  Sessions: {}", info.active_sessions);
                    println!("  API: {}", info.api_base_url);

                    println!("\nResult Cache:");
                    println!("  Entries: {}/{}", info.cache_entries, info.cache_capacity);
                    println!("  TTL: {}s", info.cache_ttl_secs);

                    println!("\nQuery Tracking:");
                    println!("  Searches: {}", info.tracked_searches);
                    println!("  Suggestions: {}", info.tracked_suggestions);

                    println!("\nHistory: {} entries", info.history_entries);
                }
                Ok(IpcResponse::Error(e)) => {
                    println!("  Status: ✗ error: {}", e);
                }
                Ok(_) => {
                    println!("  Status: ? unexpected response");
                }
                Err(e) => {
                    println!("  Status: ✗ not running");
                    println!("  Error: {:#}", e);
                    println!("  Hint: Start with 'medsearch daemon start'");
                }
            }

            println!("\n--- End Diagnostics ---");
        }
    }

    Ok(())
}
