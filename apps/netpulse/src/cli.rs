use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use netpulse_client_core::{
    ClientConfig, ConnectionState, DashboardClient, DashboardSnapshot, NotificationLevel,
    SessionEvent,
};
use netpulse_proto::{ReportsResponse, TargetSpec};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "netpulse", version)]
#[command(about = "Live dashboard client for the netpulse network monitor")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Monitor backend (host:port, or a full http(s)/ws(s) URL)
    #[arg(long, env = "NETPULSE_SERVER", global = true)]
    pub server: Option<String>,

    /// Use wss/https
    #[arg(long, env = "NETPULSE_SECURE", global = true)]
    pub secure: bool,

    /// Seconds between heartbeat pings
    #[arg(long, env = "NETPULSE_HEARTBEAT_SECS", global = true)]
    pub heartbeat_secs: Option<u64>,

    /// Give up after this many consecutive failed reconnects (0 = never)
    #[arg(long, env = "NETPULSE_RECONNECT_MAX_ATTEMPTS", global = true)]
    pub max_attempts: Option<u32>,

    /// Apply command results locally before the server echo arrives
    #[arg(long, env = "NETPULSE_OPTIMISTIC", global = true)]
    pub optimistic: bool,
}

impl ConnectionArgs {
    /// Environment defaults overridden by whatever was given on the command line.
    pub fn into_config(self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(server) = self.server {
            config = config.with_server(&server);
        }
        if self.secure {
            config.secure = true;
        }
        if let Some(secs) = self.heartbeat_secs {
            config.heartbeat_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(attempts) = self.max_attempts {
            config.reconnect.max_attempts = attempts;
        }
        if self.optimistic {
            config.optimistic_updates = true;
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream live updates (default)
    Watch,
    /// Show backend status
    Status,
    /// Manage monitored targets
    Targets {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Failure and daily reports
    Reports {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum TargetCommands {
    /// List built-in and custom targets
    List,
    /// Add a custom target
    Add {
        ip: String,
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        disabled: bool,
    },
    /// Update a custom target, optionally moving it to a new address
    Update {
        ip: String,
        #[arg(long)]
        new_ip: Option<String>,
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a custom target
    Remove { ip: String },
    /// Enable or disable any target, built-ins included
    Toggle {
        ip: String,
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// List stored reports
    List,
    /// Ask the backend to write a report now
    Generate,
    /// Print a stored report as JSON
    Show { filename: String },
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.connection.into_config();
    let client = DashboardClient::new(config).context("building dashboard client")?;

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => watch(&client).await,
        Commands::Status => {
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Targets { command } => targets(&client, command).await,
        Commands::Reports { command } => reports(&client, command).await,
    }
}

async fn targets(client: &DashboardClient, command: TargetCommands) -> Result<()> {
    match command {
        TargetCommands::List => {
            client.refresh_targets().await?;
            for target in client.snapshot().targets.iter() {
                let state = if target.enabled { "on " } else { "off" };
                println!("{state}  {:<16} {}", target.key, target.name);
            }
        }
        TargetCommands::Add { ip, name, disabled } => {
            let ack = client.add_target(TargetSpec::new(ip, name, !disabled)).await?;
            print_ack(ack.message.as_deref(), "target added");
        }
        TargetCommands::Update {
            ip,
            new_ip,
            name,
            disabled,
        } => {
            let spec = TargetSpec::new(new_ip.unwrap_or_else(|| ip.clone()), name, !disabled);
            let ack = client.update_target(&ip, spec).await?;
            print_ack(ack.message.as_deref(), "target updated");
        }
        TargetCommands::Remove { ip } => {
            let ack = client.remove_target(&ip).await?;
            print_ack(ack.message.as_deref(), "target removed");
        }
        TargetCommands::Toggle { ip, enabled } => {
            let ack = client.toggle_target(&ip, enabled).await?;
            print_ack(ack.message.as_deref(), "target toggled");
        }
    }
    Ok(())
}

async fn reports(client: &DashboardClient, command: ReportCommands) -> Result<()> {
    match command {
        ReportCommands::List => print_reports(&client.list_reports().await?),
        ReportCommands::Generate => {
            let generated = client.generate_report().await?;
            println!("{}", generated.filename);
        }
        ReportCommands::Show { filename } => {
            let document = client
                .commands()
                .report(&filename)
                .await
                .with_context(|| format!("fetching report {filename}"))?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }
    Ok(())
}

async fn watch(client: &DashboardClient) -> Result<()> {
    if let Err(err) = client.refresh_targets().await {
        warn!(error = %err, "could not load targets; waiting for the event stream");
    }

    let mut events = client.subscribe_events();
    let mut snapshots = client.store().subscribe_snapshots();
    let mut exhausted = false;
    client.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; closing connection");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", status_line(&snapshot));
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Notify(notification)) => {
                    let tag = match notification.level {
                        NotificationLevel::Alert => "ALERT",
                        NotificationLevel::Success => "OK",
                        NotificationLevel::Info => "INFO",
                    };
                    println!("[{tag}] {}", notification.message);
                }
                Ok(SessionEvent::ReportsStale) => match client.list_reports().await {
                    Ok(listing) => print_reports(&listing),
                    Err(err) => warn!(error = %err, "report refresh failed"),
                },
                Ok(SessionEvent::Connection(state)) => {
                    println!("[{state}]");
                    if state == ConnectionState::Disconnected {
                        exhausted = true;
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event consumer lagging"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.disconnect().await;
    if exhausted {
        anyhow::bail!(
            "lost connection to {} after {} reconnect attempts",
            client.config().ws_url(),
            client.reconnect_attempts()
        );
    }
    Ok(())
}

fn status_line(snapshot: &DashboardSnapshot) -> String {
    let stats = &snapshot.ping_stats;
    let latency = stats
        .average_latency
        .map(|ms| format!("{ms:.1}ms"))
        .unwrap_or_else(|| "-".into());
    let speed = snapshot
        .current_speed
        .as_ref()
        .map(|s| format!("{:.1}/{:.1} Mbps", s.download_mbps, s.upload_mbps))
        .unwrap_or_else(|| "-".into());
    format!(
        "pings {}/{} ok  avg {}  speed {}  targets {}",
        stats.successful,
        stats.total,
        latency,
        speed,
        snapshot.targets.len()
    )
}

fn print_reports(listing: &ReportsResponse) {
    for report in &listing.reports {
        println!(
            "{:<40} {:>8}  {:?}  {}",
            report.filename,
            report.size,
            report.kind,
            report.modified.format("%Y-%m-%d %H:%M")
        );
    }
    if !listing.active_failures.is_empty() {
        println!("active failures: {}", listing.active_failures.len());
    }
}

fn print_ack(message: Option<&str>, fallback: &str) {
    println!("{}", message.unwrap_or(fallback));
}
