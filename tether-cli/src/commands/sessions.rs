//! Sessions management commands
//!
//! Talks to a running server over its REST API.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use reqwest::StatusCode;
use tether_core::SessionSummary;
use tether_server::{ErrorEnvelope, SessionListResponse};
use tracing::info;

use crate::config::{ConfigLoader, TetherConfig};

/// Sessions management arguments
#[derive(Args, Debug)]
pub struct SessionsArgs {
    /// Server base URL (defaults to the configured host and port)
    #[arg(long, global = true)]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: SessionsCommands,
}

/// Sessions subcommands
#[derive(Subcommand, Debug)]
pub enum SessionsCommands {
    /// List all sessions
    List {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Expire a session and close its stream
    Kill {
        /// Session ID to kill
        session_id: String,
    },
}

/// Run sessions command
pub async fn run(args: SessionsArgs) -> Result<()> {
    let base = match args.url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => base_url(&ConfigLoader::load()?),
    };
    let client = reqwest::Client::new();

    match args.command {
        SessionsCommands::List { json } => list_sessions(&client, &base, json).await,
        SessionsCommands::Kill { session_id } => kill_session(&client, &base, &session_id).await,
    }
}

/// Where the configured server can be reached from this machine
fn base_url(config: &TetherConfig) -> String {
    let host = match config.server.host.as_str() {
        "0.0.0.0" => "127.0.0.1",
        "::" => "[::1]",
        host => host,
    };
    format!("http://{}:{}", host, config.server.port)
}

/// List all sessions
async fn list_sessions(client: &reqwest::Client, base: &str, json: bool) -> Result<()> {
    let response = client
        .get(format!("{}/api/sessions", base))
        .send()
        .await?
        .error_for_status()?;
    let list: SessionListResponse = response.json().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list.sessions)?);
        return Ok(());
    }
    if list.sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }

    println!("{}", session_table(&list.sessions));
    Ok(())
}

/// Kill a session
async fn kill_session(client: &reqwest::Client, base: &str, session_id: &str) -> Result<()> {
    info!(session_id = %session_id, "Killing session");

    let response = client
        .delete(format!("{}/api/sessions/{}", base, session_id))
        .send()
        .await?;

    match response.status() {
        StatusCode::NO_CONTENT => {
            println!("Session {} killed", session_id);
            Ok(())
        }
        status => match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => bail!("Error killing session: {}", envelope.error.message),
            Err(_) => bail!("Error killing session: server answered {}", status),
        },
    }
}

fn session_table(sessions: &[SessionSummary]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Session").fg(Color::Cyan),
        Cell::new("State").fg(Color::Cyan),
        Cell::new("Stream").fg(Color::Cyan),
        Cell::new("Last activity").fg(Color::Cyan),
        Cell::new("Age").fg(Color::Cyan),
    ]);

    for session in sessions {
        let stream = if session.alive { "open" } else { "closed" };
        table.add_row(vec![
            Cell::new(session.id.as_str()),
            Cell::new(session.state.to_string()),
            Cell::new(stream),
            Cell::new(session.last_activity.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(format_age(session.age_secs)),
        ]);
    }
    table
}

fn format_age(secs: u64) -> String {
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m {:02}s", s / 60, s % 60),
        s => format!("{}h {:02}m", s / 3600, (s % 3600) / 60),
    }
}
