use std::time::Duration;

use clap::{Parser, Subcommand};
use eventwire::{ApiClient, ClientConfig, ClientError, EventClient, Inbound};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event stream for `{0}` ended")]
    StreamEnded(String),
}

#[derive(Parser, Debug)]
#[command(name = "eventwire-cli", about = "Event service websocket and REST CLI")]
struct Cli {
    #[arg(long, env = "EVENTWIRE_SERVICE_URL")]
    service_url: String,

    #[arg(long, env = "EVENTWIRE_API_KEY", hide_env_values = true)]
    api_key: String,

    #[arg(long, env = "EVENTWIRE_CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    connect_timeout_ms: u64,

    #[arg(long, env = "EVENTWIRE_SUBSCRIBE_TIMEOUT_MS", default_value_t = 2_000)]
    subscribe_timeout_ms: u64,

    #[arg(long, env = "EVENTWIRE_WAIT_TIMEOUT_MS", default_value_t = 300_000)]
    wait_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// GET a REST path (default: the service root) and print the response.
    Ping {
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Subscribe to a channel and print every frame that arrives on it.
    Subscribe {
        channel: String,
        #[arg(long, help = "Stop after this many frames")]
        count: Option<usize>,
    },
    /// Print the first frame on a channel, optionally of a given type.
    Wait {
        channel: String,
        #[arg(long = "type")]
        event_type: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Wait for a dataset journal event and print its payload.
    Journal {
        dataset_id: String,
        event_type: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(cli.service_url, cli.api_key)
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms))
        .with_subscribe_timeout(Duration::from_millis(cli.subscribe_timeout_ms))
        .with_wait_timeout(Duration::from_millis(cli.wait_timeout_ms));

    match cli.command {
        Command::Ping { path } => run_ping(config, &path).await,
        Command::Subscribe { channel, count } => run_subscribe(config, &channel, count).await,
        Command::Wait {
            channel,
            event_type,
            timeout_ms,
        } => run_wait(config, &channel, event_type.as_deref(), timeout_ms).await,
        Command::Journal {
            dataset_id,
            event_type,
            timeout_ms,
        } => run_journal(config, &dataset_id, &event_type, timeout_ms).await,
    }
}

async fn run_ping(config: ClientConfig, path: &str) -> Result<(), CliError> {
    let url = config.api_url(path);
    let api = ApiClient::new(config)?;
    let body = api.get(path).await?;
    print_json(&json!({ "url": url, "body": body }))
}

async fn run_subscribe(config: ClientConfig, channel: &str, count: Option<usize>) -> Result<(), CliError> {
    let client = EventClient::new(config);
    let mut events = client.events(channel).await?;
    tracing::info!(channel, "streaming");

    let mut seen = 0_usize;
    while count.is_none_or(|limit| seen < limit) {
        let Some(frame) = events.recv().await else {
            return Err(CliError::StreamEnded(channel.to_owned()));
        };
        print_frame(&frame)?;
        seen = seen.saturating_add(1);
    }
    Ok(())
}

async fn run_wait(
    config: ClientConfig,
    channel: &str,
    event_type: Option<&str>,
    timeout_ms: Option<u64>,
) -> Result<(), CliError> {
    let timeout = resolve_timeout(&config, timeout_ms);
    let client = EventClient::new(config);
    let frame = client
        .wait_for_message(
            channel,
            |frame| event_type.is_none_or(|wanted| frame.kind == wanted || frame.event_type() == wanted),
            timeout,
        )
        .await?;
    print_frame(&frame)
}

async fn run_journal(
    config: ClientConfig,
    dataset_id: &str,
    event_type: &str,
    timeout_ms: Option<u64>,
) -> Result<(), CliError> {
    let timeout = resolve_timeout(&config, timeout_ms);
    let client = EventClient::new(config);
    let data = client
        .wait_for_journal(dataset_id, event_type, timeout)
        .await?;
    print_json(&data)
}

fn resolve_timeout(config: &ClientConfig, timeout_ms: Option<u64>) -> Duration {
    timeout_ms.map_or(config.wait_timeout, Duration::from_millis)
}

fn print_frame(frame: &Inbound) -> Result<(), CliError> {
    print_json(&serde_json::to_value(frame)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
