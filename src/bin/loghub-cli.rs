use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use loghub::config::ElectionConfig;
use loghub::descriptor::{DescriptorStore, FsDescriptorStore, HubDescriptor};
use loghub::hub::protocol::{self, ExportRequest, HistoryRequest, HubMessage};
use loghub::hub::ExportFormat;
use loghub::query::FilterConfiguration;
use loghub::LogEvent;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "loghub-cli")]
#[command(about = "Inspect and query the running log hub", long_about = None)]
struct Cli {
    /// Hub address (`host:port` or `ws://host:port`); defaults to the published descriptor
    #[arg(long)]
    hub: Option<String>,

    /// Directory holding the hub descriptor
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Shared secret for remote hubs
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Buffer, connection and throughput snapshot
    Status,
    /// Hub liveness
    Health,
    /// Hub version and protocol
    Version,
    /// Stream live events, optionally filtered
    Tail {
        /// Query expression, e.g. `level:>=warn AND service:api`
        query: Option<String>,
    },
    /// Page through buffered events, newest first
    History {
        query: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    /// Dump buffered events
    Export {
        query: Option<String>,
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Ndjson,
    Csv,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::Ndjson => ExportFormat::Ndjson,
            Format::Csv => ExportFormat::Csv,
        }
    }
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let hub = resolve_hub(&cli)?;
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client.get(hub.http_url("/system")).send().await?;
            print_response(res).await?;
        }
        Commands::Health => {
            let res = client.get(hub.http_url("/healthz")).send().await?;
            print_response(res).await?;
        }
        Commands::Version => {
            let res = client.get(hub.http_url("/version")).send().await?;
            print_response(res).await?;
        }
        Commands::Tail { query } => tail(&hub, query).await?,
        Commands::History { query, limit, offset } => {
            let request = HistoryRequest {
                filter: filter(query),
                limit,
                offset,
            };
            let text = protocol::encode("request_history", &request)?;
            if let HubMessage::History(page) = request_reply(&hub, text).await? {
                for event in page.events.iter() {
                    println!("{}", render_line(event));
                }
                eprintln!(
                    "{} of {} matching events (offset {})",
                    page.events.len(),
                    page.total_matched,
                    page.offset
                );
            }
        }
        Commands::Export { query, format } => {
            let request = ExportRequest {
                format: format.into(),
                filter: filter(query),
            };
            let text = protocol::encode("export_request", &request)?;
            if let HubMessage::Export(export) = request_reply(&hub, text).await? {
                print!("{}", export.content);
                eprintln!("exported {} events as {}", export.count, export.format.as_str());
            }
        }
    }

    Ok(())
}

fn resolve_hub(cli: &Cli) -> CliResult<HubDescriptor> {
    if let Some(address) = cli.hub.as_deref() {
        return Ok(HubDescriptor::from_remote(address, cli.token.clone())?);
    }
    let dir = cli.dir.clone().unwrap_or_else(|| ElectionConfig::default().dir);
    let store = FsDescriptorStore::open(&dir)?;
    match store.read()? {
        Some(mut descriptor) => {
            if cli.token.is_some() {
                descriptor.token = cli.token.clone();
            }
            Ok(descriptor)
        }
        None => Err(format!("no hub published in {}", dir.display()).into()),
    }
}

fn filter(query: Option<String>) -> FilterConfiguration {
    query.map(FilterConfiguration::from_query).unwrap_or_default()
}

fn viewer_url(hub: &HubDescriptor) -> CliResult<Url> {
    let mut url = Url::parse(&hub.ws_url())?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("type", "viewer");
        if let Some(token) = hub.token.as_deref() {
            query.append_pair("token", token);
        }
    }
    Ok(url)
}

fn render_line(event: &LogEvent) -> String {
    format!(
        "{} {:<5} [{}] {}",
        event.timestamp.to_rfc3339(),
        event.level.as_str(),
        event.service,
        event.message
    )
}

/// Send one request and wait for its reply, skipping the replay and live traffic.
async fn request_reply(hub: &HubDescriptor, request: String) -> CliResult<HubMessage> {
    let (mut ws, _) = connect_async(viewer_url(hub)?.as_str()).await?;
    ws.send(Message::Text(request.into())).await?;

    while let Some(frame) = ws.next().await {
        let Message::Text(text) = frame? else {
            continue;
        };
        match serde_json::from_str::<HubMessage>(text.as_str()) {
            Ok(HubMessage::Error(reply)) => return Err(reply.message.into()),
            Ok(message @ (HubMessage::History(_) | HubMessage::Export(_))) => {
                let _ = ws.close(None).await;
                return Ok(message);
            }
            _ => {}
        }
    }
    Err("hub closed the connection before replying".into())
}

async fn tail(hub: &HubDescriptor, query: Option<String>) -> CliResult<()> {
    let (mut ws, _) = connect_async(viewer_url(hub)?.as_str()).await?;
    if let Some(query) = query {
        let text = protocol::encode("apply_filter", &FilterConfiguration::from_query(query))?;
        ws.send(Message::Text(text.into())).await?;
    }

    loop {
        tokio::select! {
            frame = ws.next() => {
                let Some(frame) = frame else { break };
                let Message::Text(text) = frame? else { continue };
                match serde_json::from_str::<HubMessage>(text.as_str()) {
                    Ok(HubMessage::LogEvent(event)) => println!("{}", render_line(&event)),
                    Ok(HubMessage::ClientEvent(client)) => eprintln!(
                        "-- {:?} {} ({})",
                        client.event,
                        client.service.as_deref().unwrap_or("?"),
                        client.host
                    ),
                    Ok(HubMessage::FilterApplied(applied)) => {
                        eprintln!("-- filter {} matched {} buffered events", applied.name, applied.matched)
                    }
                    Ok(HubMessage::Error(reply)) => return Err(reply.message.into()),
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = ws.close(None).await;
                break;
            }
        }
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> CliResult<()> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: hub returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Details: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
