use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use routemap::server;
use routemap_core::Config;

const DEFAULT_WORKSPACE: &str = "default";

#[derive(Parser)]
#[command(name = "routemap")]
#[command(about = "Network topology mapping and route-change detection", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "routemap.toml")]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Routemap server
    Serve {
        /// Override verbose setting from config
        #[arg(short, long)]
        verbose: bool,
    },

    /// Ingest path records from a JSON file
    Ingest {
        /// File containing a JSON array of path records
        #[arg(short, long)]
        file: std::path::PathBuf,
        #[arg(short, long, default_value = DEFAULT_WORKSPACE)]
        workspace: String,
        /// Override server URL from config
        #[arg(long)]
        server: Option<String>,
    },

    /// Show the merged topology graph
    Graph {
        #[arg(short, long, default_value = DEFAULT_WORKSPACE)]
        workspace: String,
        /// Output raw JSON response
        #[arg(long)]
        json: bool,
        #[arg(long)]
        server: Option<String>,
    },

    /// List route groups ranked by severity
    Routes {
        #[arg(short, long, default_value = DEFAULT_WORKSPACE)]
        workspace: String,
        /// Ranking flavor: summary or detail
        #[arg(long, default_value = "summary")]
        order: String,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        server: Option<String>,
    },

    /// Show detected route changes for one agent
    Changes {
        #[arg(short, long, default_value = DEFAULT_WORKSPACE)]
        workspace: String,
        agent: String,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        server: Option<String>,
    },

    /// Show server status and per-workspace counters
    Status {
        #[arg(long)]
        json: bool,
        #[arg(long)]
        server: Option<String>,
    },

    /// Poll an agent's change stream and print new changes as they appear
    Watch {
        #[arg(short, long, default_value = DEFAULT_WORKSPACE)]
        workspace: String,
        agent: String,
        /// Poll interval in seconds
        #[arg(long, default_value_t = 10)]
        interval: u64,
        #[arg(long)]
        server: Option<String>,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct IngestSummary {
    accepted: usize,
    record_count: usize,
    skipped_records: usize,
    node_count: usize,
    edge_count: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct GraphView {
    nodes: Vec<NodeView>,
    edges: Vec<EdgeView>,
    record_count: usize,
    skipped_records: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct NodeView {
    id: String,
    label: String,
    kind: String,
    #[serde(default)]
    avg_latency_ms: Option<f64>,
    #[serde(default)]
    avg_loss_pct: f64,
    #[serde(default)]
    max_loss_pct: f64,
    #[serde(default)]
    sample_count: u64,
    health: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct EdgeView {
    source: String,
    target: String,
    #[serde(default)]
    avg_latency_ms: Option<f64>,
    #[serde(default)]
    sample_count: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct RoutesView {
    group_count: usize,
    groups: Vec<RouteGroupView>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RouteGroupView {
    signature: String,
    hops: Vec<String>,
    trace_count: usize,
    first_seen: String,
    last_seen: String,
    #[serde(default)]
    avg_latency_ms: Option<f64>,
    #[serde(default)]
    max_loss_pct: f64,
    #[serde(default)]
    flagged: bool,
    #[serde(default)]
    route_changed: bool,
    #[serde(default)]
    has_issue: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct StreamChangesView {
    agent: String,
    record_count: usize,
    change_count: usize,
    changes: Vec<RouteChangeView>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RouteChangeView {
    record_id: String,
    changed_at: String,
    previous_signature: String,
    current_signature: String,
    #[serde(default)]
    deltas: Vec<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ServerStatus {
    version: String,
    workspace_count: usize,
    workspaces: HashMap<String, Value>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        println!("📝 Loading configuration from {:?}", cli.config);
        Config::from_file(&cli.config)?
    } else {
        println!(
            "⚠️  Config file not found at {:?}, using defaults",
            cli.config
        );
        Config::default()
    };

    config.validate()?;

    let default_server = format!("http://{}:{}", config.server.host, config.server.port);

    match cli.command {
        Commands::Serve { verbose } => {
            if verbose {
                config.server.verbose = true;
            }

            println!(
                "🚀 Starting Routemap server on {}:{}",
                config.server.host, config.server.port
            );
            server::start_server(config).await?;
        }
        Commands::Ingest {
            file,
            workspace,
            server,
        } => {
            let server_url = server.unwrap_or(default_server);
            let client = Client::new();
            handle_ingest(&client, &server_url, &workspace, &file).await?;
        }
        Commands::Graph {
            workspace,
            json,
            server,
        } => {
            let server_url = server.unwrap_or(default_server);
            let client = Client::new();
            handle_graph(&client, &server_url, &workspace, json).await?;
        }
        Commands::Routes {
            workspace,
            order,
            json,
            server,
        } => {
            let server_url = server.unwrap_or(default_server);
            let client = Client::new();
            handle_routes(&client, &server_url, &workspace, &order, json).await?;
        }
        Commands::Changes {
            workspace,
            agent,
            json,
            server,
        } => {
            let server_url = server.unwrap_or(default_server);
            let client = Client::new();
            handle_changes(&client, &server_url, &workspace, &agent, json).await?;
        }
        Commands::Status { json, server } => {
            let server_url = server.unwrap_or(default_server);
            let client = Client::new();
            handle_status(&client, &server_url, json).await?;
        }
        Commands::Watch {
            workspace,
            agent,
            interval,
            server,
        } => {
            let server_url = server.unwrap_or(default_server);
            let client = Client::new();
            handle_watch(&client, &server_url, &workspace, &agent, interval).await?;
        }
    }

    Ok(())
}

async fn handle_ingest(
    client: &Client,
    server: &str,
    workspace: &str,
    file: &std::path::Path,
) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records: Vec<Value> =
        serde_json::from_str(&contents).context("Failed to parse records file as JSON array")?;

    let url = format!("{}/api/workspaces/{}/records", server, workspace);
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "records": records }))
        .send()
        .await
        .with_context(|| format!("Failed to POST {}", url))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(anyhow!("Ingest to {} failed: {} {}", url, status, text));
    }

    let parsed: ApiResponse<IngestSummary> = response.json().await?;
    let data = parsed
        .data
        .ok_or_else(|| anyhow!("Ingest response missing data"))?;

    println!(
        "📥 Ingested {} records into '{}' ({} in window, {} skipped, {} nodes, {} edges)",
        data.accepted,
        workspace,
        data.record_count,
        data.skipped_records,
        data.node_count,
        data.edge_count
    );
    Ok(())
}

async fn handle_graph(client: &Client, server: &str, workspace: &str, json: bool) -> Result<()> {
    let url = format!("{}/api/workspaces/{}/graph", server, workspace);
    let response: ApiResponse<GraphView> = get_json(client, &url).await?;
    if !response.success {
        return Err(anyhow!(response
            .error
            .unwrap_or_else(|| "Unknown error".into())));
    }

    let data = response
        .data
        .ok_or_else(|| anyhow!("Graph response missing data"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "🕸  Topology for '{}' ({} nodes, {} edges, {} records)",
        workspace,
        data.nodes.len(),
        data.edges.len(),
        data.record_count
    );
    println!(
        "{:<28} {:<12} {:<9} {:>10} {:>9} {:>8}",
        "NODE", "KIND", "HEALTH", "AVG MS", "LOSS %", "SAMPLES"
    );
    for node in data.nodes {
        println!(
            "{:<28} {:<12} {:<9} {:>10} {:>9.1} {:>8}",
            node.id,
            node.kind,
            node.health,
            node.avg_latency_ms
                .map(|ms| format!("{:.2}", ms))
                .unwrap_or_else(|| "-".into()),
            node.avg_loss_pct,
            node.sample_count
        );
    }

    Ok(())
}

async fn handle_routes(
    client: &Client,
    server: &str,
    workspace: &str,
    order: &str,
    json: bool,
) -> Result<()> {
    let url = format!(
        "{}/api/workspaces/{}/routes?order={}",
        server, workspace, order
    );
    let response: ApiResponse<RoutesView> = get_json(client, &url).await?;
    if !response.success {
        return Err(anyhow!(response
            .error
            .unwrap_or_else(|| "Unknown error".into())));
    }
    let data = response
        .data
        .ok_or_else(|| anyhow!("Routes response missing data"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("🛣  Route groups for '{}' ({} total)", workspace, data.group_count);
    println!(
        "{:<6} {:<6} {:>7} {:>9} {:>8} {}",
        "CHANGE", "ISSUE", "TRACES", "LOSS MAX", "AVG MS", "SIGNATURE"
    );
    for group in data.groups {
        println!(
            "{:<6} {:<6} {:>7} {:>9.1} {:>8} {}",
            if group.route_changed { "yes" } else { "-" },
            if group.has_issue { "yes" } else { "-" },
            group.trace_count,
            group.max_loss_pct,
            group
                .avg_latency_ms
                .map(|ms| format!("{:.2}", ms))
                .unwrap_or_else(|| "-".into()),
            group.signature
        );
    }

    Ok(())
}

async fn handle_changes(
    client: &Client,
    server: &str,
    workspace: &str,
    agent: &str,
    json: bool,
) -> Result<()> {
    let data = fetch_changes(client, server, workspace, agent).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "🔀 Route changes for agent '{}' ({} changes over {} records)",
        data.agent, data.change_count, data.record_count
    );
    for change in &data.changes {
        println!(
            "  {}  {} → {}",
            change.changed_at, change.previous_signature, change.current_signature
        );
    }
    if data.changes.is_empty() {
        println!("  no route changes in the current window");
    }

    Ok(())
}

async fn handle_status(client: &Client, server: &str, json: bool) -> Result<()> {
    let url = format!("{}/status", server);
    let response: ApiResponse<ServerStatus> = get_json(client, &url).await?;
    if !response.success {
        return Err(anyhow!(response
            .error
            .unwrap_or_else(|| "Unknown error".into())));
    }
    let data = response
        .data
        .ok_or_else(|| anyhow!("Status response missing data"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "💓 Routemap v{} ({} workspaces)",
        data.version, data.workspace_count
    );
    for (name, status) in data.workspaces {
        println!("  {:<20} {}", name, status);
    }

    Ok(())
}

/// Polls the change stream and prints only changes newer than the last
/// poll. Ctrl-C to stop.
async fn handle_watch(
    client: &Client,
    server: &str,
    workspace: &str,
    agent: &str,
    interval: u64,
) -> Result<()> {
    println!(
        "👀 Watching agent '{}' in '{}' every {}s...",
        agent, workspace, interval
    );

    let mut seen = 0usize;
    loop {
        match fetch_changes(client, server, workspace, agent).await {
            Ok(data) => {
                if data.change_count < seen {
                    // The window rolled; start over.
                    seen = 0;
                }
                for change in data.changes.iter().skip(seen) {
                    println!(
                        "  {}  {} → {}",
                        change.changed_at, change.previous_signature, change.current_signature
                    );
                }
                seen = data.change_count;
            }
            Err(e) => {
                eprintln!("⚠️  poll failed: {}", e);
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
    }
}

async fn fetch_changes(
    client: &Client,
    server: &str,
    workspace: &str,
    agent: &str,
) -> Result<StreamChangesView> {
    let url = format!(
        "{}/api/workspaces/{}/changes/{}",
        server, workspace, agent
    );
    let response: ApiResponse<StreamChangesView> = get_json(client, &url).await?;
    if !response.success {
        return Err(anyhow!(response
            .error
            .unwrap_or_else(|| "Unknown error".into())));
    }
    response
        .data
        .ok_or_else(|| anyhow!("Changes response missing data"))
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<ApiResponse<T>> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to GET {}", url))?;
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(anyhow!("Request to {} failed: {} {}", url, status, text));
    }
    let parsed = response.json::<ApiResponse<T>>().await?;
    Ok(parsed)
}
