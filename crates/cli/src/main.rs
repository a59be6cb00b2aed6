//! workqueue CLI - operator commands against a running workqueued

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";

#[derive(Parser)]
#[command(name = "workqueue")]
#[command(about = "workqueue admin CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "WORKQUEUE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered queues
    List,

    /// Show queue statistics
    Stats {
        /// Only this queue
        queue: Option<String>,
    },

    /// Wait until queues are empty
    Flush {
        /// Only this queue (default: all)
        queue: Option<String>,

        /// Give up after this many milliseconds
        #[arg(short, long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Push a JSON payload
    Push {
        queue: String,

        /// Payload as JSON string
        payload: String,

        /// Dedup key (required for unique queues)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Check whether a key is outstanding on a unique queue
    Has { queue: String, key: String },
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// One row of `stats` output
#[derive(Deserialize, Tabled)]
struct StatsRow {
    name: String,
    state: String,
    unique: bool,
    workers: usize,
    max_workers: usize,
    boosted: bool,
    channel_len: usize,
    #[tabled(display_with = "display_backend")]
    backend_len: Option<usize>,
    outstanding: usize,
}

fn display_backend(len: &Option<usize>) -> String {
    len.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        method,
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to workqueued")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            let result = call_rpc(&cli.rpc_url, "queue.list.v1", json!({})).await?;
            let queues: Vec<String> = serde_json::from_value(result["queues"].clone())?;

            if queues.is_empty() {
                println!("{}", "No queues registered".yellow());
            }
            for name in queues {
                println!("{}", name);
            }
        }

        Commands::Stats { queue } => {
            let result = call_rpc(&cli.rpc_url, "queue.stats.v1", json!({ "queue": queue })).await?;
            let rows: Vec<StatsRow> = serde_json::from_value(result["queues"].clone())?;

            if result["shutting_down"].as_bool().unwrap_or(false) {
                println!("{}", "Daemon is shutting down".yellow().bold());
            }
            println!("{}", Table::new(rows));
            println!("  {} {} seconds", "Uptime:".bold(), result["uptime_seconds"]);
        }

        Commands::Flush { queue, timeout_ms } => {
            let params = json!({ "queue": queue, "timeout_ms": timeout_ms });
            let result = call_rpc(&cli.rpc_url, "queue.flush.v1", params).await?;

            if result["flushed"].as_bool().unwrap_or(false) {
                println!("{}", "✓ Flushed".green().bold());
            } else {
                println!("{}", format!("✗ Not empty after {}ms", timeout_ms).red().bold());
                std::process::exit(1);
            }
        }

        Commands::Push {
            queue,
            payload,
            key,
        } => {
            let payload: Value = serde_json::from_str(&payload).context("Invalid JSON payload")?;
            let params = json!({ "queue": queue, "payload": payload, "key": key });
            let result = call_rpc(&cli.rpc_url, "queue.push.v1", params).await?;

            let outcome = result["outcome"].as_str().unwrap_or("UNKNOWN");
            let line = format!("{} → {}", queue, outcome);
            match outcome {
                "DISPATCHED" | "PERSISTED" => println!("{}", line.green().bold()),
                _ => println!("{}", line.yellow().bold()),
            }
        }

        Commands::Has { queue, key } => {
            let params = json!({ "queue": queue, "key": key });
            let result = call_rpc(&cli.rpc_url, "queue.has.v1", params).await?;

            if result["present"].as_bool().unwrap_or(false) {
                println!("{}", format!("{} is outstanding on {}", key, queue).green());
            } else {
                println!("{}", format!("{} is not on {}", key, queue).yellow());
            }
        }
    }

    Ok(())
}
