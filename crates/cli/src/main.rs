//! Tunekeeper CLI - command-line client for the Tunekeeper daemon

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand, ValueEnum};
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9531";

#[derive(Parser)]
#[command(name = "tunekeeper")]
#[command(about = "Tunekeeper fine-tune lifecycle CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "TUNEKEEPER_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Print raw JSON results instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a training snapshot and submit a fine-tune job
    Create {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Requesting user
        #[arg(short, long, env = "USER")]
        user: String,

        /// Only conversations at or after this time (epoch ms)
        #[arg(long)]
        from: Option<i64>,

        /// Only conversations at or before this time (epoch ms)
        #[arg(long)]
        to: Option<i64>,

        /// Folder id (repeatable)
        #[arg(long = "folder")]
        folders: Vec<String>,

        /// Session id (repeatable)
        #[arg(long = "session")]
        sessions: Vec<String>,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Minimum annotation rating (1-5)
        #[arg(long)]
        min_rating: Option<u8>,

        #[arg(long)]
        annotated_only: bool,

        #[arg(long)]
        include_flagged: bool,

        /// Full filter as JSON; flags above are merged over it
        #[arg(long)]
        filter: Option<String>,
    },

    /// Retry a snapshot's training job
    Retry {
        /// Snapshot ID
        #[arg(short, long, required_unless_present = "job")]
        snapshot: Option<String>,

        /// Provider job ID (used when no snapshot is given)
        #[arg(short, long)]
        job: Option<String>,

        /// Free-text reason recorded on the job event
        #[arg(short, long)]
        reason: Option<String>,

        /// Retry origin
        #[arg(long, value_enum, default_value = "manual")]
        origin: Origin,

        /// Requesting user
        #[arg(short, long, env = "USER")]
        user: Option<String>,
    },

    /// Show one snapshot
    Show {
        /// Snapshot ID
        snapshot_id: String,
    },

    /// List snapshots, newest first
    List {
        /// Only this job status (e.g. running, failed)
        #[arg(long)]
        status: Option<String>,

        #[arg(short = 'n', long, default_value = "50")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Show the job event history of a snapshot
    Events {
        /// Snapshot ID
        snapshot_id: String,
    },

    /// Show the lock on a snapshot
    Lock {
        /// Snapshot ID
        snapshot_id: String,
    },

    /// Force-release the lock on a snapshot
    Unlock {
        /// Snapshot ID
        snapshot_id: String,
    },

    /// Run one status poll pass now
    Poll,

    /// Show daemon statistics
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum Origin {
    Manual,
    Scheduled,
    Webhook,
}

impl Origin {
    fn as_str(&self) -> &'static str {
        match self {
            Origin::Manual => "manual",
            Origin::Scheduled => "scheduled",
            Origin::Webhook => "webhook",
        }
    }
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    data: Option<Value>,
}

#[derive(Deserialize)]
struct SnapshotView {
    id: String,
    name: String,
    version: String,
    created_by: String,
    job_id: Option<String>,
    model_version: Option<String>,
    job_status: String,
    retry_count: i32,
    max_retries: i32,
    permanently_failed: bool,
    example_count: Option<i64>,
    error_message: Option<String>,
    stale: bool,
    created_at: i64,
    updated_at: i64,
}

#[derive(Tabled)]
struct SnapshotRow {
    id: String,
    name: String,
    version: String,
    status: String,
    retries: String,
    job_id: String,
    created: String,
}

impl From<&SnapshotView> for SnapshotRow {
    fn from(s: &SnapshotView) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            version: s.version.clone(),
            status: status_label(&s.job_status, s.stale).to_string(),
            retries: format!("{}/{}", s.retry_count, s.max_retries),
            job_id: s.job_id.clone().unwrap_or_else(|| "-".to_string()),
            created: format_ms(s.created_at),
        }
    }
}

#[derive(Deserialize)]
struct JobEvent {
    job_id: String,
    user_id: String,
    status: String,
    message: Option<String>,
    retry_origin: Option<String>,
    retry_reason: Option<String>,
    created_at: i64,
}

#[derive(Tabled)]
struct EventRow {
    at: String,
    job_id: String,
    status: String,
    user: String,
    retry: String,
    message: String,
}

impl From<JobEvent> for EventRow {
    fn from(e: JobEvent) -> Self {
        let retry = match (e.retry_origin, e.retry_reason) {
            (Some(origin), Some(reason)) => format!("{} ({})", origin, reason),
            (Some(origin), None) => origin,
            _ => "-".to_string(),
        };
        Self {
            at: format_ms(e.created_at),
            job_id: e.job_id,
            status: status_label(&e.status, false).to_string(),
            user: e.user_id,
            retry,
            message: e.message.unwrap_or_default(),
        }
    }
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        match error.data {
            Some(data) => anyhow::bail!("RPC error ({}): {} {}", error.code, error.message, data),
            None => anyhow::bail!("RPC error ({}): {}", error.code, error.message),
        }
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// Merge the individual filter flags over an optional JSON filter
#[allow(clippy::too_many_arguments)]
fn build_filter(
    base: Option<&str>,
    from: Option<i64>,
    to: Option<i64>,
    folders: Vec<String>,
    sessions: Vec<String>,
    tags: Vec<String>,
    min_rating: Option<u8>,
    annotated_only: bool,
    include_flagged: bool,
) -> Result<Value> {
    let mut filter: Map<String, Value> = match base {
        Some(raw) => serde_json::from_str(raw).context("Invalid JSON filter")?,
        None => Map::new(),
    };

    if let Some(from) = from {
        filter.insert("date_from".into(), json!(from));
    }
    if let Some(to) = to {
        filter.insert("date_to".into(), json!(to));
    }
    if !folders.is_empty() {
        filter.insert("folder_ids".into(), json!(folders));
    }
    if !sessions.is_empty() {
        filter.insert("session_ids".into(), json!(sessions));
    }
    if !tags.is_empty() {
        filter.insert("tags".into(), json!(tags));
    }
    if let Some(rating) = min_rating {
        filter.insert("min_rating".into(), json!(rating));
    }
    if annotated_only {
        filter.insert("annotated_only".into(), json!(true));
    }
    if include_flagged {
        filter.insert("include_flagged".into(), json!(true));
    }

    Ok(Value::Object(filter))
}

fn status_label(status: &str, stale: bool) -> ColoredString {
    let label = if stale {
        format!("{} (stale)", status)
    } else {
        status.to_string()
    };
    match status {
        "succeeded" => label.green(),
        "failed" => label.red(),
        "retrying" => label.yellow(),
        "running" | "queued" | "validating_files" => label.cyan(),
        _ => label.normal(),
    }
}

fn format_ms(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_snapshot(s: &SnapshotView) {
    println!("{}", format!("Snapshot {}", s.id).cyan().bold());
    println!();
    println!("  {} {}", "Name:".bold(), s.name);
    println!("  {} {}", "Version:".bold(), s.version);
    println!("  {} {}", "Status:".bold(), status_label(&s.job_status, s.stale));
    println!("  {} {}/{}", "Retries:".bold(), s.retry_count, s.max_retries);
    if s.permanently_failed {
        println!("  {} {}", "Final:".bold(), "retry budget spent".red());
    }
    println!(
        "  {} {}",
        "Job:".bold(),
        s.job_id.as_deref().unwrap_or("-")
    );
    if let Some(model) = &s.model_version {
        println!("  {} {}", "Model:".bold(), model.green());
    }
    if let Some(count) = s.example_count {
        println!("  {} {}", "Examples:".bold(), count);
    }
    if let Some(err) = &s.error_message {
        println!("  {} {}", "Error:".bold(), err.red());
    }
    println!("  {} {}", "Created by:".bold(), s.created_by);
    println!("  {} {}", "Created:".bold(), format_ms(s.created_at));
    println!("  {} {}", "Updated:".bold(), format_ms(s.updated_at));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let url = cli.rpc_url.as_str();

    match cli.command {
        Commands::Create {
            name,
            user,
            from,
            to,
            folders,
            sessions,
            tags,
            min_rating,
            annotated_only,
            include_flagged,
            filter,
        } => {
            let filter_spec = build_filter(
                filter.as_deref(),
                from,
                to,
                folders,
                sessions,
                tags,
                min_rating,
                annotated_only,
                include_flagged,
            )?;
            let params = json!({
                "filter_spec": filter_spec,
                "name": name,
                "requested_by": user,
            });

            let result = call_rpc(url, "snapshot.create.v1", params).await?;
            if cli.json {
                return print_json(&result);
            }

            println!("{}", "✓ Snapshot created and job submitted".green().bold());
            println!();
            println!("  {} {}", "Snapshot:".bold(), result["snapshot_id"]);
            println!("  {} {}", "Version:".bold(), result["version"]);
            println!("  {} {}", "Job:".bold(), result["job_id"]);
            println!("  {} {}", "Examples:".bold(), result["example_count"]);
        }

        Commands::Retry {
            snapshot,
            job,
            reason,
            origin,
            user,
        } => {
            let params = json!({
                "snapshot_id": snapshot,
                "job_id": job,
                "retry_reason": reason,
                "retry_origin": origin.as_str(),
                "requested_by": user,
            });

            let result = call_rpc(url, "job.retry.v1", params).await?;
            if cli.json {
                return print_json(&result);
            }

            println!("{}", "✓ Retry submitted".green().bold());
            println!();
            println!("  {} {}", "Snapshot:".bold(), result["snapshot_id"]);
            println!("  {} {}", "New job:".bold(), result["job_id"]);
            println!("  {} {}", "Retry count:".bold(), result["retry_count"]);
        }

        Commands::Show { snapshot_id } => {
            let result = call_rpc(url, "snapshot.get.v1", json!({ "snapshot_id": snapshot_id }))
                .await?;
            if cli.json {
                return print_json(&result);
            }
            let snapshot: SnapshotView = serde_json::from_value(result)?;
            print_snapshot(&snapshot);
        }

        Commands::List {
            status,
            limit,
            offset,
        } => {
            let params = json!({ "status": status, "limit": limit, "offset": offset });
            let result = call_rpc(url, "snapshot.list.v1", params).await?;
            if cli.json {
                return print_json(&result);
            }

            let snapshots: Vec<SnapshotView> = serde_json::from_value(result)?;
            if snapshots.is_empty() {
                println!("{}", "No snapshots".yellow());
            } else {
                let rows: Vec<SnapshotRow> = snapshots.iter().map(SnapshotRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Events { snapshot_id } => {
            let result = call_rpc(url, "job.events.v1", json!({ "snapshot_id": snapshot_id }))
                .await?;
            if cli.json {
                return print_json(&result);
            }

            let events: Vec<JobEvent> = serde_json::from_value(result)?;
            if events.is_empty() {
                println!("{}", "No job events yet".yellow());
            } else {
                let rows: Vec<EventRow> = events.into_iter().map(EventRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Lock { snapshot_id } => {
            let result = call_rpc(url, "lock.status.v1", json!({ "snapshot_id": snapshot_id }))
                .await?;
            if cli.json {
                return print_json(&result);
            }

            if result["locked"].as_bool().unwrap_or(false) {
                let remaining_s = result["remaining_ms"].as_i64().unwrap_or(0) / 1000;
                println!("{}", format!("Snapshot {} is locked", snapshot_id).yellow().bold());
                println!("  {} {}", "Holder:".bold(), result["holder_id"]);
                println!("  {} {}", "Context:".bold(), result["context"]);
                println!("  {} {}s", "Expires in:".bold(), remaining_s);
            } else {
                println!("{}", format!("Snapshot {} is not locked", snapshot_id).green());
            }
        }

        Commands::Unlock { snapshot_id } => {
            let result = call_rpc(url, "lock.override.v1", json!({ "snapshot_id": snapshot_id }))
                .await?;
            if cli.json {
                return print_json(&result);
            }

            if result["released"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Lock on {} released", snapshot_id).green().bold());
            } else {
                println!("{}", format!("○ No lock held on {}", snapshot_id).yellow());
            }
        }

        Commands::Poll => {
            let result = call_rpc(url, "poller.run.v1", json!({})).await?;
            if cli.json {
                return print_json(&result);
            }

            println!("{}", "Poll pass completed".cyan().bold());
            println!();
            println!("  {} {}", "Checked:".bold(), result["checked"]);
            println!("  {} {}", "Updated:".bold(), result["updated"]);
            println!("  {} {}", "Succeeded:".bold(), result["succeeded"].to_string().green());
            println!("  {} {}", "Failed:".bold(), result["failed"].to_string().red());
            println!("  {} {}", "Retried:".bold(), result["retried"]);
            println!("  {} {}", "Errors:".bold(), result["errors"]);
        }

        Commands::Stats => {
            let stats = call_rpc(url, "admin.stats.v1", json!({})).await;
            if cli.json {
                return print_json(&stats?);
            }

            println!("{}", "Daemon Status".cyan().bold());
            println!();

            match stats {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), stats["version"]);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                    println!();
                    println!("  {} {}", "Total Snapshots:".bold(), stats["total_snapshots"]);
                    if let Some(by_status) = stats["by_status"].as_object() {
                        for (status, count) in by_status {
                            println!("    {} {}", status_label(status, false), count);
                        }
                    }
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
