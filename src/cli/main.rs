use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use reqwest::{Client, Response};
use serde_json::json;

#[derive(Parser)]
#[command(name = "avatar-hub-cli")]
#[command(about = "Avatar Live Hub operator CLI", long_about = None, version)]
struct Cli {
    #[arg(short, long, env = "AVATAR_HUB_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health
    Health,

    /// Show viewer counts, for one stream or all of them
    Viewers {
        #[arg(value_name = "STREAM_ID")]
        stream: Option<String>,
    },

    /// Show the liveness record of a stream
    Status {
        #[arg(value_name = "STREAM_ID")]
        stream: String,
    },

    /// Send a heartbeat on behalf of a stream
    Heartbeat {
        #[arg(value_name = "STREAM_ID")]
        stream: String,
    },

    /// Start or stop a stream explicitly
    #[command(group(ArgGroup::new("state").required(true).args(["live", "offline"])))]
    SetStatus {
        #[arg(value_name = "STREAM_ID")]
        stream: String,

        #[arg(long)]
        live: bool,

        #[arg(long)]
        offline: bool,

        #[arg(short, long)]
        title: Option<String>,
    },

    /// List every known stream
    Streams,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base = cli.endpoint.trim_end_matches('/');

    let response = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)).send().await,
        Commands::Viewers { stream: None } => {
            client.get(format!("{}/v1/viewers", base)).send().await
        }
        Commands::Viewers {
            stream: Some(stream),
        } => {
            client
                .get(format!("{}/v1/viewers/{}", base, stream))
                .send()
                .await
        }
        Commands::Status { stream } => {
            client
                .get(format!("{}/v1/streams/{}", base, stream))
                .send()
                .await
        }
        Commands::Heartbeat { stream } => {
            client
                .post(format!("{}/v1/streams/{}/heartbeat", base, stream))
                .send()
                .await
        }
        Commands::SetStatus {
            stream,
            live,
            offline: _,
            title,
        } => {
            client
                .put(format!("{}/v1/streams/{}/status", base, stream))
                .json(&json!({ "is_live": live, "title": title }))
                .send()
                .await
        }
        Commands::Streams => client.get(format!("{}/v1/streams", base)).send().await,
    }
    .with_context(|| format!("Failed to reach {}", base))?;

    print_response(response).await
}

async fn print_response(response: Response) -> Result<()> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .context("Server returned a non-JSON body")?;

    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        bail!("Request failed with status {}", status);
    }
    Ok(())
}
