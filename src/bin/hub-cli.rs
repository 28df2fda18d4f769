use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "hub-cli")]
#[command(about = "Management CLI for the connector dispatch service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Value sent as X-User-Id.
    #[arg(long, default_value = "admin")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status
    Status,
    /// List connectors
    Connectors,
    /// Show resilience pipelines and breaker states
    Pipelines,
    /// Send a call through a connector
    Send {
        connector_id: String,
        endpoint: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
        #[arg(long)]
        save_as_dataset: bool,
    },
    /// List scheduled jobs
    Jobs,
    /// Enable or disable a job
    Toggle { job_id: String },
    /// Fire a job now
    Run { job_id: String },
    /// Show a job's executions
    Executions { job_id: String },
    /// Send a test delivery to a webhook
    TestWebhook { webhook_id: String },
    /// Retry a webhook delivery
    Retry { delivery_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert("X-User-Id", HeaderValue::from_str(&cli.user)?);

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{}/health", base)),
        Commands::Connectors => client.get(format!("{}/api/connectors", base)),
        Commands::Pipelines => client.get(format!("{}/api/pipelines", base)),
        Commands::Send {
            connector_id,
            endpoint,
            method,
            body,
            save_as_dataset,
        } => client.post(format!("{}/api/requests", base)).json(&json!({
            "connectorId": connector_id,
            "endpoint": endpoint,
            "method": method.to_uppercase(),
            "body": body,
            "saveAsDataset": save_as_dataset,
        })),
        Commands::Jobs => client.get(format!("{}/api/jobs", base)),
        Commands::Toggle { job_id } => client.post(format!("{}/api/jobs/{}/toggle", base, job_id)),
        Commands::Run { job_id } => client.post(format!("{}/api/jobs/{}/run", base, job_id)),
        Commands::Executions { job_id } => client.get(format!("{}/api/jobs/{}/executions", base, job_id)),
        Commands::TestWebhook { webhook_id } => {
            client.post(format!("{}/api/webhooks/{}/test", base, webhook_id))
        }
        Commands::Retry { delivery_id } => {
            client.post(format!("{}/api/deliveries/{}/retry", base, delivery_id))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
