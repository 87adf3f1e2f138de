use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Connection management CLI for the local gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway health
    Health,
    /// List open WebSocket connections
    Connections,
    /// Show one connection's metadata
    Get { connection_id: String },
    /// Send a payload to one connection
    Send {
        connection_id: String,
        payload: String,
    },
    /// Close one connection
    Disconnect { connection_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)).send().await?,
        Commands::Connections => client.get(format!("{}/@connections", base)).send().await?,
        Commands::Get { connection_id } => {
            client
                .get(format!("{}/@connections/{}", base, connection_id))
                .send()
                .await?
        }
        Commands::Send {
            connection_id,
            payload,
        } => {
            client
                .post(format!("{}/@connections/{}", base, connection_id))
                .body(payload)
                .send()
                .await?
        }
        Commands::Disconnect { connection_id } => {
            client
                .delete(format!("{}/@connections/{}", base, connection_id))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
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
