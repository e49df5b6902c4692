use clap::Subcommand;
use serde_json::Value;

use crate::cli::client::{ApiClient, ClientError};
use crate::cli::utils::output_error;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Check server health status from API /health endpoint")]
    Health,

    #[command(about = "Show server information from API root endpoint")]
    Info,
}

pub async fn handle(cmd: ServerCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Health => match client.get("/health").await {
            Ok(data) => match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
                OutputFormat::Text => {
                    println!("Server: {}", client.base_url());
                    println!("Status: {}", data.get("status").and_then(Value::as_str).unwrap_or("unknown"));
                    println!("Registry: {}", data.get("registry").and_then(Value::as_str).unwrap_or("unknown"));
                }
            },
            Err(ClientError::Api { code, message, .. }) => {
                output_error(&output_format, &message, Some(&code))?;
                return Err(anyhow::anyhow!("server is degraded: {}", message));
            }
            Err(e) => return Err(e.into()),
        },
        ServerCommands::Info => {
            let data = client.get("/").await?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
                OutputFormat::Text => {
                    println!("Name: {}", data.get("name").and_then(Value::as_str).unwrap_or("-"));
                    println!("Version: {}", data.get("version").and_then(Value::as_str).unwrap_or("-"));
                    if let Some(endpoints) = data.get("endpoints").and_then(Value::as_object) {
                        for (name, description) in endpoints {
                            println!("  {:<8} {}", name, description.as_str().unwrap_or("-"));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
