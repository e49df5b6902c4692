pub mod client;
pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use client::ApiClient;

#[derive(Parser)]
#[command(name = "tenantctl")]
#[command(about = "tenantctl - Command-line administration for Tenant Guard")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        env = "TENANTCTL_URL",
        default_value = "http://localhost:3000",
        help = "Server base URL"
    )]
    pub url: String,

    #[arg(long, global = true, env = "TENANTCTL_TOKEN", hide_env_values = true, help = "Root bearer token")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Tenant lifecycle administration")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Server health and information")]
    Server {
        #[command(subcommand)]
        cmd: commands::server::ServerCommands,
    },

    #[command(about = "Issue development tokens")]
    Token {
        #[command(subcommand)]
        cmd: commands::token::TokenCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Tenant { cmd } => {
            let client = ApiClient::new(&cli.url, cli.token)?;
            commands::tenant::handle(cmd, &client, output_format).await
        }
        Commands::Server { cmd } => {
            let client = ApiClient::new(&cli.url, cli.token)?;
            commands::server::handle(cmd, &client, output_format).await
        }
        Commands::Token { cmd } => commands::token::handle(cmd, output_format),
    }
}
