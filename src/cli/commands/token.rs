use clap::Subcommand;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Sign a token with the server's JWT secret (development use)")]
    Issue {
        #[arg(help = "Subject user")]
        user: String,
        #[arg(long, default_value = "user", help = "Access level; 'root' grants tenant administration")]
        access: String,
        #[arg(long, help = "Tenant routing value for the claim strategy")]
        tenant: Option<String>,
        #[arg(long, default_value = "tenant", help = "Name of the tenant claim")]
        claim_name: String,
        #[arg(long, default_value_t = 24, help = "Lifetime in hours")]
        hours: i64,
        #[arg(long, env = "JWT_SECRET", hide_env_values = true, help = "Signing secret")]
        secret: String,
    },
}

pub fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Issue { user, access, tenant, claim_name, hours, secret } => {
            let mut claims = Claims::new(&user, access, hours);
            if let Some(tenant) = tenant {
                claims = claims.with_claim(claim_name, tenant);
            }
            let token = generate_jwt(&claims, &secret)?;

            match output_format {
                OutputFormat::Json => output_success(&output_format, "Token issued", Some(json!({ "token": token }))),
                OutputFormat::Text => {
                    println!("{}", token);
                    Ok(())
                }
            }
        }
    }
}
