use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::client::ApiClient;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

const TENANTS: &str = "/api/root/tenant";

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List all tenants")]
    List {
        #[arg(long, help = "Only tenants in this state (active, suspended, deleted)")]
        state: Option<String>,
    },

    #[command(about = "Show tenant information")]
    Show {
        #[arg(help = "Tenant ID")]
        id: String,
    },

    #[command(about = "Create new tenant")]
    Create {
        #[arg(help = "Tenant name")]
        name: String,
        #[arg(long = "key", required = true, help = "Routing key as kind:value, repeatable")]
        keys: Vec<String>,
        #[arg(long, help = "Storage database")]
        database: String,
        #[arg(long, help = "Storage schema within the database")]
        schema: Option<String>,
        #[arg(long, help = "Explicit tenant ID")]
        id: Option<String>,
    },

    #[command(about = "Rename tenant")]
    Rename {
        #[arg(help = "Tenant ID")]
        id: String,
        #[arg(help = "New name")]
        name: String,
    },

    #[command(about = "Suspend tenant")]
    Suspend {
        #[arg(help = "Tenant ID")]
        id: String,
        #[arg(long, default_value = "", help = "Reason recorded with the suspension")]
        reason: String,
    },

    #[command(about = "Reactivate suspended tenant")]
    Reactivate {
        #[arg(help = "Tenant ID")]
        id: String,
    },

    #[command(about = "Delete tenant")]
    Delete {
        #[arg(help = "Tenant ID")]
        id: String,
    },

    #[command(about = "Add routing key")]
    AddKey {
        #[arg(help = "Tenant ID")]
        id: String,
        #[arg(help = "Routing key as kind:value")]
        key: String,
    },

    #[command(about = "Remove routing key")]
    RemoveKey {
        #[arg(help = "Tenant ID")]
        id: String,
        #[arg(help = "Routing key as kind:value")]
        key: String,
    },

    #[command(about = "Point tenant at a different storage target")]
    MoveStorage {
        #[arg(help = "Tenant ID")]
        id: String,
        #[arg(long, help = "Storage database")]
        database: String,
        #[arg(long, help = "Storage schema within the database")]
        schema: Option<String>,
    },
}

pub async fn handle(cmd: TenantCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::List { state } => {
            let path = match state {
                Some(state) => format!("{}?state={}", TENANTS, state),
                None => TENANTS.to_string(),
            };
            let tenants = client.get(&path).await?;
            let tenants = tenants.as_array().cloned().unwrap_or_default();

            if tenants.is_empty() {
                return output_empty_collection(&output_format, "tenants", "No tenants registered");
            }
            output_tenant_list(&output_format, &tenants)
        }
        TenantCommands::Show { id } => {
            let tenant = client.get(&tenant_path(&id, "")).await?;
            output_tenant(&output_format, None, &tenant)
        }
        TenantCommands::Create { name, keys, database, schema, id } => {
            let mut body = json!({
                "name": name,
                "routing_keys": keys,
                "storage": storage(database, schema),
            });
            if let Some(id) = id {
                body["id"] = json!(id);
            }

            let tenant = client.post(TENANTS, &body).await?;
            output_tenant(&output_format, Some(&format!("Tenant '{}' created", name)), &tenant)
        }
        TenantCommands::Rename { id, name } => {
            let tenant = client.patch(&tenant_path(&id, ""), &json!({ "name": name })).await?;
            output_tenant(&output_format, Some(&format!("Tenant renamed to '{}'", name)), &tenant)
        }
        TenantCommands::Suspend { id, reason } => {
            let tenant = client.post(&tenant_path(&id, "/suspend"), &json!({ "reason": reason })).await?;
            output_tenant(&output_format, Some("Tenant suspended"), &tenant)
        }
        TenantCommands::Reactivate { id } => {
            let tenant = client.post(&tenant_path(&id, "/reactivate"), &json!({})).await?;
            output_tenant(&output_format, Some("Tenant reactivated"), &tenant)
        }
        TenantCommands::Delete { id } => {
            let tenant = client.delete(&tenant_path(&id, "")).await?;
            output_success(
                &output_format,
                &format!("Tenant '{}' deleted", tenant.get("name").and_then(Value::as_str).unwrap_or(&id)),
                Some(json!({ "tenant": tenant })),
            )
        }
        TenantCommands::AddKey { id, key } => {
            let tenant = client.post(&tenant_path(&id, "/routing-keys"), &json!({ "key": key })).await?;
            output_tenant(&output_format, Some(&format!("Routing key '{}' added", key)), &tenant)
        }
        TenantCommands::RemoveKey { id, key } => {
            let tenant = client
                .delete_with(&tenant_path(&id, "/routing-keys"), &json!({ "key": key }))
                .await?;
            output_tenant(&output_format, Some(&format!("Routing key '{}' removed", key)), &tenant)
        }
        TenantCommands::MoveStorage { id, database, schema } => {
            let tenant = client.put(&tenant_path(&id, "/storage"), &storage(database, schema)).await?;
            output_tenant(&output_format, Some("Storage target updated"), &tenant)
        }
    }
}

fn tenant_path(id: &str, suffix: &str) -> String {
    format!("{}/{}{}", TENANTS, id, suffix)
}

fn storage(database: String, schema: Option<String>) -> Value {
    match schema {
        Some(schema) => json!({ "database": database, "schema": schema }),
        None => json!({ "database": database }),
    }
}
