use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(obj)) = (data, response.as_object_mut()) {
                obj.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str, error_code: Option<&str>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Output an empty collection in the appropriate format
pub fn output_empty_collection(output_format: &OutputFormat, collection_name: &str, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: [] }))?);
        }
        OutputFormat::Text => {
            println!("{}", message);
        }
    }
    Ok(())
}

/// Tenant listing as a table or a JSON array
pub fn output_tenant_list(output_format: &OutputFormat, tenants: &[Value]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "tenants": tenants }))?);
        }
        OutputFormat::Text => {
            println!("{:<38} {:<24} {:<10} {:<20} {}", "ID", "NAME", "STATE", "STORAGE", "ROUTING KEYS");
            println!("{}", "-".repeat(110));

            for tenant in tenants {
                println!(
                    "{:<38} {:<24} {:<10} {:<20} {}",
                    str_field(tenant, "id"),
                    str_field(tenant, "name"),
                    str_field(tenant, "state"),
                    storage_label(tenant),
                    routing_keys(tenant).join(", ")
                );
            }
        }
    }
    Ok(())
}

/// Single tenant status
pub fn output_tenant(output_format: &OutputFormat, message: Option<&str>, tenant: &Value) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({ "tenant": tenant });
            if let Some(message) = message {
                response["message"] = json!(message);
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            if let Some(message) = message {
                println!("✓ {}", message);
            }
            println!("Tenant: {}", str_field(tenant, "name"));
            println!("ID: {}", str_field(tenant, "id"));
            println!("State: {}", str_field(tenant, "state"));
            println!("Storage: {}", storage_label(tenant));
            println!("Routing Keys: {}", routing_keys(tenant).join(", "));
            if let Some(suspension) = tenant.get("suspension").filter(|s| !s.is_null()) {
                println!(
                    "Suspended: {} by {} ({})",
                    str_field(suspension, "at"),
                    str_field(suspension, "actor"),
                    str_field(suspension, "reason")
                );
            }
            println!("Version: {}", tenant.get("version").and_then(Value::as_i64).unwrap_or_default());
            println!("Updated: {}", str_field(tenant, "updated_at"));
        }
    }
    Ok(())
}

fn str_field<'a>(value: &'a Value, name: &str) -> &'a str {
    value.get(name).and_then(Value::as_str).unwrap_or("-")
}

fn storage_label(tenant: &Value) -> String {
    let storage = tenant.get("storage_target").unwrap_or(&Value::Null);
    match storage.get("schema").and_then(Value::as_str) {
        Some(schema) => format!("{}.{}", str_field(storage, "database"), schema),
        None => str_field(storage, "database").to_string(),
    }
}

fn routing_keys(tenant: &Value) -> Vec<&str> {
    tenant
        .get("routing_keys")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
