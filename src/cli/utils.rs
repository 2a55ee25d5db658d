use crate::cli::OutputFormat;
use serde_json::{json, Value};

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(Value::Object(fields)) = data {
                response.as_object_mut().unwrap().extend(fields);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output a raw API response. Response bodies are data in both modes, so
/// they are always pretty-printed JSON.
pub fn output_value(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
