use std::path::Path;

use anyhow::Context;
use tilesplat_render::RenderOptions;

pub fn split_args_str(content: &str) -> Vec<String> {
    content.split_whitespace().map(|s| s.to_owned()).collect()
}

/// Read whitespace separated arguments from a file.
pub fn read_args_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read args file {}", path.display()))?;
    Ok(split_args_str(&content))
}

/// Convert `RenderOptions` back to command-line arguments.
/// Only includes values that differ from the defaults.
pub fn options_to_args(options: &RenderOptions) -> Vec<String> {
    use serde_json::Value;

    let options_json = serde_json::to_value(options).unwrap_or(Value::Null);
    let default_json = serde_json::to_value(RenderOptions::default()).unwrap_or(Value::Null);

    let mut args = Vec::new();

    if let (Value::Object(options_map), Value::Object(default_map)) = (options_json, default_json)
    {
        for (key, value) in options_map {
            if default_map.get(&key) == Some(&value) || value.is_null() {
                continue;
            }

            let arg_name = format!("--{key}");
            match value {
                // Flags are only written when set.
                Value::Bool(b) => {
                    if b {
                        args.push(arg_name);
                    }
                }
                Value::String(s) => args.push(format!("{arg_name} {s}")),
                Value::Number(n) => args.push(format!("{arg_name} {n}")),
                _ => args.push(format!("{arg_name} {value}")),
            }
        }
    }

    args
}
