//! Config check command handler.

use anyhow::{Context, Result};

use murmur::config::validate::{self, DiagnosticLevel};

use super::{config_path, ConfigAction};

/// Validate configuration file.
pub(crate) async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { config } => {
            let path = config_path(config);
            println!("Config file: {}", path.display());

            if !path.exists() {
                println!("[OK] No config file found (using defaults)");
                return Ok(());
            }

            let content = std::fs::read_to_string(&path).context("Failed to read config file")?;

            let raw: serde_json::Value = match serde_json::from_str(&content) {
                Ok(v) => v,
                Err(e) => {
                    println!("[ERROR] Invalid JSON: {}", e);
                    return Ok(());
                }
            };

            let diagnostics = validate::validate_config(&raw);
            for diag in &diagnostics {
                println!("{}", diag);
            }

            let count = |level: DiagnosticLevel| diagnostics.iter().filter(|d| d.level == level).count();
            let (errors, warnings) = (count(DiagnosticLevel::Error), count(DiagnosticLevel::Warn));

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
        }
    }
    Ok(())
}
