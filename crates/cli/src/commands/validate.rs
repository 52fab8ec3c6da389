//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{IngestBlueprint, SinkRole};
use ingestion::AdapterRegistry;
use serde::Serialize;
use tracing::info;

use super::{check_sources, load_blueprint};
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Debug, Serialize)]
struct ConfigSummary {
    version: String,
    source_count: usize,
    enabled_sources: usize,
    sink_count: usize,
    dedup_ttl_secs: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args, &AdapterRegistry::with_defaults());

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs, registry: &AdapterRegistry) -> ValidationResult {
    let config_path = args.config.display().to_string();

    let blueprint = match load_blueprint(&args.config) {
        Ok(blueprint) => blueprint,
        Err(e) => {
            return ValidationResult {
                valid: false,
                config_path,
                errors: vec![e.to_string()],
                warnings: Vec::new(),
                summary: None,
            }
        }
    };

    let errors = check_sources(&blueprint, registry);
    ValidationResult {
        valid: errors.is_empty(),
        config_path,
        errors,
        warnings: collect_warnings(&blueprint),
        summary: Some(ConfigSummary {
            version: format!("{:?}", blueprint.version),
            source_count: blueprint.sources.len(),
            enabled_sources: blueprint.enabled_sources().count(),
            sink_count: blueprint.sinks.len(),
            dedup_ttl_secs: blueprint.effective_dedup_ttl().as_secs(),
        }),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &IngestBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.enabled_sources().next().is_none() {
        warnings.push("No enabled sources - nothing will be polled".to_string());
    }

    for role in [SinkRole::MessageBus, SinkRole::TimeSeries] {
        if !blueprint.sinks.iter().any(|s| s.role == role) {
            warnings.push(format!("No {role:?} sink configured"));
        }
    }

    for source in blueprint.sources.iter().filter(|s| !s.enabled) {
        warnings.push(format!("Source '{}' is disabled", source.id));
    }

    if blueprint.pipeline.max_workers < blueprint.enabled_sources().count() {
        warnings.push(format!(
            "pipeline.max_workers ({}) is below the number of enabled sources; cycles may queue",
            blueprint.pipeline.max_workers
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        for error in &result.errors {
            println!("\n  Error: {}", error);
        }
    }

    if let Some(ref summary) = result.summary {
        println!("\n  Version: {}", summary.version);
        println!(
            "  Sources: {} ({} enabled)",
            summary.source_count, summary.enabled_sources
        );
        println!("  Sinks: {}", summary.sink_count);
        println!("  Dedup TTL: {}s", summary.dedup_ttl_secs);
    }

    if !result.warnings.is_empty() {
        println!("\n⚠ Warnings:");
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn args(file: &tempfile::NamedTempFile) -> ValidateArgs {
        ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        }
    }

    #[test]
    fn test_valid_mock_config() {
        let file = write_config(
            r#"
[[sources]]
id = "demo"
source_type = "mock"
interval_secs = 30

[[sinks]]
name = "bus"
role = "message_bus"
sink_type = "log"
"#,
        );
        let result = validate_config(&args(&file), &AdapterRegistry::with_defaults());
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.summary.as_ref().unwrap().enabled_sources, 1);
        assert!(result.warnings.iter().any(|w| w.contains("TimeSeries")));
    }

    #[test]
    fn test_unknown_source_type_rejected() {
        let file = write_config(
            r#"
[[sources]]
id = "x"
source_type = "airthings"
interval_secs = 60
"#,
        );
        let result = validate_config(&args(&file), &AdapterRegistry::with_defaults());
        assert!(!result.valid);
        assert!(result.errors[0].contains("airthings"));
    }

    #[test]
    fn test_example_config() {
        let args = ValidateArgs {
            config: concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/airq.example.toml").into(),
            json: false,
        };
        let result = validate_config(&args, &AdapterRegistry::with_defaults());
        assert!(result.valid, "{:?}", result.errors);
        let summary = result.summary.unwrap();
        assert_eq!(summary.source_count, 3);
        assert_eq!(summary.enabled_sources, 1);
        assert_eq!(summary.dedup_ttl_secs, 60);
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/airq.toml".into(),
            json: false,
        };
        let result = validate_config(&args, &AdapterRegistry::new());
        assert!(!result.valid);
        assert!(result.errors[0].contains("not found"));
        assert!(result.summary.is_none());
    }

    #[test]
    fn test_loader_error_reported() {
        let file = write_config(
            r#"
[[sources]]
id = "x"
source_type = "mock"
interval_secs = 0
"#,
        );
        let result = validate_config(&args(&file), &AdapterRegistry::with_defaults());
        assert!(!result.valid);
        assert!(result.errors[0].contains("interval_secs"));
    }
}
