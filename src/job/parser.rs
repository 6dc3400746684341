//! YAML parser for job definitions
//!
//! Renders `{{ env.* }}` / `{{ vars.* }}` templates, then parses and
//! validates the result.

use crate::error::{Error, Result};
use crate::job::types::{JobDefinition, SinkDefinition, SourceDefinition};
use crate::sink::is_identifier;
use crate::template::{render_yaml, TemplateContext};
use std::fs;
use std::path::Path;
use url::Url;

/// Load a job definition from a file, using the process environment
pub fn load_job(path: impl AsRef<Path>) -> Result<JobDefinition> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!("Failed to read job file '{}': {e}", path.display()))
        }
    })?;
    load_job_from_str(&content)
}

/// Load a job definition from a YAML string, using the process environment
pub fn load_job_from_str(yaml: &str) -> Result<JobDefinition> {
    load_job_with_context(yaml, TemplateContext::from_process_env())
}

/// Load a job definition from a YAML string with an explicit template context.
///
/// The `vars:` block is rendered against the environment first and then
/// becomes the `vars` of the rest of the document.
pub fn load_job_with_context(yaml: &str, mut ctx: TemplateContext) -> Result<JobDefinition> {
    let raw: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse job YAML: {e}")))?;

    if let Some(vars) = raw.get("vars") {
        let vars = render_yaml(vars, &ctx)?;
        let vars = serde_json::to_value(&vars)
            .map_err(|e| Error::config(format!("Invalid vars block: {e}")))?;
        ctx.set_vars(vars);
    }

    let rendered = render_yaml(&raw, &ctx)?;
    let def: JobDefinition = serde_yaml::from_value(rendered)
        .map_err(|e| Error::config(format!("Invalid job definition: {e}")))?;

    validate_job(&def)?;
    Ok(def)
}

/// Validate a job definition
pub fn validate_job(def: &JobDefinition) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(Error::config("Job name cannot be empty"));
    }

    validate_source(&def.source)?;
    validate_sink(def)?;

    if def.target.attributes.is_some() && def.target.attributes_file.is_some() {
        return Err(Error::invalid_value(
            "target.attributes",
            "give either an inline map or attributes_file, not both",
        ));
    }

    // Point names only become device and attribute through the map
    if matches!(def.source, SourceDefinition::OsipiPoints(_))
        && def.target.attributes.is_none()
        && def.target.attributes_file.is_none()
    {
        return Err(Error::missing_field("target.attributes"));
    }

    if def.cursors.path.as_os_str().is_empty() {
        return Err(Error::missing_field("cursors.path"));
    }

    Ok(())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::missing_field(field))
    } else {
        Ok(())
    }
}

/// Validate a source definition
fn validate_source(source: &SourceDefinition) -> Result<()> {
    if let Some(connection) = source.pi_connection() {
        if connection.url.is_none() {
            require("source.host", &connection.host)?;
        }
        require("source.username", &connection.username)?;
        if connection.concurrency == 0 {
            return Err(Error::invalid_value("source.concurrency", "must be at least 1"));
        }
    }

    match source {
        SourceDefinition::Amqp(config) => {
            require("source.hub_name", &config.hub_name)?;
            require("source.policy_name", &config.policy_name)?;
            require("source.access_key", &config.access_key)?;
            require("source.consumer_group", &config.consumer_group)?;
            require("source.partition_id", &config.partition_id)?;
            require("source.device_id", &config.device_id)?;
        }
        SourceDefinition::OsipiPoints(config) => {
            require("source.name_filter", &config.name_filter)?;
        }
        SourceDefinition::OsipiElements(config) => {
            require("source.parent_path", &config.parent_path)?;
            if !config.parent_path.contains('\\') {
                return Err(Error::invalid_value(
                    "source.parent_path",
                    format!(
                        "'{}' is not an element path like \\\\SERVER\\Database\\Element",
                        config.parent_path
                    ),
                ));
            }
        }
        SourceDefinition::Http(config) => {
            Url::parse(&config.url)
                .map_err(|e| Error::invalid_value("source.url", format!("{}: {e}", config.url)))?;
            if config.device_field.is_none() && config.device_id.is_none() {
                return Err(Error::missing_field("source.device_field"));
            }
        }
        SourceDefinition::Csv(config) => {
            if config.path.as_os_str().is_empty() {
                return Err(Error::missing_field("source.path"));
            }
        }
    }

    Ok(())
}

/// Validate the sink definition against the target
fn validate_sink(def: &JobDefinition) -> Result<()> {
    let table = def.sink.table();
    if !is_identifier(table) {
        return Err(Error::invalid_value(
            "sink.table",
            format!("'{table}' is not an identifier"),
        ));
    }

    match &def.sink {
        SinkDefinition::Duckdb { path, create, .. } => {
            if path.as_os_str().is_empty() {
                return Err(Error::missing_field("sink.path"));
            }
            if let Some(columns) = create {
                let schema = &def.target.schema;
                for key in [&schema.device_column, &schema.timestamp_column] {
                    if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(key)) {
                        return Err(Error::missing_field(format!("sink.create.{key}")));
                    }
                }
            }
        }
        SinkDefinition::Parquet { dir, columns, .. } => {
            if dir.as_os_str().is_empty() {
                return Err(Error::missing_field("sink.dir"));
            }
            if columns.is_empty() && def.target.columns.is_empty() {
                return Err(Error::missing_field("target.columns"));
            }
        }
        SinkDefinition::Memory { .. } => {
            if def.target.columns.is_empty() {
                return Err(Error::missing_field("target.columns"));
            }
        }
    }

    Ok(())
}
