//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::job::{load_job, JobBuilder, JobDefinition, SourceDefinition};
use crate::source::osipi::PiClient;
use serde_json::{json, Value};
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command, returning the process exit code
    pub async fn run(&self) -> Result<i32> {
        match &self.cli.command {
            Commands::Run { dry_run } => self.run_cycle(*dry_run).await,
            Commands::Check => self.check().await,
            Commands::List {
                attributes,
                path_prefix,
            } => self.list(*attributes, path_prefix.as_deref()).await,
            Commands::Cursor { set, reset, all } => {
                self.cursor(set.as_deref(), *reset, *all).await
            }
            Commands::Validate => self.validate(),
        }
    }

    /// Load job definition
    fn load_job(&self) -> Result<JobDefinition> {
        let path = self
            .cli
            .job
            .as_ref()
            .ok_or_else(|| Error::config("Job file not specified (use -j flag)"))?;
        load_job(path)
    }

    /// Run one cycle
    async fn run_cycle(&self, dry_run: bool) -> Result<i32> {
        let job = self.load_job()?;
        let orchestrator = JobBuilder::new(&job).dry_run(dry_run).build().await?;

        match orchestrator.run_cycle().await {
            Ok(report) => {
                self.output_message(&json!({
                    "type": "CYCLE_REPORT",
                    "status": "SUCCEEDED",
                    "report": report,
                }));
                Ok(0)
            }
            Err(e) => {
                self.output_message(&json!({
                    "type": "CYCLE_REPORT",
                    "status": "FAILED",
                    "source": job.name,
                    "error": e.to_string(),
                    "source_unavailable": e.is_source_unavailable(),
                }));
                Ok(1)
            }
        }
    }

    /// Check source reachability
    async fn check(&self) -> Result<i32> {
        let job = self.load_job()?;
        let source = JobBuilder::new(&job).source()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!("Checking {} source {}", source.kind(), source.name())
            }
        }));

        let (status, message, code) = match source.check().await {
            Ok(result) if result.success => ("SUCCEEDED", result.message, 0),
            Ok(result) => ("FAILED", result.message, 1),
            Err(e) => ("FAILED", Some(e.to_string()), 1),
        };
        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": {
                "status": status,
                "message": message,
            }
        }));
        Ok(code)
    }

    /// List points or elements of an OSI-Pi source
    async fn list(&self, attributes: bool, path_prefix: Option<&str>) -> Result<i32> {
        let job = self.load_job()?;
        let connection = job
            .source
            .pi_connection()
            .ok_or_else(|| Error::config(format!("Cannot list a {} source", job.source.kind())))?;
        let client = PiClient::new(connection)?;

        match &job.source {
            SourceDefinition::OsipiPoints(_) => {
                let points = client.list_points().await?;
                info!("Listed {} points", points.len());
                self.output_message(&json!({"type": "POINTS", "points": points}));
            }
            _ => {
                let elements = client.list_elements(path_prefix, attributes).await?;
                info!("Listed {} elements", elements.len());
                self.output_message(&json!({"type": "ELEMENTS", "elements": elements}));
            }
        }
        Ok(0)
    }

    /// Show, set or reset cursors
    async fn cursor(&self, set: Option<&str>, reset: bool, all: bool) -> Result<i32> {
        let job = self.load_job()?;
        let builder = JobBuilder::new(&job);
        let store = builder.store()?;

        if all {
            let entries: serde_json::Map<String, Value> = store
                .entries()
                .await?
                .into_iter()
                .map(|(key, entry)| Ok((key, serde_json::to_value(entry)?)))
                .collect::<Result<_>>()?;
            self.output_message(&json!({"type": "CURSORS", "cursors": entries}));
            return Ok(0);
        }

        let source = builder.source()?;
        let key = source.cursor_key();

        if reset {
            let removed = store.remove(&key).await?;
            info!(key = %key, removed, "Reset cursor");
            self.output_message(&json!({"type": "CURSOR", "key": key, "cursor": Value::Null}));
            return Ok(0);
        }

        let cursor = match set {
            Some(text) => {
                let cursor = Cursor::parse(source.cursor_kind(), text)?;
                store.put(&key, cursor.clone()).await?;
                info!(key = %key, cursor = %cursor, "Set cursor");
                Some(cursor)
            }
            None => store.get(&key, source.default_cursor()).await?,
        };
        self.output_message(&json!({"type": "CURSOR", "key": key, "cursor": cursor}));
        Ok(0)
    }

    /// Validate job definition
    fn validate(&self) -> Result<i32> {
        let job = self.load_job()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Job '{}' is valid: {} source into table {}",
                    job.name,
                    job.source.kind(),
                    job.sink.table()
                )
            }
        }));

        Ok(0)
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}
