//! Construction of adapters, sinks and stores from a job definition

use crate::cursor::{CursorStore, FileCursorStore};
use crate::engine::PreloadOrchestrator;
use crate::error::{Error, Result};
use crate::flatten::AttributeMap;
use crate::job::types::{JobDefinition, SinkDefinition, SourceDefinition};
use crate::sink::{DuckDbSink, MemorySink, ParquetSink, Sink};
use crate::source::amqp::{AmqpSource, AmqpTransport};
use crate::source::osipi::{PiElementsSource, PiPointsSource};
use crate::source::{CsvSource, HttpSource, SourceAdapter};
use std::sync::Arc;
use tracing::{debug, info};

/// Builds the parts of a preload from a [`JobDefinition`]
pub struct JobBuilder<'a> {
    job: &'a JobDefinition,
    dry_run: bool,
    store: Option<Arc<dyn CursorStore>>,
    transport: Option<Arc<dyn AmqpTransport>>,
}

impl<'a> JobBuilder<'a> {
    /// Create a builder for `job`
    pub fn new(job: &'a JobDefinition) -> Self {
        Self {
            job,
            dry_run: false,
            store: None,
            transport: None,
        }
    }

    /// Write to an in-memory sink, leave the sink untouched and never write
    /// the cursor file
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use `store` instead of the job's cursor file
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CursorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `transport` for AMQP sources
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn AmqpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the source adapter
    pub fn source(&self) -> Result<Arc<dyn SourceAdapter>> {
        let name = self.job.name.clone();
        let source: Arc<dyn SourceAdapter> = match &self.job.source {
            SourceDefinition::Amqp(config) => {
                let transport = self.transport.clone().unwrap_or_else(default_transport);
                Arc::new(AmqpSource::new(name, config.clone(), transport))
            }
            SourceDefinition::OsipiPoints(config) => {
                Arc::new(PiPointsSource::new(name, config.clone())?)
            }
            SourceDefinition::OsipiElements(config) => {
                Arc::new(PiElementsSource::new(name, config.clone())?)
            }
            SourceDefinition::Http(config) => Arc::new(HttpSource::new(name, config.clone())?),
            SourceDefinition::Csv(config) => Arc::new(CsvSource::new(name, config.clone())?),
        };
        debug!(source = %source.name(), kind = source.kind(), "Built source");
        Ok(source)
    }

    /// Build the sink; in dry-run mode an in-memory sink with the real
    /// sink's columns
    pub async fn sink(&self) -> Result<Arc<dyn Sink>> {
        let target = &self.job.target;
        let table = self.job.sink.table();

        if self.dry_run {
            let columns = if target.columns.is_empty() {
                self.dry_run_columns().await?
            } else {
                target.columns.clone()
            };
            info!(table, "Dry run; writing to memory");
            return Ok(Arc::new(MemorySink::new(table, columns)));
        }

        self.real_sink()
    }

    /// Columns of the real sink, read without creating anything
    async fn dry_run_columns(&self) -> Result<Vec<String>> {
        match &self.job.sink {
            SinkDefinition::Duckdb {
                path,
                table,
                create,
            } => {
                let existing = if path.exists() {
                    DuckDbSink::open(path, table.clone())?
                        .required_columns()
                        .await
                } else {
                    Err(Error::schema_mismatch(format!(
                        "Database {} does not exist",
                        path.display()
                    )))
                };
                match (existing, create) {
                    (Ok(columns), _) => Ok(columns),
                    (Err(_), Some(columns)) => {
                        Ok(columns.iter().map(|c| c.name.clone()).collect())
                    }
                    (Err(e), None) => Err(e),
                }
            }
            _ => self.real_sink()?.required_columns().await,
        }
    }

    fn real_sink(&self) -> Result<Arc<dyn Sink>> {
        let target = &self.job.target;
        let sink: Arc<dyn Sink> = match &self.job.sink {
            SinkDefinition::Duckdb {
                path,
                table,
                create,
            } => {
                let sink = DuckDbSink::open(path, table.clone())?;
                if let Some(columns) = create {
                    sink.create_table(
                        columns,
                        &target.schema.device_column,
                        &target.schema.timestamp_column,
                    )?;
                }
                Arc::new(sink)
            }
            SinkDefinition::Parquet {
                dir,
                table,
                columns,
            } => {
                let columns = if columns.is_empty() {
                    target.columns.clone()
                } else {
                    columns.clone()
                };
                Arc::new(ParquetSink::new(dir.clone(), table.clone(), columns))
            }
            SinkDefinition::Memory { table } => {
                Arc::new(MemorySink::new(table.clone(), target.columns.clone()))
            }
        };
        Ok(sink)
    }

    /// Open the cursor store; detached from its file in dry-run mode
    pub fn store(&self) -> Result<Arc<dyn CursorStore>> {
        if let Some(store) = &self.store {
            return Ok(store.clone());
        }
        let store = FileCursorStore::open(&self.job.cursors.path)?;
        if self.dry_run {
            return Ok(Arc::new(store.detached()));
        }
        Ok(Arc::new(store))
    }

    /// Load the attribute map
    pub fn attribute_map(&self) -> Result<AttributeMap> {
        let target = &self.job.target;
        match (&target.attributes, &target.attributes_file) {
            (Some(map), _) => Ok(map.clone()),
            (None, Some(path)) => AttributeMap::from_file(path),
            (None, None) => Ok(AttributeMap::identity()),
        }
    }

    /// Build the orchestrator
    pub async fn build(self) -> Result<PreloadOrchestrator> {
        let target = &self.job.target;
        let map = self.attribute_map()?;
        debug!(entries = map.len(), "Loaded attribute map");

        let mut orchestrator =
            PreloadOrchestrator::new(self.source()?, self.sink().await?, self.store()?)
                .with_attribute_map(map)
                .with_schema(target.schema.clone())
                .dry_run(self.dry_run);

        if let Some(label) = &target.device_type {
            orchestrator = orchestrator.with_device_type(label.clone());
        }
        if let Some(label) = &target.event_type {
            orchestrator = orchestrator.with_event_type(label.clone());
        }
        Ok(orchestrator)
    }
}

#[cfg(feature = "amqp")]
fn default_transport() -> Arc<dyn AmqpTransport> {
    Arc::new(crate::source::amqp::Fe2o3Transport::new())
}

#[cfg(not(feature = "amqp"))]
fn default_transport() -> Arc<dyn AmqpTransport> {
    Arc::new(MissingTransport)
}

/// Transport of builds without the `amqp` feature; cursors can still be
/// managed, but nothing can be received
#[cfg(not(feature = "amqp"))]
struct MissingTransport;

#[cfg(not(feature = "amqp"))]
#[async_trait::async_trait]
impl AmqpTransport for MissingTransport {
    async fn open(
        &self,
        _target: &crate::source::amqp::AmqpTarget,
    ) -> Result<Box<dyn crate::source::amqp::AmqpLink>> {
        Err(crate::error::Error::config(
            "AMQP sources need a build with the `amqp` feature",
        ))
    }
}
