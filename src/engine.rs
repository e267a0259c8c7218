//! Pipeline context: the DataFusion session and the runtime that drives it
//!
//! One context is created at the start of a run, handed to every stage, and
//! released at the end. Stages are synchronous; they enter the context's
//! runtime with [`PipelineContext::block_on`].

use std::future::Future;
use std::sync::{Arc, Mutex};

use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::prelude::*;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{Datasets, LoadedTable, ReportTable};

pub struct PipelineContext {
    session: Arc<SessionContext>,
    runtime: Runtime,
    registered: Mutex<Vec<String>>,
}

impl PipelineContext {
    /// Create a session with `target_partitions` partitions and a runtime
    /// with as many worker threads
    pub fn new(target_partitions: usize) -> Result<Self> {
        let partitions = target_partitions.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(partitions)
            .enable_all()
            .build()
            .map_err(|e| PipelineError::Runtime(format!("Failed to create Tokio runtime: {}", e)))?;

        // single-partition file scans keep loaded rows in source order
        let config = SessionConfig::new()
            .with_target_partitions(partitions)
            .with_repartition_file_scans(false);
        let session = SessionContext::new_with_config(config);
        debug!(partitions, "pipeline context created");

        Ok(Self {
            session: Arc::new(session),
            runtime,
            registered: Mutex::new(Vec::new()),
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Run a future to completion on the context's runtime
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Register record batches as an in-memory table, replacing any table
    /// of the same name
    pub fn register_batches(
        &self,
        name: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<()> {
        let table = MemTable::try_new(schema, vec![batches])?;
        let _ = self.session.deregister_table(name)?;
        self.session.register_table(name, Arc::new(table))?;

        let mut registered = self
            .registered
            .lock()
            .map_err(|e| PipelineError::Runtime(format!("Mutex poisoned: {}", e)))?;
        if !registered.iter().any(|n| n == name) {
            registered.push(name.to_string());
        }
        Ok(())
    }

    pub fn register_table(&self, table: &LoadedTable) -> Result<()> {
        self.register_batches(
            table.kind().table_name(),
            table.schema.arrow_schema(),
            table.batches.clone(),
        )
    }

    /// Register all four input tables under their canonical names
    pub fn register_datasets(&self, datasets: &Datasets) -> Result<()> {
        for table in datasets.tables() {
            self.register_table(table)?;
        }
        Ok(())
    }

    pub fn require_table(&self, name: &str) -> Result<()> {
        if self.session.table_exist(name)? {
            Ok(())
        } else {
            Err(PipelineError::TableNotRegistered(name.to_string()))
        }
    }

    /// Plan a SQL query against the registered tables
    pub fn sql(&self, sql: &str) -> Result<DataFrame> {
        debug!(sql, "planning query");
        Ok(self.block_on(self.session.sql(sql))?)
    }

    /// Execute a DataFrame and materialize it as a named result table
    pub fn collect(&self, name: &str, df: DataFrame) -> Result<ReportTable> {
        let schema: SchemaRef = Arc::new(df.schema().as_arrow().clone());
        let batches = self
            .block_on(df.collect())
            .map_err(|e| PipelineError::query(name, e))?;
        Ok(ReportTable::new(name, schema, batches))
    }

    /// Plan and execute a SQL query in one step
    pub fn sql_collect(&self, name: &str, sql: &str) -> Result<ReportTable> {
        let df = self.sql(sql).map_err(|e| PipelineError::query(name, e))?;
        self.collect(name, df)
    }

    /// Deregister every table this context registered and shut the runtime down
    pub fn release(self) -> Result<()> {
        let names = self
            .registered
            .lock()
            .map_err(|e| PipelineError::Runtime(format!("Mutex poisoned: {}", e)))?
            .clone();
        for name in &names {
            self.session.deregister_table(name.as_str())?;
        }
        debug!(tables = names.len(), "pipeline context released");
        self.runtime.shutdown_background();
        Ok(())
    }
}
