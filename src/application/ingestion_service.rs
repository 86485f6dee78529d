use std::sync::Arc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, debug, error, warn};
use crate::application::{aggregator::ResultAggregator, validator};
use crate::domain::{
    error::{IngestionError, ValidationError},
    models::{ExecutionMode, IngestionBatch, IngestionResult, Row},
    ports::DataRepository,
    registry::{Destination, DestinationRegistry},
};

const CANCELLED: &str = "cancelled before processing";

pub struct IngestionService {
    registry: Arc<DestinationRegistry>,
    data_repo: Arc<dyn DataRepository>,
}

impl IngestionService {
    pub fn new(registry: Arc<DestinationRegistry>, data_repo: Arc<dyn DataRepository>) -> Self {
        Self { registry, data_repo }
    }

    /// Validates a request and runs it. Only validation and clear failures are
    /// returned as errors; record and batch failures are folded into the result.
    pub async fn ingest(&self, request: Value, cancel: &CancellationToken) -> Result<IngestionResult, IngestionError> {
        let batch = validator::validate(&self.registry, request)
            .map_err(|e| {
                warn!("Rejected ingestion request: {}", e);
                e
            })?;
        self.process_batch(batch, cancel).await
    }

    pub async fn process_batch(&self, batch: IngestionBatch, cancel: &CancellationToken) -> Result<IngestionResult, IngestionError> {
        let destination = batch.destination;
        info!("Starting ingestion of {} records into {} ({:?} mode)",
            batch.records.len(), destination.name, batch.mode);

        let mut aggregator = ResultAggregator::new();

        // Step 1: Set-based rows are built before anything is cleared. A batch
        // that cannot be written leaves the destination untouched.
        let prepared = match batch.mode {
            ExecutionMode::Batch => match prepare_rows(&destination, &batch.records) {
                Ok(rows) => Some(rows),
                Err(rejected) => {
                    report_rejected(&destination, batch.records.len(), rejected, &mut aggregator);
                    return Ok(Self::report(&destination, aggregator));
                }
            },
            ExecutionMode::Row => None,
        };

        // Step 2: Optional clear. Not transactional with the load below.
        if batch.clear_first {
            if cancel.is_cancelled() {
                warn!("Request for {} cancelled; skipping clear", destination.name);
            } else {
                self.clear(&destination).await?;
                aggregator.mark_cleared();
            }
        }

        // Step 3: Write
        match prepared {
            Some(rows) => self.apply_set_based(&destination, rows, cancel, &mut aggregator).await,
            None => self.apply_row_by_row(&destination, &batch.records, cancel, &mut aggregator).await,
        }

        Ok(Self::report(&destination, aggregator))
    }

    fn report(destination: &Destination, aggregator: ResultAggregator) -> IngestionResult {
        let result = aggregator.finish();
        if result.cleared && result.succeeded == 0 {
            warn!("Destination {} was cleared and nothing was loaded; it is now empty", destination.name);
        }
        info!("Finished ingestion into {}: {} succeeded, {} failed",
            destination.name, result.succeeded, result.failed);
        result
    }

    /// Removes every row in the destination ahead of a reload.
    pub async fn clear(&self, destination: &Destination) -> Result<u64, IngestionError> {
        if !destination.clearable {
            return Err(ValidationError::NotClearable(destination.name.to_string()).into());
        }

        debug!("Clearing destination {}", destination.name);
        let deleted = self.data_repo.delete_all(destination).await
            .map_err(|e| {
                error!("Failed to clear {}: {}", destination.name, e);
                IngestionError::Clear {
                    destination: destination.name.to_string(),
                    message: e.to_string(),
                }
            })?;
        info!("Cleared {} rows from {}", deleted, destination.name);
        Ok(deleted)
    }

    async fn apply_set_based(
        &self,
        destination: &Destination,
        rows: Vec<Row>,
        cancel: &CancellationToken,
        aggregator: &mut ResultAggregator,
    ) {
        if cancel.is_cancelled() {
            warn!("Batch for {} cancelled before the upsert was issued", destination.name);
            aggregator.record_batch_failure(rows.len(), CANCELLED);
            return;
        }

        debug!("Upserting {} rows into {} on {:?}", rows.len(), destination.name, destination.conflict_key);
        match self.data_repo.upsert_rows(destination, &rows).await {
            Ok(()) => aggregator.record_successes(rows.len()),
            Err(e) => {
                error!("Batch upsert into {} failed: {}", destination.name, e);
                aggregator.record_batch_failure(rows.len(), e.to_string());
            }
        }
    }

    async fn apply_row_by_row(
        &self,
        destination: &Destination,
        records: &[Value],
        cancel: &CancellationToken,
        aggregator: &mut ResultAggregator,
    ) {
        for (index, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                aggregator.record_failure(index, CANCELLED);
                continue;
            }

            match self.upsert_one(destination, record).await {
                Ok(()) => aggregator.record_success(),
                Err(message) => {
                    warn!("Row {} for {} failed: {}", index, destination.name, message);
                    aggregator.record_failure(index, message);
                }
            }

            if (index + 1) % 500 == 0 {
                debug!("Processed {} of {} rows for {}", index + 1, records.len(), destination.name);
            }
        }
    }

    async fn upsert_one(&self, destination: &Destination, record: &Value) -> Result<(), String> {
        let row: Row = destination.shape.to_upsert_row(record)?;
        self.data_repo
            .upsert_rows(destination, std::slice::from_ref(&row))
            .await
            .map_err(|e| e.to_string())
    }
}

/// Turns every record into an upsert row, or returns each rejected record's
/// index and reason.
fn prepare_rows(destination: &Destination, records: &[Value]) -> Result<Vec<Row>, Vec<(usize, String)>> {
    let mut rows = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match destination.shape.to_upsert_row(record) {
            Ok(row) => rows.push(row),
            Err(message) => rejected.push((index, message)),
        }
    }
    if rejected.is_empty() {
        Ok(rows)
    } else {
        Err(rejected)
    }
}

// A record that cannot be turned into a row fails the whole batch.
fn report_rejected(
    destination: &Destination,
    total: usize,
    rejected: Vec<(usize, String)>,
    aggregator: &mut ResultAggregator,
) {
    warn!("{} of {} records for {} failed shape validation; batch not written",
        rejected.len(), total, destination.name);
    let untouched = total - rejected.len();
    for (index, message) in &rejected {
        aggregator.record_failure(*index, message);
    }
    if untouched > 0 {
        aggregator.record_batch_failure(
            untouched,
            format!("not written because {} record(s) were invalid", rejected.len()),
        );
    }
}
