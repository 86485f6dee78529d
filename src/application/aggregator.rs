use crate::domain::models::IngestionResult;

/// At most this many error messages are returned to the caller.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Accumulates per-record outcomes into an [`IngestionResult`].
#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: IngestionResult,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.result.succeeded += 1;
    }

    pub fn record_successes(&mut self, count: usize) {
        self.result.succeeded += count;
    }

    /// `index` is the record's zero-based position in the submitted batch.
    pub fn record_failure(&mut self, index: usize, message: impl AsRef<str>) {
        self.result.failed += 1;
        self.push_error(format!("Row {}: {}", index, message.as_ref()));
    }

    /// Fails `count` records as one unit with a single message.
    pub fn record_batch_failure(&mut self, count: usize, message: impl AsRef<str>) {
        self.result.failed += count;
        self.push_error(format!("Batch: {}", message.as_ref()));
    }

    pub fn mark_cleared(&mut self) {
        self.result.cleared = true;
    }

    pub fn finish(self) -> IngestionResult {
        self.result
    }

    fn push_error(&mut self, message: String) {
        if self.result.errors.len() < MAX_REPORTED_ERRORS {
            self.result.errors.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_row_errors_with_their_index() {
        let mut aggregator = ResultAggregator::new();
        aggregator.record_success();
        aggregator.record_failure(1, "missing required column 'venue'");
        aggregator.record_success();

        let result = aggregator.finish();
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors, vec!["Row 1: missing required column 'venue'"]);
    }

    #[test]
    fn caps_reported_errors_but_counts_every_failure() {
        let mut aggregator = ResultAggregator::new();
        for index in 0..25 {
            aggregator.record_failure(index, "bad");
        }

        let result = aggregator.finish();
        assert_eq!(result.failed, 25);
        assert_eq!(result.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(result.errors[9], "Row 9: bad");
    }

    #[test]
    fn batch_failures_count_every_record() {
        let mut aggregator = ResultAggregator::new();
        aggregator.record_batch_failure(40, "duplicate key value");

        let result = aggregator.finish();
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.failed, 40);
        assert_eq!(result.errors, vec!["Batch: duplicate key value"]);
    }
}
