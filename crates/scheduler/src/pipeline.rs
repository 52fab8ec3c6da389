//! Per-cycle processing: transform → validate → score → dedup
//!
//! Synchronous and free of I/O; the worker does the quarantine writes and
//! publishing with what comes out.

use std::time::Instant;

use chrono::{DateTime, Utc};
use contracts::{
    FetchBatch, PipelineSettings, QuarantineEntry, QuarantineKind, SourceAdapter, SourceConfig,
};
use observability::CycleCounts;
use quality::{AnomalyScorer, Validator};
use tracing::debug;

use crate::coordination::CoordinationState;

/// Output of one processed fetch batch
#[derive(Debug, Default)]
pub struct CycleWork {
    /// Accepted, scored, first-seen readings in fetch order
    pub publish: Vec<contracts::CanonicalReading>,
    pub quarantine: Vec<QuarantineEntry>,
    pub counts: CycleCounts,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    validator: Validator,
    scorer: AnomalyScorer,
}

impl Pipeline {
    pub fn new(validator: Validator, scorer: AnomalyScorer) -> Self {
        Self { validator, scorer }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(Validator::from_settings(settings), AnomalyScorer::new())
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Process one fetched batch
    ///
    /// Malformed and rejected records become quarantine entries; they never
    /// fail the batch.
    pub fn process(
        &self,
        adapter: &dyn SourceAdapter,
        source: &SourceConfig,
        batch: &FetchBatch,
        state: &CoordinationState,
        now: DateTime<Utc>,
        mono_now: Instant,
    ) -> CycleWork {
        let mut work = CycleWork::default();
        let mut accepted = Vec::with_capacity(batch.len());

        for record in &batch.records {
            let reading = match adapter.transform(record) {
                Ok(reading) => reading,
                Err(malformed) => {
                    debug!(source_id = %source.id, reason = %malformed.reason, "malformed record");
                    work.counts.malformed += 1;
                    work.quarantine.push(QuarantineEntry {
                        source_id: source.id.clone(),
                        sensor_id: None,
                        kind: QuarantineKind::Malformed,
                        reasons: vec![malformed.reason],
                        raw_payload: record.payload.clone(),
                        quarantined_at: now,
                    });
                    continue;
                }
            };

            let (reading, report) = self.validator.validate(reading, now);
            if report.accepted() {
                accepted.push(reading);
                continue;
            }

            debug!(
                source_id = %source.id,
                sensor_id = %reading.sensor_id,
                issues = ?report.issues,
                "reading rejected"
            );
            work.counts.rejected += 1;
            work.quarantine.push(QuarantineEntry {
                source_id: source.id.clone(),
                sensor_id: Some(reading.sensor_id.clone()).filter(|id| !id.is_empty()),
                kind: QuarantineKind::Rejected,
                reasons: report.issues,
                raw_payload: record.payload.clone(),
                quarantined_at: now,
            });
        }

        let admitted = state.admit(accepted, &self.scorer, source.reporting_resolution(), mono_now);
        work.counts.accepted = admitted.readings.len() as u64;
        work.counts.duplicates = admitted.duplicates;
        work.publish = admitted.readings;
        work
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use contracts::RawRecord;
    use ingestion::{MockReading, ScriptedAdapter};
    use serde_json::json;
    use std::time::Duration;

    fn state() -> CoordinationState {
        CoordinationState::new(Duration::from_secs(600), 1000, 1000)
    }

    fn batch(records: Vec<RawRecord>) -> FetchBatch {
        FetchBatch::new(records, None)
    }

    #[test]
    fn test_mixed_batch_is_isolated_per_record() {
        let adapter = ScriptedAdapter::new("mock-1");
        let source = SourceConfig::new("mock-1", "mock", 60);
        let now = Utc::now();

        let good = MockReading::new("s1", now).at(47.6, -122.3).with("pm25", 12.0).into_record("mock-1");
        let future = MockReading::new("s2", now + ChronoDuration::hours(1))
            .at(47.6, -122.3)
            .with("pm25", 12.0)
            .into_record("mock-1");
        let out_of_range = MockReading::new("s3", now).at(47.6, -122.3).with("pm25", 1500.0).into_record("mock-1");
        let malformed = RawRecord::new("mock-1", json!({"sensor_id": 7}));

        let work = Pipeline::default().process(
            &adapter,
            &source,
            &batch(vec![good, future, out_of_range, malformed]),
            &state(),
            now,
            Instant::now(),
        );

        assert_eq!(work.publish.len(), 1);
        assert_eq!(work.publish[0].sensor_id, "s1");
        assert!(work.publish[0].quality_flags.validated);
        assert_eq!(work.counts.accepted, 1);
        assert_eq!(work.counts.rejected, 2);
        assert_eq!(work.counts.malformed, 1);

        let reasons: Vec<_> = work.quarantine.iter().map(|q| q.reasons.join("; ")).collect();
        assert_eq!(reasons[0], "Timestamp cannot be in the future");
        assert_eq!(reasons[1], "PM2.5 value 1500 out of range [0, 1000]");
        assert_eq!(work.quarantine[2].kind, QuarantineKind::Malformed);
    }

    #[test]
    fn test_soft_threshold_accepted_with_score() {
        let adapter = ScriptedAdapter::new("mock-1");
        let source = SourceConfig::new("mock-1", "mock", 60);
        let now = Utc::now();
        let record = MockReading::new("s1", now).at(47.6, -122.3).with("pm25", 600.0).into_record("mock-1");

        let work = Pipeline::default().process(
            &adapter,
            &source,
            &batch(vec![record]),
            &state(),
            now,
            Instant::now(),
        );

        assert_eq!(work.publish.len(), 1);
        assert!(work.publish[0].quality_flags.anomaly_score >= 0.5);
        assert!(work.publish[0].quality_flags.issues.is_empty());
    }

    #[test]
    fn test_duplicates_within_cycle_counted() {
        let adapter = ScriptedAdapter::new("mock-1");
        let source = SourceConfig::new("mock-1", "mock", 60);
        let now = Utc::now();
        let record = MockReading::new("s1", now).at(47.6, -122.3).with("pm25", 5.0).into_record("mock-1");

        let state = state();
        let pipeline = Pipeline::default();
        let work = pipeline.process(
            &adapter,
            &source,
            &batch(vec![record.clone(), record.clone()]),
            &state,
            now,
            Instant::now(),
        );
        assert_eq!(work.counts.accepted, 1);
        assert_eq!(work.counts.duplicates, 1);

        let again = pipeline.process(&adapter, &source, &batch(vec![record]), &state, now, Instant::now());
        assert!(again.publish.is_empty());
        assert_eq!(again.counts.duplicates, 1);
    }
}
