//! MemorySink - keeps batches in memory, with failure injection
//!
//! Clones share state, so a test can keep one clone and hand the other to
//! a `SinkHandle`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{CanonicalReading, ContractError, ReadingBatch, ReadingSink};

#[derive(Clone)]
pub struct MemorySink {
    name: String,
    batches: Arc<Mutex<Vec<ReadingBatch>>>,
    attempts: Arc<AtomicU64>,
    fail_next: Arc<AtomicU32>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batches: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicU64::new(0)),
            fail_next: Arc::new(AtomicU32::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            delay: None,
        }
    }

    /// Sleep before every write
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `n` writes
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every write until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Batches written successfully
    pub fn batches(&self) -> Vec<ReadingBatch> {
        self.lock().clone()
    }

    /// All readings written, in write order
    pub fn readings(&self) -> Vec<Arc<CanonicalReading>> {
        self.lock()
            .iter()
            .flat_map(|b| b.readings.iter().cloned())
            .collect()
    }

    /// Write attempts, failed ones included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReadingBatch>> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ReadingSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_batch(&mut self, batch: &ReadingBatch) -> Result<(), ContractError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail() {
            return Err(ContractError::sink_write(&self.name, "injected failure"));
        }
        self.lock().push(batch.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
