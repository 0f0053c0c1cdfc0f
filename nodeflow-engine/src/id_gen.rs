use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::EngineError;
use crate::traits::IdGenerator;

const SEQUENCE_BITS: u32 = 12;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;
/// 2024-01-01T00:00:00Z
const EPOCH_MS: i64 = 1_704_067_200_000;

/// Process-local generator: milliseconds since a fixed epoch shifted left, plus a
/// per-millisecond sequence. Strictly increasing within one process.
#[derive(Debug, Default)]
pub struct LocalIdGenerator {
    state: Mutex<(i64, i64)>,
}

impl LocalIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> Result<i64, EngineError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EngineError::IdGeneration("generator state poisoned".into()))?;
        let (last_ms, seq) = *state;
        let now = Utc::now().timestamp_millis() - EPOCH_MS;

        let (ms, seq) = if now > last_ms {
            (now, 0)
        } else if seq < MAX_SEQUENCE {
            (last_ms, seq + 1)
        } else {
            // sequence exhausted, borrow from the next millisecond
            (last_ms + 1, 0)
        };
        *state = (ms, seq);
        Ok((ms << SEQUENCE_BITS) | seq)
    }
}

#[async_trait]
impl IdGenerator for LocalIdGenerator {
    async fn gen_id(&self) -> Result<i64, EngineError> {
        self.next()
    }

    async fn gen_multi_ids(&self, count: usize) -> Result<Vec<i64>, EngineError> {
        (0..count).map(|_| self.next()).collect()
    }
}
