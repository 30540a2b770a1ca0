use chrono::{DateTime, Utc};
use rand::Rng;

/// Time source. Every component that stamps `created_at`/`updated_at` or
/// compares against a TTL takes a `&dyn Clock` instead of calling `Utc::now()`
/// directly, so tests get deterministic timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Randomness source, used by HNSW layer assignment and A/B bucket sampling.
/// Abstracted so tuner benchmarks and orchestrator A/B tests are reproducible
/// under a fixed seed.
pub trait Random: Send + Sync {
    fn gen_f64(&self) -> f64;
    fn gen_range_usize(&self, low: usize, high: usize) -> usize;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl Random for ThreadRandom {
    fn gen_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    fn gen_range_usize(&self, low: usize, high: usize) -> usize {
        rand::thread_rng().gen_range(low..high)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    /// Clock that starts at a fixed instant and advances only when told to.
    pub struct FixedClock {
        offset_seconds: AtomicI64,
        base: DateTime<Utc>,
    }

    impl FixedClock {
        pub fn new(base: DateTime<Utc>) -> Self {
            Self { offset_seconds: AtomicI64::new(0), base }
        }

        pub fn advance(&self, seconds: i64) {
            self.offset_seconds.fetch_add(seconds, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + chrono::Duration::seconds(self.offset_seconds.load(Ordering::SeqCst))
        }
    }

    /// Deterministic PRNG-like sequence for tests: cycles through a fixed
    /// list of values so layer assignment / bucket sampling is reproducible.
    pub struct ScriptedRandom {
        values: Mutex<Vec<f64>>,
        cursor: AtomicI64,
    }

    impl ScriptedRandom {
        pub fn new(values: Vec<f64>) -> Self {
            Self { values: Mutex::new(values), cursor: AtomicI64::new(0) }
        }
    }

    impl Random for ScriptedRandom {
        fn gen_f64(&self) -> f64 {
            let values = self.values.lock().unwrap();
            if values.is_empty() {
                return 0.5;
            }
            let idx = (self.cursor.fetch_add(1, Ordering::SeqCst) as usize) % values.len();
            values[idx]
        }

        fn gen_range_usize(&self, low: usize, high: usize) -> usize {
            if high <= low {
                return low;
            }
            let f = self.gen_f64();
            low + ((f * (high - low) as f64) as usize).min(high - low - 1)
        }
    }
}
