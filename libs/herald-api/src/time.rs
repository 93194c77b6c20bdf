use std::sync::atomic::{AtomicI64, Ordering};

/// Wall-clock milliseconds since the unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Source of record timestamps.
pub trait TimeSource: Send + Sync {
    /// Epoch milliseconds; never smaller than a previous sample from the same source.
    fn now_millis(&self) -> i64;
}

/// Wall clock clamped so that it never goes backwards, even if the system
/// clock is stepped back between samples.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn observe(&self, wall_ms: i64) -> i64 {
        let prev = self.last.fetch_max(wall_ms, Ordering::AcqRel);
        prev.max(wall_ms)
    }
}

impl TimeSource for SystemClock {
    fn now_millis(&self) -> i64 {
        self.observe(now_ms())
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::AcqRel);
    }
}

impl TimeSource for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
