//! Physical time sources.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Seconds between the NTP era (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// Source of NTP-shaped 64-bit physical timestamps (32-bit seconds, 32-bit
/// fraction).
///
/// The clock tolerates a source that moves backward; callers only need this
/// contract to return a current reading on demand.
pub trait PhysicalTimeProvider: Send + Sync {
    fn physical_time(&self) -> u64;
}

impl<P: PhysicalTimeProvider + ?Sized> PhysicalTimeProvider for Arc<P> {
    fn physical_time(&self) -> u64 {
        (**self).physical_time()
    }
}

/// Wall-clock time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl SystemTimeProvider {
    pub fn new() -> Self {
        Self
    }
}

impl PhysicalTimeProvider for SystemTimeProvider {
    fn physical_time(&self) -> u64 {
        let now = Utc::now();
        let seconds = (now.timestamp() + NTP_UNIX_OFFSET) as u64;
        let fraction = (u64::from(now.timestamp_subsec_nanos()) << 32) / 1_000_000_000;
        (seconds << 32) | (fraction & 0xffff_ffff)
    }
}

/// Manually-advanced time source for tests.
#[derive(Debug, Default)]
pub struct ManualTimeProvider {
    time: AtomicU64,
}

impl ManualTimeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(time: u64) -> Self {
        Self {
            time: AtomicU64::new(time),
        }
    }

    pub fn set(&self, time: u64) {
        self.time.store(time, Ordering::SeqCst);
    }
}

impl PhysicalTimeProvider for ManualTimeProvider {
    fn physical_time(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }
}
