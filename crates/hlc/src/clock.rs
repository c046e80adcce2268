//! The hybrid logical clock.

use std::sync::Arc;

use thiserror::Error;

use chronicle_core::HybridTimestamp;
use chronicle_core::timestamp::ntp_order;

use crate::time::PhysicalTimeProvider;

/// Clock failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// More than `u16::MAX` timestamps were drawn within a single physical
    /// tick; the 16-bit counter span of the wire form is exhausted.
    #[error("logical counter overflow at logical time {logical_time}")]
    CounterOverflow { logical_time: u64 },
}

/// Hybrid logical clock.
///
/// Successive [`update`](Self::update) calls on one instance return strictly
/// increasing timestamps even when the physical source stalls or moves
/// backward, and a timestamp produced after observing a remote one always
/// compares greater than it.
pub struct HybridClock {
    provider: Arc<dyn PhysicalTimeProvider>,
    timestamp: HybridTimestamp,
}

impl HybridClock {
    pub fn new(provider: Arc<dyn PhysicalTimeProvider>) -> Self {
        Self::starting_at(provider, HybridTimestamp::ZERO)
    }

    /// Resume a clock from a previously persisted timestamp.
    pub fn starting_at(provider: Arc<dyn PhysicalTimeProvider>, timestamp: HybridTimestamp) -> Self {
        Self {
            provider,
            timestamp,
        }
    }

    /// The clock's current position, without advancing it.
    pub fn now(&self) -> HybridTimestamp {
        self.timestamp
    }

    /// Advance for a locally-generated event.
    pub fn update(&mut self) -> Result<HybridTimestamp, ClockError> {
        let physical = self.provider.physical_time();
        if ntp_order(self.timestamp.logical_time(), physical).is_lt() {
            self.timestamp = HybridTimestamp::new(physical, 0);
        } else {
            self.timestamp = self.bump(self.timestamp.logical_counter())?;
        }
        Ok(self.timestamp)
    }

    /// Advance upon observing a remote timestamp.
    pub fn update_received(
        &mut self,
        received: HybridTimestamp,
    ) -> Result<HybridTimestamp, ClockError> {
        let physical = self.provider.physical_time();
        let local_time = self.timestamp.logical_time();
        let received_time = received.logical_time();

        if ntp_order(physical, received_time).is_gt() && ntp_order(physical, local_time).is_gt() {
            self.timestamp = HybridTimestamp::new(physical, 0);
        } else if ntp_order(received_time, local_time).is_gt() {
            self.timestamp =
                HybridTimestamp::new(received_time, self.bump_counter(self.timestamp.logical_counter())?);
        } else if ntp_order(local_time, received_time).is_gt() {
            self.timestamp = self.bump(self.timestamp.logical_counter())?;
        } else {
            let base = self.timestamp.logical_counter().max(received.logical_counter());
            self.timestamp = self.bump(base)?;
        }
        Ok(self.timestamp)
    }

    fn bump(&self, counter: u64) -> Result<HybridTimestamp, ClockError> {
        Ok(HybridTimestamp::new(
            self.timestamp.logical_time(),
            self.bump_counter(counter)?,
        ))
    }

    fn bump_counter(&self, counter: u64) -> Result<u64, ClockError> {
        if counter >= u64::from(u16::MAX) {
            return Err(ClockError::CounterOverflow {
                logical_time: self.timestamp.logical_time(),
            });
        }
        Ok(counter + 1)
    }
}

impl core::fmt::Debug for HybridClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HybridClock")
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeProvider;
    use proptest::prelude::*;

    fn clock_at(time: u64) -> (Arc<ManualTimeProvider>, HybridClock) {
        let provider = Arc::new(ManualTimeProvider::starting_at(time));
        let clock = HybridClock::new(provider.clone());
        (provider, clock)
    }

    #[test]
    fn adopts_physical_time_then_counts_then_survives_backward_clock() {
        let (provider, mut clock) = clock_at(1 << 32);

        let ts = clock.update().unwrap();
        assert_eq!(ts.logical_time(), 1 << 32);
        assert_eq!(ts.logical_counter(), 0);

        // clock didn't move
        let ts = clock.update().unwrap();
        assert_eq!(ts.logical_time(), 1 << 32);
        assert_eq!(ts.logical_counter(), 1);

        // clock moved back
        provider.set(1);
        let ts = clock.update().unwrap();
        assert_eq!(ts.logical_time(), 1 << 32);
        assert_eq!(ts.logical_counter(), 2);

        // clock moved ahead
        provider.set(2 << 32);
        let ts = clock.update().unwrap();
        assert_eq!(ts.logical_time(), 2 << 32);
        assert_eq!(ts.logical_counter(), 0);
    }

    #[test]
    fn received_timestamp_is_always_dominated() {
        let (_, mut clock) = clock_at(1 << 32);
        let local = clock.update().unwrap();

        let received = HybridTimestamp::new(9 << 32, 41);
        let result = clock.update_received(received).unwrap();

        assert!(result > received);
        assert!(result > local);
        assert_eq!(result.logical_counter(), 42);
    }

    #[test]
    fn equal_logical_times_take_the_larger_counter() {
        let (_, mut clock) = clock_at(3 << 32);
        clock.update().unwrap();

        let received = HybridTimestamp::new(3 << 32, 10);
        let result = clock.update_received(received).unwrap();

        assert_eq!(result.logical_time(), 3 << 32);
        assert_eq!(result.logical_counter(), 11);
    }

    #[test]
    fn physical_time_ahead_of_both_resets_the_counter() {
        let (provider, mut clock) = clock_at(1 << 32);
        clock.update().unwrap();
        clock.update().unwrap();

        provider.set(5 << 32);
        let result = clock
            .update_received(HybridTimestamp::new(2 << 32, 7))
            .unwrap();

        assert_eq!(result.logical_time(), 5 << 32);
        assert_eq!(result.logical_counter(), 0);
    }

    #[test]
    fn counter_overflow_is_an_error_not_a_wraparound() {
        let (_, mut clock) = clock_at(1 << 32);
        for _ in 0..=u16::MAX as u32 {
            clock.update().unwrap();
        }
        assert!(matches!(
            clock.update(),
            Err(ClockError::CounterOverflow { .. })
        ));
    }

    proptest! {
        // Local updates are strictly increasing for any non-decreasing
        // sequence of physical readings.
        #[test]
        fn local_updates_strictly_increase(mut steps in proptest::collection::vec(0u64..1 << 40, 1..64)) {
            steps.sort_unstable();
            let (provider, mut clock) = clock_at(0);

            let mut previous = None;
            for step in steps {
                provider.set(step);
                let ts = clock.update().unwrap();
                if let Some(prev) = previous {
                    prop_assert!(ts > prev);
                }
                previous = Some(ts);
            }
        }
    }
}
