//! Hybrid logical timestamps.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A hybrid logical clock timestamp: `(logical_time, logical_counter)`.
///
/// `logical_time` carries the same 64-bit shape as an NTP timestamp: 32-bit
/// seconds in the high half, 32-bit sub-second fraction in the low half. Two
/// timestamps compare by seconds, then fraction, then `logical_counter`.
///
/// The counter breaks ties between timestamps drawn within the same physical
/// tick, so events produced by one clock instance are strictly ordered even
/// when the wall clock stalls or moves backward.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HybridTimestamp {
    logical_time: u64,
    logical_counter: u64,
}

impl HybridTimestamp {
    /// The origin timestamp, smaller than anything a running clock produces.
    pub const ZERO: HybridTimestamp = HybridTimestamp {
        logical_time: 0,
        logical_counter: 0,
    };

    pub fn new(logical_time: u64, logical_counter: u64) -> Self {
        Self {
            logical_time,
            logical_counter,
        }
    }

    pub fn logical_time(&self) -> u64 {
        self.logical_time
    }

    pub fn logical_counter(&self) -> u64 {
        self.logical_counter
    }

    /// NTP-era seconds of the logical time.
    pub fn seconds(&self) -> u32 {
        (self.logical_time >> 32) as u32
    }

    /// Sub-second fraction of the logical time.
    pub fn fraction(&self) -> u32 {
        self.logical_time as u32
    }

    /// 64-bit wire form: upper 48 bits of the logical time packed with the
    /// low 16 bits of the logical counter.
    ///
    /// Counters above `u16::MAX` do not fit this form; the clock refuses to
    /// produce them (see `chronicle-hlc`).
    pub fn pack(&self) -> u64 {
        (self.logical_time >> 16 << 16) | (self.logical_counter & 0xffff)
    }

    /// Inverse of [`pack`](Self::pack). The low 16 bits of the logical time
    /// are not representable on the wire and come back as zero.
    pub fn unpack(packed: u64) -> Self {
        Self {
            logical_time: packed >> 16 << 16,
            logical_counter: packed & 0xffff,
        }
    }
}

/// Compares two NTP-shaped 64-bit times, seconds first, then fraction.
pub fn ntp_order(t1: u64, t2: u64) -> Ordering {
    let (s1, f1) = ((t1 >> 32) as u32, t1 as u32);
    let (s2, f2) = ((t2 >> 32) as u32, t2 as u32);
    s1.cmp(&s2).then(f1.cmp(&f2))
}

impl Ord for HybridTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        ntp_order(self.logical_time, other.logical_time)
            .then(self.logical_counter.cmp(&other.logical_counter))
    }
}

impl PartialOrd for HybridTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl core::fmt::Display for HybridTimestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}.{:010}@{}",
            self.seconds(),
            self.fraction(),
            self.logical_counter
        )
    }
}
