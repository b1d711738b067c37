//! Transfer-speed meter (§4.3, L3): a sliding window of one-second byte
//! counters returning a smoothed bytes-per-second value.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Number of closed one-second slots retained besides the current one.
const RING_SIZE: usize = 31;

struct Slot {
    start: Instant,
    bytes: u64,
}

struct Inner {
    slots: VecDeque<Slot>,
    last_activity: Instant,
}

/// Ring of `N = 31` one-second slots plus the current (open) slot.
/// Concurrent access is serialised by a short lock, matching §4.3 and
/// §5's "one critical section per meter; O(1) work per call".
pub struct SpeedMeter {
    inner: Mutex<Inner>,
}

impl SpeedMeter {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            inner: Mutex::new(Inner {
                slots: VecDeque::from([Slot { start: now, bytes: 0 }]),
                last_activity: now,
            }),
        }
    }

    /// Reset the ring to "one active empty slot starting now" — called
    /// when a data connection (re)connects.
    pub fn just_connected(&self) {
        let now = Instant::now();
        let mut g = self.inner.lock().unwrap();
        g.slots.clear();
        g.slots.push_back(Slot { start: now, bytes: 0 });
        g.last_activity = now;
    }

    /// Record `n` bytes written/read at the current instant, advancing the
    /// ring if a 1-second boundary has passed. Empty intervening slots are
    /// fast-forwarded (dropped, since they'd contribute zero bytes) rather
    /// than materialised, up to `RING_SIZE` total slots retained.
    pub fn on_write(&self, n: u64) {
        let now = Instant::now();
        let mut g = self.inner.lock().unwrap();
        g.last_activity = now;

        let needs_new_slot = g
            .slots
            .back()
            .map(|s| now.duration_since(s.start) >= Duration::from_secs(1))
            .unwrap_or(true);

        if needs_new_slot {
            g.slots.push_back(Slot { start: now, bytes: 0 });
            while g.slots.len() > RING_SIZE + 1 {
                g.slots.pop_front();
            }
        }

        if let Some(slot) = g.slots.back_mut() {
            slot.bytes += n;
        }
    }

    /// Sum all closed slots and the partial open slot, divide by elapsed
    /// milliseconds, return bytes-per-second.
    pub fn get_speed(&self) -> f64 {
        let g = self.inner.lock().unwrap();
        let Some(first) = g.slots.front() else {
            return 0.0;
        };
        let total_bytes: u64 = g.slots.iter().map(|s| s.bytes).sum();
        let elapsed_ms = Instant::now().duration_since(first.start).as_millis().max(1) as f64;
        (total_bytes as f64) / (elapsed_ms / 1000.0)
    }

    /// Seconds since the last `on_write` call — used by the no-data-transfer
    /// watchdog (§4.1).
    pub fn idle_seconds(&self) -> f64 {
        let g = self.inner.lock().unwrap();
        Instant::now().duration_since(g.last_activity).as_secs_f64()
    }
}

impl Default for SpeedMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let m = SpeedMeter::new();
        assert_eq!(m.get_speed(), 0.0);
    }

    #[test]
    fn accumulates_bytes() {
        let m = SpeedMeter::new();
        m.on_write(1024);
        assert!(m.get_speed() > 0.0);
    }

    #[test]
    fn reconnect_resets_ring() {
        let m = SpeedMeter::new();
        m.on_write(4096);
        m.just_connected();
        assert_eq!(m.get_speed(), 0.0);
    }
}
