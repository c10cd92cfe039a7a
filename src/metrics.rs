use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

/// Minimum Ethernet frame size in bytes.
pub const MIN_FRAME_BYTES: u64 = 64;
/// Header and checksum bytes counted inside `MIN_FRAME_BYTES`.
pub const FRAME_OVERHEAD_BYTES: u64 = 18;
/// Line bits per byte used for the utilization estimate.
pub const LINE_BITS_PER_BYTE: u64 = 10;

pub const DEFAULT_WINDOW_SECONDS: usize = 10;
pub const DEFAULT_LINK_CAPACITY_BPS: u64 = 10_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateConfig {
    pub window_seconds: usize,
    pub link_capacity_bps: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
            link_capacity_bps: DEFAULT_LINK_CAPACITY_BPS,
        }
    }
}

/// A payload that differs from the one carried by the previous event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadChange {
    pub payload: Bytes,
    pub len: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub total_count: u64,
    pub elapsed: u64,
    pub packet_rate: u64,
    pub byte_rate: u64,
    pub utilization: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub change: Option<PayloadChange>,
    pub status: Status,
}

/// On-wire size of a frame carrying `payload_len` bytes of UDP payload.
pub fn bytes_per_packet(payload_len: usize) -> u64 {
    (MIN_FRAME_BYTES - FRAME_OVERHEAD_BYTES) + payload_len as u64
}

/// Percentage of `link_capacity_bps` used by `byte_rate`, rounded to nearest.
pub fn utilization_percent(byte_rate: u64, link_capacity_bps: u64) -> u64 {
    if link_capacity_bps == 0 {
        return 0;
    }
    let scaled = byte_rate.saturating_mul(100 * LINE_BITS_PER_BYTE);
    scaled.saturating_add(link_capacity_bps / 2) / link_capacity_bps
}

/// Rolling per-second packet counter over a circular window of `W` slots.
///
/// Rates are snapshotted only when an event lands in a different slot than the
/// previous one, so `Status::packet_rate` always describes the last completed
/// second rather than the partial one in progress. The event that crosses a
/// boundary resets the entered slot and is not counted into it.
pub struct RateEstimator {
    config: RateConfig,
    histogram: Vec<u64>,
    current_slot: usize,
    total_count: u64,
    start: Duration,
    last_payload: Option<Bytes>,
    bytes_per_packet: u64,
    packet_rate: u64,
    byte_rate: u64,
}

impl RateEstimator {
    pub fn new(config: RateConfig) -> Self {
        Self::starting_at(config, Duration::ZERO)
    }

    /// Estimator whose elapsed time is measured from `start` on the source clock.
    pub fn starting_at(config: RateConfig, start: Duration) -> Self {
        let window = config.window_seconds.max(1);
        Self {
            config: RateConfig { window_seconds: window, ..config },
            histogram: vec![0; window],
            current_slot: 0,
            total_count: 0,
            start,
            last_payload: None,
            bytes_per_packet: 0,
            packet_rate: 0,
            byte_rate: 0,
        }
    }

    pub fn on_event(&mut self, payload: Bytes, received_at: Duration) -> Update {
        let change = if self.last_payload.as_ref() != Some(&payload) {
            self.bytes_per_packet = bytes_per_packet(payload.len());
            let change = PayloadChange { len: payload.len(), payload: payload.clone() };
            self.last_payload = Some(payload);
            Some(change)
        } else {
            None
        };

        self.total_count += 1;

        let elapsed = received_at.saturating_sub(self.start).as_secs();
        let slot = (elapsed % self.histogram.len() as u64) as usize;
        if slot != self.current_slot {
            self.packet_rate = self.histogram[self.current_slot];
            self.byte_rate = self.packet_rate * self.bytes_per_packet;
            self.histogram[slot] = 0;
            self.current_slot = slot;
        } else {
            self.histogram[slot] += 1;
        }

        let status = Status {
            total_count: self.total_count,
            elapsed,
            packet_rate: self.packet_rate,
            byte_rate: self.byte_rate,
            utilization: utilization_percent(self.byte_rate, self.config.link_capacity_bps),
        };
        Update { change, status }
    }

    pub fn histogram(&self) -> &[u64] {
        &self.histogram
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn bytes_per_packet(&self) -> u64 {
        self.bytes_per_packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: f64) -> Duration {
        Duration::from_secs_f64(secs)
    }

    fn aaaa() -> Bytes {
        Bytes::from_static(b"AAAA")
    }

    #[test]
    fn rates_only_move_at_slot_boundaries() {
        let mut est = RateEstimator::new(RateConfig::default());
        for t in [0.1, 0.3, 0.9] {
            let u = est.on_event(aaaa(), at(t));
            assert_eq!(u.status.packet_rate, 0);
            assert_eq!(u.status.byte_rate, 0);
        }
        assert_eq!(est.histogram()[0], 3);

        let u = est.on_event(aaaa(), at(1.2));
        assert_eq!(u.status.packet_rate, 3);
        assert_eq!(est.bytes_per_packet(), 50);
        assert_eq!(u.status.byte_rate, 150);
        assert_eq!(u.status.utilization, 0);
        assert_eq!(u.status.elapsed, 1);
        assert_eq!(u.status.total_count, 4);

        // Further events inside slot 1 keep the snapshot.
        for t in [1.3, 1.5, 1.99] {
            let u = est.on_event(aaaa(), at(t));
            assert_eq!(u.status.packet_rate, 3);
            assert_eq!(u.status.byte_rate, 150);
        }
    }

    #[test]
    fn first_event_reports_zero_rates() {
        let mut est = RateEstimator::new(RateConfig::default());
        let u = est.on_event(aaaa(), at(0.0));
        assert_eq!(
            u.status,
            Status { total_count: 1, elapsed: 0, packet_rate: 0, byte_rate: 0, utilization: 0 }
        );
    }

    #[test]
    fn repeated_payload_notifies_once() {
        let mut est = RateEstimator::new(RateConfig::default());
        let first = est.on_event(aaaa(), at(0.1));
        assert_eq!(first.change, Some(PayloadChange { payload: aaaa(), len: 4 }));
        for t in [0.2, 0.3, 2.5] {
            assert!(est.on_event(aaaa(), at(t)).change.is_none());
        }
        assert_eq!(est.bytes_per_packet(), 50);
    }

    #[test]
    fn equal_length_payload_still_counts_as_change() {
        let mut est = RateEstimator::new(RateConfig::default());
        est.on_event(aaaa(), at(0.1));
        let u = est.on_event(Bytes::from_static(b"BBBB"), at(0.2));
        let change = u.change.expect("BBBB is a new payload");
        assert_eq!(&change.payload[..], b"BBBB");
        assert_eq!(change.len, 4);
        assert_eq!(est.bytes_per_packet(), 50);
        assert!(est.on_event(Bytes::from_static(b"BBBB"), at(0.3)).change.is_none());
    }

    #[test]
    fn change_detection_only_compares_with_previous_payload() {
        let mut est = RateEstimator::new(RateConfig::default());
        let seq: [&'static [u8]; 4] = [b"A", b"BB", b"A", b"A"];
        let changes: Vec<bool> = seq
            .iter()
            .enumerate()
            .map(|(i, p)| est.on_event(Bytes::from_static(p), at(i as f64 * 0.1)).change.is_some())
            .collect();
        assert_eq!(changes, vec![true, true, true, false]);
        assert_eq!(est.bytes_per_packet(), 47);
    }

    #[test]
    fn byte_rate_uses_bytes_per_packet_at_crossing_time() {
        let mut est = RateEstimator::new(RateConfig::default());
        est.on_event(Bytes::from_static(b"x"), at(0.1));
        est.on_event(Bytes::from_static(b"x"), at(0.2));
        // 10-byte payload arrives on the boundary event itself.
        let u = est.on_event(Bytes::from_static(b"0123456789"), at(1.0));
        assert_eq!(u.status.packet_rate, 2);
        assert_eq!(u.status.byte_rate, 2 * 56);
    }

    #[test]
    fn crossing_resets_only_the_entered_slot() {
        let mut est = RateEstimator::new(RateConfig::default());
        for s in 0..10u64 {
            for k in 0..3 {
                est.on_event(aaaa(), at(s as f64 + 0.1 * k as f64));
            }
        }
        let before = est.histogram().to_vec();
        assert_eq!(before, vec![3, 2, 2, 2, 2, 2, 2, 2, 2, 2]);

        // Jump from slot 9 straight to slot 3 of the next lap.
        est.on_event(aaaa(), at(13.5));
        let after = est.histogram();
        assert_eq!(est.current_slot(), 3);
        for (i, (b, a)) in before.iter().zip(after).enumerate() {
            if i == 3 {
                assert_eq!(*a, 0);
            } else {
                assert_eq!(a, b, "slot {i} changed");
            }
        }
    }

    #[test]
    fn slot_index_repeats_with_window_period() {
        let mut est = RateEstimator::new(RateConfig { window_seconds: 4, ..RateConfig::default() });
        let mut slots = Vec::new();
        for s in 0..12u64 {
            est.on_event(aaaa(), Duration::from_secs(s) + Duration::from_millis(500));
            slots.push(est.current_slot());
        }
        assert_eq!(slots, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn wrapped_slot_holds_only_latest_occupancy() {
        let mut est = RateEstimator::new(RateConfig::default());
        // Two events per second: the crossing event resets, the second counts.
        fn feed_second(est: &mut RateEstimator, s: u64) {
            est.on_event(aaaa(), at(s as f64 + 0.1));
            est.on_event(aaaa(), at(s as f64 + 0.6));
        }
        for s in 0..10 {
            feed_second(&mut est, s);
        }
        // Slot 0 was never crossed into, so both of its events counted.
        assert_eq!(est.histogram()[0], 2);

        for s in 10..20 {
            feed_second(&mut est, s);
        }
        // Read slot 0 just before it is revisited at t=20.1.
        assert_eq!(est.histogram()[0], 1);
        let u = est.on_event(aaaa(), at(20.1));
        assert_eq!(u.status.packet_rate, 1);
        assert_eq!(est.histogram()[0], 0);
    }

    #[test]
    fn one_event_per_second_never_accumulates_across_wraps() {
        let mut est = RateEstimator::new(RateConfig::default());
        for s in 0..10 {
            est.on_event(aaaa(), at(s as f64 + 0.5));
        }
        assert_eq!(est.histogram()[0], 1);
        for s in 10..20 {
            let u = est.on_event(aaaa(), at(s as f64 + 0.5));
            assert_eq!(u.status.packet_rate, 0);
        }
        assert_eq!(est.histogram()[0], 0);
        assert!(est.histogram().iter().all(|&c| c == 0));
    }

    #[test]
    fn elapsed_is_measured_from_start() {
        let mut est = RateEstimator::starting_at(RateConfig::default(), Duration::from_secs(100));
        let u = est.on_event(aaaa(), Duration::from_millis(103_700));
        assert_eq!(u.status.elapsed, 3);
        assert_eq!(est.current_slot(), 3);
        // Timestamps before start saturate to zero.
        let u = est.on_event(aaaa(), Duration::from_secs(50));
        assert_eq!(u.status.elapsed, 0);
    }

    #[test]
    fn utilization_is_rounded_per_mille_of_capacity() {
        assert_eq!(utilization_percent(0, 10_000_000), 0);
        assert_eq!(utilization_percent(150, 10_000_000), 0);
        assert_eq!(utilization_percent(4_999, 10_000_000), 0);
        assert_eq!(utilization_percent(5_000, 10_000_000), 1);
        assert_eq!(utilization_percent(1_000_000, 10_000_000), 100);
        assert_eq!(utilization_percent(15, 10_000), 2);
        assert_eq!(utilization_percent(123, 0), 0);

        let mut prev = 0;
        for byte_rate in (0..2_000_000).step_by(7_919) {
            let u = utilization_percent(byte_rate, 10_000_000);
            assert!(u >= prev);
            let expected = (1000.0 * byte_rate as f64 / 10_000_000.0).round() as u64;
            assert_eq!(u, expected);
            prev = u;
        }
    }

    #[test]
    fn utilization_follows_configured_capacity() {
        let mut est = RateEstimator::new(RateConfig { window_seconds: 10, link_capacity_bps: 100_000 });
        for t in [0.1, 0.2, 0.3, 0.4] {
            est.on_event(Bytes::from_static(&[0u8; 26]), at(t));
        }
        let u = est.on_event(Bytes::from_static(&[0u8; 26]), at(1.0));
        // 4 packets * 72 bytes = 288 B/s -> 2880 line bits of 100 kbit/s.
        assert_eq!(u.status.byte_rate, 288);
        assert_eq!(u.status.utilization, 3);
    }

    #[test]
    fn zero_window_is_clamped_to_one_slot() {
        let mut est = RateEstimator::new(RateConfig { window_seconds: 0, ..RateConfig::default() });
        assert_eq!(est.histogram().len(), 1);
        est.on_event(aaaa(), at(0.5));
        est.on_event(aaaa(), at(3.5));
        assert_eq!(est.histogram()[0], 2);
    }
}
