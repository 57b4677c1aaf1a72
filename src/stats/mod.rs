//! Per FeedSet traffic statistics and speed measurement

use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::constants::TS_PACKET_SIZE;

/// Counts packets and reports the input rate every `interval` packets
#[derive(Debug)]
pub struct SpeedMeter {
    interval: u64,
    pkts: u64,
    last: Option<Instant>,
    last_kbps: Option<u64>,
}

impl SpeedMeter {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            pkts: 0,
            last: None,
            last_kbps: None,
        }
    }

    /// Registers one packet; returns the freshly measured rate (Kbit/s, 1024 basis)
    /// when an interval completes.
    pub fn tick(&mut self, now: Instant) -> Option<u64> {
        self.pkts += 1;
        if self.pkts % self.interval != 0 {
            return None;
        }
        let mut measured = None;
        if let Some(last) = self.last {
            let bits = self.pkts * TS_PACKET_SIZE as u64 * 8;
            let kbits = 1000 * (bits / 1024);
            let ms = now.duration_since(last).as_millis() as u64;
            if ms != 0 {
                measured = Some(kbits / ms);
                self.last_kbps = measured;
            }
        }
        self.last = Some(now);
        self.pkts = 0;
        measured
    }

    pub fn last_kbps(&self) -> Option<u64> {
        self.last_kbps
    }
}

/// Counters kept by every FeedSet
#[derive(Debug, Default, Clone, Serialize)]
pub struct FeedSetCounters {
    pub packets: u64,
    pub transport_errors: u64,
    pub continuity_errors: u64,
}

/// Counters kept by every de-embedded stream
#[derive(Debug, Default, Clone, Serialize)]
pub struct StreamCounters {
    pub frames: u64,
    pub header_crc_errors: u64,
    pub resyncs: u64,
    pub packet_crc_errors: u64,
    pub packets_delivered: u64,
    pub packets_dropped: u64,
}

/// Snapshot of one FeedSet for reports
#[derive(Debug, Clone, Serialize)]
pub struct FeedSetStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isi: Option<u8>,
    pub feeds: usize,
    pub stages: usize,
    #[serde(flatten)]
    pub counters: FeedSetCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kbps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamCounters>,
}

/// Logs a measured rate
pub fn report_speed(carrier_pid: Option<u16>, isi: Option<u8>, kbps: u64) {
    info!(
        target: "mpegts_demux::speedcheck",
        carrier_pid = ?carrier_pid,
        isi = ?isi,
        "TS speed {kbps} Kbits/sec"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reports_once_per_interval_after_first() {
        let mut meter = SpeedMeter::new(10);
        let t0 = Instant::now();
        for _ in 0..10 {
            assert_eq!(meter.tick(t0), None);
        }
        // second interval: 10 packets in 1 s
        let t1 = t0 + Duration::from_secs(1);
        let mut got = None;
        for _ in 0..10 {
            got = got.or(meter.tick(t1));
        }
        // 10 * 188 * 8 = 15040 bits -> 1000 * (15040 / 1024) = 14000 -> / 1000 ms
        assert_eq!(got, Some(14));
        assert_eq!(meter.last_kbps(), Some(14));
    }
}
