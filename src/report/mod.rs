//! JSON snapshot printed by the monitor

use std::collections::BTreeMap;

use serde::Serialize;

use crate::psi::PatSection;
use crate::stats::FeedSetStats;
use crate::types::{BufferFlags, Census};

/// What the monitor's callbacks have seen on one PID
#[derive(Debug, Default, Clone, Serialize)]
pub struct PidCounters {
    pub units: u64,
    pub bytes: u64,
    pub tei: u64,
    pub cc_mismatch: u64,
    pub discontinuities: u64,
    pub crc_discards: u64,
}

impl PidCounters {
    pub fn record(&mut self, len: usize, flags: BufferFlags) {
        self.units += 1;
        self.bytes += len as u64;
        if flags.contains(BufferFlags::TEI) {
            self.tei += 1;
        }
        if flags.contains(BufferFlags::PKT_COUNTER_MISMATCH) {
            self.cc_mismatch += 1;
        }
        if flags.intersects(BufferFlags::DISCONTINUITY_DETECTED | BufferFlags::DISCONTINUITY_INDICATOR) {
            self.discontinuities += 1;
        }
        if flags.contains(BufferFlags::HAD_CRC32_DISCARD) {
            self.crc_discards += 1;
        }
    }
}

#[derive(Serialize)]
struct SetJson<'a> {
    name: String,
    #[serde(flatten)]
    stats: &'a FeedSetStats,
}

#[derive(Serialize)]
struct ReportJson<'a> {
    ts_time: String,
    census: Census,
    feed_sets: Vec<SetJson<'a>>,
    pids: BTreeMap<String, &'a PidCounters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pat: Option<&'a PatSection>,
}

/// Report generator for the monitor
pub struct Reporter;

impl Reporter {
    /// Pretty-printed JSON for CLI output
    pub fn generate_json_report(
        census: Census,
        sets: &[FeedSetStats],
        pids: &BTreeMap<u16, PidCounters>,
        pat: Option<&PatSection>,
    ) -> String {
        let feed_sets = sets
            .iter()
            .map(|stats| SetJson {
                name: match (stats.carrier_pid, stats.isi) {
                    (Some(pid), Some(isi)) => format!("pid 0x{pid:04X} isi {isi}"),
                    _ => "physical".to_string(),
                },
                stats,
            })
            .collect();
        let rep = ReportJson {
            ts_time: chrono::Utc::now().to_rfc3339(),
            census,
            feed_sets,
            pids: pids.iter().map(|(pid, c)| (format!("0x{pid:04X}"), c)).collect(),
            pat,
        };
        serde_json::to_string_pretty(&rep)
            .unwrap_or_else(|_| "{\"error\": \"JSON serialization failed\"}".to_string())
    }
}
