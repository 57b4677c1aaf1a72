use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_FEED_NUM, DEFAULT_FILTER_NUM, SPEED_PKTS_INTERVAL};

/// Demux instance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxConfig {
    /// Feed pool capacity
    pub feed_num: usize,
    /// Section filter pool capacity
    pub filter_num: usize,
    /// Per-PID continuity check
    pub tscheck: bool,
    /// Deliver packets with the transport error indicator set
    pub feed_err_pkts: bool,
    /// Periodic input rate report
    pub speedcheck: bool,
    pub speed_pkts_interval: u64,
    /// CRC check on section feeds opened by the CLI
    pub check_crc: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            feed_num: DEFAULT_FEED_NUM,
            filter_num: DEFAULT_FILTER_NUM,
            tscheck: true,
            feed_err_pkts: true,
            speedcheck: false,
            speed_pkts_interval: SPEED_PKTS_INTERVAL,
            check_crc: true,
        }
    }
}

impl DemuxConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = DemuxConfig::from_json_str(r#"{ "feed_num": 8, "speedcheck": true }"#).unwrap();
        assert_eq!(cfg.feed_num, 8);
        assert!(cfg.speedcheck);
        assert_eq!(cfg.filter_num, DEFAULT_FILTER_NUM);
        assert!(cfg.tscheck);
        assert_eq!(cfg.speed_pkts_interval, SPEED_PKTS_INTERVAL);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(DemuxConfig::from_json_str("{ feed_num: }").is_err());
    }
}
