//! Feed Sets: dispatch contexts for the physical transport stream and for
//! every de-embedded inner stream.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::constants::{CC_UNSET, PID_NULL, PID_SPACE};
use crate::packet::TsHeader;
use crate::stats::{FeedSetCounters, SpeedMeter};
use crate::types::{FeedId, StageId, StreamHandle};

/// Outcome of the continuity/error check for one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PacketCheck {
    Ok,
    TransportError,
    ContinuityError,
}

impl PacketCheck {
    pub fn is_err(self) -> bool {
        self != PacketCheck::Ok
    }
}

pub(crate) struct FeedSet {
    /// `None` for the physical context
    pub carrier_pid: Option<u16>,
    pub isi: Option<u8>,
    /// insertion order is delivery order
    pub feeds: Vec<FeedId>,
    pub stages: HashMap<u16, StageId>,
    cc_table: Box<[u8; PID_SPACE]>,
    pub speed: SpeedMeter,
    pub counters: FeedSetCounters,
    pub refs: u32,
    /// stream this set is the destination of
    pub owner: Option<StreamHandle>,
}

impl FeedSet {
    pub fn new(carrier_pid: Option<u16>, isi: Option<u8>, speed_interval: u64) -> Self {
        Self {
            carrier_pid,
            isi,
            feeds: Vec::new(),
            stages: HashMap::new(),
            cc_table: Box::new([CC_UNSET; PID_SPACE]),
            speed: SpeedMeter::new(speed_interval),
            counters: FeedSetCounters::default(),
            refs: 0,
            owner: None,
        }
    }

    /// Speed accounting; returns a fresh Kbit/s figure once per interval.
    pub fn count_packet(&mut self, speedcheck: bool) -> Option<u64> {
        self.counters.packets += 1;
        if speedcheck {
            self.speed.tick(Instant::now())
        } else {
            None
        }
    }

    /// TEI and continuity check against the per-PID table.
    pub fn check_packet(&mut self, hdr: &TsHeader<'_>, tscheck: bool) -> PacketCheck {
        let pid = hdr.pid();
        if hdr.transport_error() {
            self.counters.transport_errors += 1;
            debug!(target: "mpegts_demux::tscheck", pid, "TEI detected");
            return PacketCheck::TransportError;
        }
        if !tscheck || pid == PID_NULL {
            return PacketCheck::Ok;
        }

        let cc = hdr.continuity_counter();
        let slot = &mut self.cc_table[pid as usize];
        if *slot == CC_UNSET {
            *slot = cc;
            return PacketCheck::Ok;
        }
        if hdr.has_payload() {
            *slot = (*slot + 1) & 0x0F;
        }
        if *slot != cc {
            debug!(
                target: "mpegts_demux::tscheck",
                pid,
                expected = *slot,
                got = cc,
                "TS packet counter mismatch"
            );
            *slot = cc;
            self.counters.continuity_errors += 1;
            return PacketCheck::ContinuityError;
        }
        PacketCheck::Ok
    }
}
