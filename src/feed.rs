//! Output feeds: one subscriber's filter state and its delivery path.

use tracing::debug;

use crate::constants::{PESLEN_RESET, PID_FULL_STREAM};
use crate::packet::TsHeader;
use crate::psi::{SectionAssembler, SectionFilter, SectionSink};
use crate::types::{
    BufferFlags, FeedId, FeedInfo, FeedKind, FeedSetId, FeedState, FilterId, PesType,
    SectionCallback, TsCallback, TsType,
};

/// Hooks reached from the hot path.
pub struct DemuxHooks {
    /// Sink for feeds flagged [`TsType::DECODER`].
    pub write_to_decoder: Option<Box<dyn FnMut(&FeedInfo, &[u8]) + Send>>,
    /// CRC over a whole section, trailing CRC included; 0 means intact.
    pub check_crc32: fn(&[u8]) -> u32,
    pub memcopy: fn(&mut [u8], &[u8]),
}

fn copy_bytes(dst: &mut [u8], src: &[u8]) {
    dst.copy_from_slice(src);
}

impl Default for DemuxHooks {
    fn default() -> Self {
        Self {
            write_to_decoder: None,
            check_crc32: crate::psi::crc32_mpeg,
            memcopy: copy_bytes,
        }
    }
}

pub(crate) enum FeedBody {
    Ts {
        ts_type: TsType,
        pes_type: PesType,
        cc: Option<u8>,
        peslen: u16,
        callback: TsCallback,
    },
    Section {
        check_crc: bool,
        assembler: SectionAssembler,
        filters: Vec<SectionFilter>,
        callback: SectionCallback,
    },
}

pub(crate) struct OutputFeed {
    pub id: FeedId,
    pub pid: u16,
    pub set: FeedSetId,
    pub state: FeedState,
    pub filtering: bool,
    pub flags: BufferFlags,
    pub body: FeedBody,
}

/// Delivery side of a section feed, borrowed apart from its assembler.
struct SectionDelivery<'a> {
    flags: &'a mut BufferFlags,
    filters: &'a [SectionFilter],
    callback: &'a mut SectionCallback,
    check_crc: bool,
    check_crc32: fn(&[u8]) -> u32,
}

impl SectionSink for SectionDelivery<'_> {
    fn set_flags(&mut self, flags: BufferFlags) {
        *self.flags |= flags;
    }

    fn deliver(&mut self, section: &[u8]) {
        if self.check_crc {
            let syntax_indicator = section[1] & 0x80 != 0;
            if syntax_indicator && (self.check_crc32)(section) != 0 {
                *self.flags |= BufferFlags::HAD_CRC32_DISCARD;
                debug!(table_id = section[0], len = section.len(), "section CRC mismatch, discarded");
                return;
            }
        }
        for filter in self.filters {
            if filter.matches(section) {
                let flags = std::mem::take(self.flags);
                (self.callback)(section, filter.id, flags);
            }
        }
    }
}

impl OutputFeed {
    pub fn kind(&self) -> FeedKind {
        match &self.body {
            FeedBody::Ts { ts_type, .. } if ts_type.contains(TsType::PAYLOAD_ONLY) => {
                FeedKind::PayloadOnly
            }
            FeedBody::Ts { .. } => FeedKind::Raw,
            FeedBody::Section { .. } => FeedKind::Section,
        }
    }

    pub fn info(&self) -> FeedInfo {
        let (ts_type, pes_type) = match &self.body {
            FeedBody::Ts { ts_type, pes_type, .. } => (*ts_type, *pes_type),
            FeedBody::Section { .. } => (TsType::empty(), PesType::Other),
        };
        FeedInfo {
            id: self.id,
            feed_set: self.set,
            pid: self.pid,
            kind: self.kind(),
            ts_type,
            pes_type,
        }
    }

    pub fn matches_pid(&self, pid: u16) -> bool {
        self.pid == pid || self.pid == PID_FULL_STREAM
    }

    /// Recording feed: whole packets, not consumed by a further demux layer.
    /// Such a packet goes to the first of these feeds only.
    pub fn is_dvr(&self) -> bool {
        match &self.body {
            FeedBody::Ts { ts_type, .. } => {
                self.filtering && (*ts_type & (TsType::PACKET | TsType::DEMUX)) == TsType::PACKET
            }
            FeedBody::Section { .. } => false,
        }
    }

    /// Hands a whole packet to a full-stream feed.
    pub fn deliver_raw(&mut self, data: &[u8]) {
        if !self.filtering {
            return;
        }
        if let FeedBody::Ts { callback, .. } = &mut self.body {
            let flags = std::mem::take(&mut self.flags);
            callback(data, flags);
        }
    }

    /// Processes a packet whose PID equals the feed's PID.
    pub fn handle_packet(&mut self, hdr: &TsHeader<'_>, hooks: &mut DemuxHooks) {
        if !self.filtering {
            return;
        }
        let info = match &self.body {
            FeedBody::Ts { ts_type, .. } if ts_type.contains(TsType::DECODER) => Some(self.info()),
            _ => None,
        };
        match &mut self.body {
            FeedBody::Ts {
                ts_type,
                cc,
                peslen,
                callback,
                ..
            } => {
                if ts_type.contains(TsType::PACKET) {
                    if ts_type.contains(TsType::PAYLOAD_ONLY) {
                        deliver_payload(hdr, cc, peslen, &mut self.flags, callback);
                    } else {
                        let flags = std::mem::take(&mut self.flags);
                        callback(hdr.raw(), flags);
                    }
                }
                if let (Some(info), Some(sink)) = (info, hooks.write_to_decoder.as_mut()) {
                    sink(&info, hdr.raw());
                }
            }
            FeedBody::Section {
                check_crc,
                assembler,
                filters,
                callback,
            } => {
                let mut sink = SectionDelivery {
                    flags: &mut self.flags,
                    filters,
                    callback,
                    check_crc: *check_crc,
                    check_crc32: hooks.check_crc32,
                };
                assembler.push_packet(hdr, hooks.memcopy, &mut sink);
            }
        }
    }

    /// Resets per-feed reassembly state and pending flags before filtering
    /// starts.
    pub fn prepare_start(&mut self) {
        self.flags = BufferFlags::empty();
        match &mut self.body {
            FeedBody::Ts { cc, peslen, .. } => {
                *cc = None;
                *peslen = PESLEN_RESET;
            }
            FeedBody::Section { assembler, .. } => assembler.reset(),
        }
    }

    pub fn filter_count(&self) -> usize {
        match &self.body {
            FeedBody::Section { filters, .. } => filters.len(),
            FeedBody::Ts { .. } => 0,
        }
    }

    pub fn filter_ids(&self) -> Vec<FilterId> {
        match &self.body {
            FeedBody::Section { filters, .. } => filters.iter().map(|f| f.id).collect(),
            FeedBody::Ts { .. } => Vec::new(),
        }
    }
}

fn deliver_payload(
    hdr: &TsHeader<'_>,
    cc: &mut Option<u8>,
    peslen: &mut u16,
    flags: &mut BufferFlags,
    callback: &mut TsCallback,
) {
    let count = hdr.payload_len();
    if count == 0 {
        return;
    }
    let counter = hdr.continuity_counter();
    let cc_ok = cc.is_none_or(|prev| (prev + 1) & 0x0F == counter);
    *cc = Some(counter);
    if !cc_ok {
        *flags |= BufferFlags::DISCONTINUITY_DETECTED;
        debug!(pid = hdr.pid(), cc = counter, "payload discontinuity");
    }
    if hdr.payload_unit_start() {
        *peslen = PESLEN_RESET;
    }
    *peslen = peslen.wrapping_add(count as u16);

    let flags = std::mem::take(flags);
    callback(hdr.payload(), flags);
}
