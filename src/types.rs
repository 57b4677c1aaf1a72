use bitflags::bitflags;
use serde::Serialize;

use crate::arena::Key;

/// Handle of a FeedSet dispatch context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedSetId(pub(crate) Key);

/// Handle of an Output Feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedId(pub(crate) Key);

/// Handle of a de-embedded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub(crate) Key);

/// Handle of a de-embedding stage (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StageId(pub(crate) Key);

/// Identifies one section filter of a section feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FilterId(pub u32);

bitflags! {
    /// Anomalies attached to the next unit delivered by a feed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct BufferFlags: u32 {
        const HAD_CRC32_DISCARD       = 1 << 0;
        const TEI                     = 1 << 1;
        const PKT_COUNTER_MISMATCH    = 1 << 2;
        const DISCONTINUITY_DETECTED  = 1 << 3;
        const DISCONTINUITY_INDICATOR = 1 << 4;
    }
}

bitflags! {
    /// What a TS feed does with a matching packet
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TsType: u8 {
        /// deliver to the callback
        const PACKET       = 1 << 0;
        /// strip the TS header before delivery
        const PAYLOAD_ONLY = 1 << 1;
        /// forward to the decoder sink
        const DECODER      = 1 << 2;
        /// feed is consumed by a demux layer, not a recorder
        const DEMUX        = 1 << 3;
    }
}

/// Decoder PES slot of a TS feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PesType {
    Audio0,
    Video0,
    Teletext0,
    Subtitle0,
    Pcr0,
    Audio1,
    Video1,
    Teletext1,
    Subtitle1,
    Pcr1,
    Audio2,
    Video2,
    Teletext2,
    Subtitle2,
    Pcr2,
    Audio3,
    Video3,
    Teletext3,
    Subtitle3,
    Pcr3,
    Other,
}

impl PesType {
    pub const DECODER_SLOTS: usize = 20;

    /// Decoder slot index, `None` for [`PesType::Other`]
    pub fn slot(self) -> Option<usize> {
        match self {
            PesType::Other => None,
            p => Some(p as usize),
        }
    }
}

/// Lifecycle of an Output Feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum FeedState {
    Free,
    Allocated,
    Ready,
    Go,
}

/// The three Output Feed kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedKind {
    /// whole 188 B packets
    Raw,
    /// payload bytes only
    PayloadOnly,
    /// reassembled sections
    Section,
}

/// Description of a feed handed to the frontend collaborator
#[derive(Debug, Clone)]
pub struct FeedInfo {
    pub id: FeedId,
    pub feed_set: FeedSetId,
    pub pid: u16,
    pub kind: FeedKind,
    pub ts_type: TsType,
    pub pes_type: PesType,
}

/// Callback receiving packets or payload fragments
pub type TsCallback = Box<dyn FnMut(&[u8], BufferFlags) + Send>;

/// Callback receiving complete sections
pub type SectionCallback = Box<dyn FnMut(&[u8], FilterId, BufferFlags) + Send>;

/// Live-object and teardown counters of a demux graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Census {
    pub feed_sets: usize,
    pub stages: usize,
    pub streams: usize,
    pub feeds: usize,
    pub feed_set_teardowns: u64,
    pub stage_teardowns: u64,
    pub stream_teardowns: u64,
}
