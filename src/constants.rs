//! Constants for MPEG-TS demultiplexing and BBFRAME de-embedding

/// MPEG-TS packet constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_PACKET_SIZE_204: usize = 204;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_SYNC_BYTE_204: u8 = 0xB8; // first byte of an inverted-sync 204 B packet
pub const TS_HEADER_SIZE: usize = 4;

/// PID space
pub const MAX_PID: u16 = 0x1FFF;
pub const PID_SPACE: usize = MAX_PID as usize + 1;
pub const PID_NULL: u16 = 0x1FFF;
/// Feed PID meaning "every packet of the stream"
pub const PID_FULL_STREAM: u16 = 0x2000;

/// Continuity table sentinel ("never seen")
pub const CC_UNSET: u8 = 0xFF;

/// Section constants
pub const MAX_SECTION_SIZE: usize = 4096;
pub const MAX_SECFEED_SIZE: usize = MAX_SECTION_SIZE + TS_PACKET_SIZE;
pub const SECTION_PADDING: u8 = 0xFF;
pub const DEMUX_MASK_MAX: usize = 18;

/// PES length accumulator reset value
pub const PESLEN_RESET: u16 = 0xFFFA;

/// BBFRAME-in-TS layout (byte offsets into the 188 B carrier packet)
pub const BB_MARKER_OFFSET: usize = 8;
pub const BB_HEADER_MARKER: u8 = 0xB8;
pub const BB_HEADER_OFFSET: usize = 9;
pub const BB_HEADER_LEN: usize = 10;
pub const BB_HEADER_DATA_OFFSET: usize = BB_HEADER_OFFSET + BB_HEADER_LEN;
pub const BB_CONTINUATION_DATA_OFFSET: usize = BB_MARKER_OFFSET + 1;
/// SYNCD value meaning "no user packet starts in this data field"
pub const BB_SYNCD_NONE: u16 = 0xFFFF;

/// Speed check
pub const SPEED_PKTS_INTERVAL: u64 = 50_000;

/// Default pool sizes
pub const DEFAULT_FEED_NUM: usize = 256;
pub const DEFAULT_FILTER_NUM: usize = 256;
