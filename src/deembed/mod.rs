//! BBFRAME de-embedding: inner transport streams carried as baseband frame
//! fragments inside the packets of a carrier PID.
//!
//! Byte 8 of a carrier packet tells header fragments (0xB8, BBHEADER from
//! byte 9) from continuation fragments (data from byte 9).

pub mod header;
pub(crate) mod stage;
pub(crate) mod stream;

pub use header::{crc8, BbHeader};
pub(crate) use stage::Stage;
pub(crate) use stream::{Stream, UserPacket};

use tracing::{trace, warn};

use crate::arena::Arena;
use crate::constants::{
    BB_CONTINUATION_DATA_OFFSET, BB_HEADER_DATA_OFFSET, BB_HEADER_MARKER, BB_HEADER_OFFSET,
    BB_MARKER_OFFSET,
};
use crate::types::FeedSetId;

/// Runs one carrier packet through its stage. Reconstructed packets are
/// appended to `out`; the returned FeedSet is where they belong.
pub(crate) fn process_carrier_packet(
    stage: &mut Stage,
    streams: &mut Arena<Stream>,
    pkt: &[u8],
    out: &mut Vec<UserPacket>,
) -> Option<FeedSetId> {
    if pkt[BB_MARKER_OFFSET] == BB_HEADER_MARKER {
        let hdr = BbHeader::parse(&pkt[BB_HEADER_OFFSET..])?;
        if !hdr.crc_ok {
            warn!(carrier_pid = stage.carrier_pid, isi = hdr.isi, "BBHEADER CRC mismatch");
        }
        let Some(handle) = stage.select(hdr.isi) else {
            trace!(carrier_pid = stage.carrier_pid, isi = hdr.isi, "no stream for ISI");
            return None;
        };
        let stream = streams.get_mut(handle.0)?;
        stream.on_header(&hdr, &pkt[BB_HEADER_DATA_OFFSET..], out);
        Some(stream.set)
    } else {
        let stream = stage.current.and_then(|h| streams.get_mut(h.0))?;
        stream.on_continuation(&pkt[BB_CONTINUATION_DATA_OFFSET..], out);
        Some(stream.set)
    }
}
