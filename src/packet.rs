//! Zero-copy view over one 188 byte transport packet.

use crate::constants::{TS_HEADER_SIZE, TS_PACKET_SIZE, TS_SYNC_BYTE};

#[derive(Debug, Clone, Copy)]
pub struct TsHeader<'a> {
    raw: &'a [u8],
}

impl<'a> TsHeader<'a> {
    /// Wraps a packet; `None` unless it is exactly one 188 B packet starting with 0x47.
    pub fn new(raw: &'a [u8]) -> Option<Self> {
        if raw.len() != TS_PACKET_SIZE || raw[0] != TS_SYNC_BYTE {
            return None;
        }
        Some(Self { raw })
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn pid(&self) -> u16 {
        (((self.raw[1] & 0x1F) as u16) << 8) | (self.raw[2] as u16)
    }

    pub fn transport_error(&self) -> bool {
        self.raw[1] & 0x80 != 0
    }

    pub fn payload_unit_start(&self) -> bool {
        self.raw[1] & 0x40 != 0
    }

    pub fn continuity_counter(&self) -> u8 {
        self.raw[3] & 0x0F
    }

    pub fn has_payload(&self) -> bool {
        self.raw[3] & 0x10 != 0
    }

    pub fn has_adaptation_field(&self) -> bool {
        self.raw[3] & 0x20 != 0
    }

    /// discontinuity_indicator of a non-empty adaptation field
    pub fn discontinuity_indicator(&self) -> bool {
        self.has_adaptation_field() && self.raw[4] > 0 && self.raw[5] & 0x80 != 0
    }

    /// Number of payload bytes; 0 when absent or the adaptation field is corrupt.
    pub fn payload_len(&self) -> usize {
        if !self.has_payload() {
            return 0;
        }
        if self.has_adaptation_field() {
            let adap_len = self.raw[4] as usize;
            if adap_len > 183 {
                return 0;
            }
            return TS_PACKET_SIZE - TS_HEADER_SIZE - 1 - adap_len;
        }
        TS_PACKET_SIZE - TS_HEADER_SIZE
    }

    pub fn payload(&self) -> &'a [u8] {
        let count = self.payload_len();
        &self.raw[TS_PACKET_SIZE - count..]
    }
}
