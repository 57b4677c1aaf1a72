//! Packet resynchronizer: finds 188/204 byte packet boundaries in an
//! arbitrarily chunked byte stream and carries partial packets over to the
//! next call.
//!
//! The last packet's worth of input is kept as history, so the one-packet
//! backtrack after garbage reaches across call boundaries and the packets
//! found do not depend on how the stream was chunked.

use bytes::{Buf, BytesMut};

use crate::constants::{TS_PACKET_SIZE, TS_PACKET_SIZE_204, TS_SYNC_BYTE, TS_SYNC_BYTE_204};

pub struct Resynchronizer {
    carry: BytesMut,
    /// tail of the input seen before the current call
    history: BytesMut,
    /// the previous call ended inside garbage
    skipping: bool,
    packet_size: usize,
}

#[inline]
fn is_sync(b: u8, packet_size: usize) -> bool {
    b == TS_SYNC_BYTE || (packet_size == TS_PACKET_SIZE_204 && b == TS_SYNC_BYTE_204)
}

/// Next packet start at or after `start`, `None` when `buf` runs out first.
/// When garbage was skipped and a sync byte sits exactly one packet before
/// the resume point, that earlier offset wins. Negative offsets point back
/// into `history`.
fn find_next_packet(
    history: &[u8],
    buf: &[u8],
    start: usize,
    skipping: bool,
    packet_size: usize,
) -> Option<isize> {
    let pos = start + buf[start..].iter().position(|&b| is_sync(b, packet_size))?;
    if pos == start && !skipping {
        return Some(pos as isize);
    }
    let backtrack = pos as isize - packet_size as isize;
    let earlier = if backtrack >= 0 {
        Some(buf[backtrack as usize])
    } else {
        history
            .len()
            .checked_sub(backtrack.unsigned_abs())
            .map(|i| history[i])
    };
    match earlier {
        Some(b) if is_sync(b, packet_size) => Some(backtrack),
        _ => Some(pos as isize),
    }
}

impl Resynchronizer {
    pub fn new() -> Self {
        Self {
            carry: BytesMut::with_capacity(TS_PACKET_SIZE_204),
            history: BytesMut::with_capacity(TS_PACKET_SIZE_204),
            skipping: false,
            packet_size: TS_PACKET_SIZE,
        }
    }

    /// Bytes currently held back waiting for the rest of their packet.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    pub fn reset(&mut self) {
        self.carry.clear();
        self.history.clear();
        self.skipping = false;
    }

    /// Feeds `buf` and calls `emit` once per complete, aligned 188 byte packet
    /// (204 byte input is cut to 188 and its 0xB8 marker normalized to 0x47).
    pub fn push<F>(&mut self, buf: &[u8], packet_size: usize, mut emit: F)
    where
        F: FnMut(&[u8]),
    {
        debug_assert!(packet_size == TS_PACKET_SIZE || packet_size == TS_PACKET_SIZE_204);
        if packet_size != self.packet_size {
            // a carried fragment belongs to the old framing
            self.reset();
            self.packet_size = packet_size;
        }
        let mut p = 0usize;

        if !self.carry.is_empty() {
            let need = packet_size - self.carry.len();
            if buf.len() < need {
                self.carry.extend_from_slice(buf);
                self.remember(buf);
                return;
            }
            self.carry.extend_from_slice(&buf[..need]);
            if self.carry[0] == TS_SYNC_BYTE {
                emit(&self.carry[..TS_PACKET_SIZE]);
            }
            self.carry.clear();
            p = need;
        }

        loop {
            let Some(at) = find_next_packet(&self.history, buf, p, self.skipping, packet_size)
            else {
                self.skipping |= p < buf.len();
                p = buf.len();
                break;
            };
            self.skipping = false;

            if at < 0 {
                // starts in the previous call's input, ends in this one
                let back = at.unsigned_abs();
                let head = back.min(TS_PACKET_SIZE);
                let from = self.history.len() - back;
                let mut pkt = [0u8; TS_PACKET_SIZE];
                pkt[..head].copy_from_slice(&self.history[from..from + head]);
                pkt[head..].copy_from_slice(&buf[..TS_PACKET_SIZE - head]);
                pkt[0] = TS_SYNC_BYTE;
                emit(&pkt);
                p = packet_size - back;
                continue;
            }

            p = at as usize;
            if buf.len() - p < packet_size {
                break;
            }
            let q = &buf[p..p + TS_PACKET_SIZE];
            if q[0] == TS_SYNC_BYTE {
                emit(q);
            } else {
                let mut pkt = [0u8; TS_PACKET_SIZE];
                pkt.copy_from_slice(q);
                pkt[0] = TS_SYNC_BYTE;
                emit(&pkt);
            }
            p += packet_size;
        }

        if p < buf.len() {
            self.carry.extend_from_slice(&buf[p..]);
            if self.carry[0] == TS_SYNC_BYTE_204 && packet_size == TS_PACKET_SIZE_204 {
                self.carry[0] = TS_SYNC_BYTE;
            }
        }
        self.remember(buf);
    }

    /// Keeps the last packet's worth of input for backtracking.
    fn remember(&mut self, buf: &[u8]) {
        let keep = self.packet_size;
        if buf.len() >= keep {
            self.history.clear();
            self.history.extend_from_slice(&buf[buf.len() - keep..]);
        } else {
            self.history.extend_from_slice(buf);
            let excess = self.history.len().saturating_sub(keep);
            self.history.advance(excess);
        }
    }
}

impl Default for Resynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
