//! Inner-stream reconstructor.
//!
//! User packets are cut out of consecutive BBFRAME data fields. On the wire
//! the first byte of every user packet carries the CRC-8 of the previous
//! one, so a completed packet waits until the first byte of its successor
//! arrives before it is validated and handed on.

use tracing::{debug, warn};

use super::header::{crc8, BbHeader};
use crate::constants::TS_PACKET_SIZE;
use crate::stats::StreamCounters;
use crate::types::{FeedSetId, StageId};

pub(crate) type UserPacket = [u8; TS_PACKET_SIZE];

pub(crate) struct Stream {
    pub isi: u8,
    pub stage: StageId,
    /// destination of reconstructed packets, owned by this stream
    pub set: FeedSetId,
    pub refs: u32,
    upl: usize,
    sync: u8,
    synced: bool,
    /// write cursor into `buf`; negative counts bytes still to skip
    pos: isize,
    dfl_left: usize,
    /// the last completed user packet stays here until its successor starts
    buf: Vec<u8>,
    /// CRC-8 the next user packet has to carry for `buf` to be released
    awaiting: Option<u8>,
    pub counters: StreamCounters,
}

impl Stream {
    pub fn new(isi: u8, stage: StageId, set: FeedSetId) -> Self {
        Self {
            isi,
            stage,
            set,
            refs: 0,
            upl: 0,
            sync: 0,
            synced: false,
            pos: 0,
            dfl_left: 0,
            buf: Vec::new(),
            awaiting: None,
            counters: StreamCounters::default(),
        }
    }

    /// Starts a new data field. `data` is whatever the header packet carries
    /// past the header.
    pub fn on_header(&mut self, hdr: &BbHeader, data: &[u8], out: &mut Vec<UserPacket>) {
        self.counters.frames += 1;
        if !hdr.crc_ok {
            self.counters.header_crc_errors += 1;
        }
        if hdr.upl != self.upl {
            if self.synced {
                debug!(isi = self.isi, old = self.upl, new = hdr.upl, "user packet length changed");
            }
            self.synced = false;
            self.awaiting = None;
            self.upl = hdr.upl;
            self.buf.resize(hdr.upl, 0);
        }
        self.sync = hdr.sync;
        self.dfl_left = hdr.dfl;

        if let Some(syncd) = hdr.syncd {
            let syncd = syncd as isize;
            if !self.synced {
                self.synced = true;
                self.pos = -syncd;
            } else {
                let expected = if self.pos <= 0 {
                    -self.pos
                } else {
                    self.upl as isize - self.pos
                };
                if expected != syncd {
                    warn!(isi = self.isi, expected, syncd, "user packet boundary moved, resyncing");
                    self.counters.resyncs += 1;
                    self.pos = -syncd;
                    self.awaiting = None;
                }
            }
        }
        self.append(data, out);
    }

    /// Data of a continuation packet.
    pub fn on_continuation(&mut self, data: &[u8], out: &mut Vec<UserPacket>) {
        self.append(data, out);
    }

    fn append(&mut self, data: &[u8], out: &mut Vec<UserPacket>) {
        let take = data.len().min(self.dfl_left);
        self.dfl_left -= take;
        if !self.synced || self.upl == 0 {
            return;
        }
        let mut data = &data[..take];

        while !data.is_empty() {
            if self.pos < 0 {
                let skip = data.len().min(self.pos.unsigned_abs());
                data = &data[skip..];
                self.pos += skip as isize;
                continue;
            }
            if self.pos == 0 {
                self.validate_previous(data[0], out);
            }
            let pos = self.pos as usize;
            let n = data.len().min(self.upl - pos);
            self.buf[pos..pos + n].copy_from_slice(&data[..n]);
            self.pos += n as isize;
            data = &data[n..];

            if self.pos as usize == self.upl {
                let crc = crc8(&self.buf[1..]);
                self.buf[0] = self.sync;
                self.awaiting = Some(crc);
                self.pos = 0;
            }
        }
    }

    fn validate_previous(&mut self, crc: u8, out: &mut Vec<UserPacket>) {
        let Some(expected) = self.awaiting.take() else {
            return;
        };
        if crc != expected {
            debug!(isi = self.isi, expected, crc, "user packet CRC mismatch");
            self.counters.packet_crc_errors += 1;
            return;
        }
        match <UserPacket>::try_from(self.buf.as_slice()) {
            Ok(up) => {
                self.counters.packets_delivered += 1;
                out.push(up);
            }
            Err(_) => self.counters.packets_dropped += 1,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::deembed::header::tests::header_bytes;

    fn stream() -> Stream {
        let mut arena = Arena::new();
        let k = arena.insert(());
        Stream::new(0, StageId(k), FeedSetId(k))
    }

    fn header(upl: usize, dfl: usize, syncd: Option<usize>) -> BbHeader {
        BbHeader::parse(&header_bytes(0, upl, dfl, syncd)).unwrap()
    }

    /// User packet as it travels inside the data field: CRC of the
    /// predecessor in place of the sync byte.
    fn wire_packet(prev_crc: u8, fill: u8) -> Vec<u8> {
        let mut up = vec![fill; TS_PACKET_SIZE];
        up[0] = prev_crc;
        up[1] = 0x01;
        up[2] = 0x00;
        up
    }

    #[test]
    fn packet_released_by_successor_crc() {
        let mut s = stream();
        let mut out = Vec::new();
        let up = wire_packet(0, 0xAB);
        let crc = crc8(&up[1..]);

        s.on_header(&header(188, 188, Some(0)), &up[..169], &mut out);
        s.on_continuation(&up[169..], &mut out);
        assert!(out.is_empty());

        let next = wire_packet(crc, 0xCD);
        s.on_header(&header(188, 188, Some(0)), &next[..169], &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0], 0x47);
        assert_eq!(&out[0][1..], &up[1..]);
        assert_eq!(s.counters.packets_delivered, 1);
    }

    #[test]
    fn wrong_crc_discards() {
        let mut s = stream();
        let mut out = Vec::new();
        let up = wire_packet(0, 0xAB);
        let crc = crc8(&up[1..]);
        s.on_header(&header(188, 188, Some(0)), &up[..169], &mut out);
        s.on_continuation(&up[169..], &mut out);
        let next = wire_packet(crc ^ 0xFF, 0xCD);
        s.on_header(&header(188, 188, Some(0)), &next[..169], &mut out);
        assert!(out.is_empty());
        assert_eq!(s.counters.packet_crc_errors, 1);
    }

    #[test]
    fn leading_bytes_skipped_until_sync_distance() {
        let mut s = stream();
        let mut out = Vec::new();
        let up = wire_packet(0, 0x11);
        let crc = crc8(&up[1..]);
        let mut field = vec![0xEE; 20];
        field.extend_from_slice(&up);
        field.push(crc);

        s.on_header(&header(188, field.len(), Some(20)), &field[..169], &mut out);
        s.on_continuation(&field[169..], &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][1..], &up[1..]);
    }

    #[test]
    fn nothing_before_first_sync_distance() {
        let mut s = stream();
        let mut out = Vec::new();
        s.on_header(&header(188, 169, None), &[0u8; 169], &mut out);
        assert!(!s.synced);
        s.on_continuation(&[0u8; 179], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn data_beyond_field_length_is_ignored() {
        let mut s = stream();
        let mut out = Vec::new();
        let up = wire_packet(0, 0x22);
        // field holds 10 bytes only; the rest of the packet is padding
        let mut data = up[..10].to_vec();
        data.extend_from_slice(&[0x99; 159]);
        s.on_header(&header(188, 10, Some(0)), &data, &mut out);
        s.on_header(&header(188, 178, None), &up[10..179], &mut out);
        s.on_continuation(&up[179..], &mut out);
        let next = wire_packet(crc8(&up[1..]), 0);
        s.on_header(&header(188, 188, Some(0)), &next[..169], &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][1..], &up[1..]);
    }

    #[test]
    fn moved_boundary_resyncs() {
        let mut s = stream();
        let mut out = Vec::new();
        let up = wire_packet(0, 0x33);
        s.on_header(&header(188, 169, Some(0)), &up[..169], &mut out);
        // expected distance is 19, header says 5
        let mut field = vec![0u8; 5];
        field.extend_from_slice(&up[..164]);
        s.on_header(&header(188, 169, Some(5)), &field, &mut out);
        assert_eq!(s.counters.resyncs, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn other_packet_lengths_are_dropped() {
        let mut s = stream();
        let mut out = Vec::new();
        let up = vec![0x00, 1, 2, 3, 4, 5, 6, 7];
        let crc = crc8(&up[1..]);
        let mut field = up.clone();
        field.push(crc);
        s.on_header(&header(8, field.len(), Some(0)), &field, &mut out);
        assert!(out.is_empty());
        assert_eq!(s.counters.packets_dropped, 1);
    }
}
