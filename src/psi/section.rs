// psi/section.rs
//! Section reassembly over the payload of consecutive packets of one PID.
//!
//! Sections are copied into a fixed buffer and cut out as soon as their
//! 12-bit `section_length` is satisfied, so several sections per packet and
//! sections spanning many packets both work. Nothing is delivered until the
//! first payload_unit_start has been seen.

use crc::{Crc, CRC_32_MPEG_2};
use tracing::debug;

use crate::constants::{MAX_SECFEED_SIZE, MAX_SECTION_SIZE, SECTION_PADDING};
use crate::packet::TsHeader;
use crate::types::BufferFlags;

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// CRC-32/MPEG-2 over a whole section including its trailing CRC; 0 when intact.
pub fn crc32_mpeg(section: &[u8]) -> u32 {
    CRC_MPEG.checksum(section)
}

/// Total length of the section starting at `buf` (header included).
#[inline]
pub fn section_length(buf: &[u8]) -> usize {
    3 + ((((buf[1] & 0x0F) as usize) << 8) | buf[2] as usize)
}

/// Where reassembled sections and anomalies go.
pub trait SectionSink {
    fn set_flags(&mut self, flags: BufferFlags);
    fn deliver(&mut self, section: &[u8]);
}

pub struct SectionAssembler {
    buf: Box<[u8]>,
    /// write cursor
    tsfeedp: usize,
    /// start of the section being assembled
    secbufp: usize,
    cc: Option<u8>,
    pusi_seen: bool,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; MAX_SECFEED_SIZE].into_boxed_slice(),
            tsfeedp: 0,
            secbufp: 0,
            cc: None,
            pusi_seen: false,
        }
    }

    /// Back to the startup state, used when filtering (re)starts.
    pub fn reset(&mut self) {
        self.tsfeedp = 0;
        self.secbufp = 0;
        self.cc = None;
        self.pusi_seen = false;
    }

    pub fn buffered(&self) -> usize {
        self.tsfeedp - self.secbufp
    }

    pub fn boundary_seen(&self) -> bool {
        self.pusi_seen
    }

    /// Processes one packet of the feed's PID. Returns `false` when the
    /// packet carries no usable payload.
    pub fn push_packet<S: SectionSink>(
        &mut self,
        hdr: &TsHeader<'_>,
        memcopy: fn(&mut [u8], &[u8]),
        sink: &mut S,
    ) -> bool {
        let count = hdr.payload_len();
        if count == 0 {
            return false;
        }
        let payload = hdr.payload();

        let cc = hdr.continuity_counter();
        let cc_ok = self.cc.is_none_or(|prev| (prev + 1) & 0x0F == cc);
        let dc_i = hdr.discontinuity_indicator();

        if !cc_ok || dc_i {
            if dc_i {
                sink.set_flags(BufferFlags::DISCONTINUITY_INDICATOR);
                debug!(pid = hdr.pid(), cc, "section packet with discontinuity indicator");
            } else {
                sink.set_flags(BufferFlags::DISCONTINUITY_DETECTED);
                debug!(
                    pid = hdr.pid(),
                    cc,
                    lost = count + 4,
                    "section discontinuity"
                );
            }
            // suspicious data is not fed until the next boundary
            self.pusi_seen = false;
            self.new_section(sink);
        }
        self.cc = Some(cc);

        if hdr.payload_unit_start() {
            let pointer = payload[0] as usize;
            if count > 1 && pointer < count {
                let (before, after) = payload[1..].split_at(pointer);
                self.copy_dump(before, memcopy, sink);
                self.pusi_seen = true;
                self.new_section(sink);
                self.copy_dump(after, memcopy, sink);
            } else {
                sink.set_flags(BufferFlags::DISCONTINUITY_DETECTED);
                debug!(pid = hdr.pid(), lost = count, "PUSI set but pointer field invalid");
            }
        } else {
            self.copy_dump(payload, memcopy, sink);
        }
        true
    }

    /// Closes the current buffer at a boundary. Whatever is left after the
    /// last complete section should be 0xFF stuffing; only the first and last
    /// leftover byte are inspected.
    fn new_section<S: SectionSink>(&mut self, sink: &mut S) {
        if self.secbufp < self.tsfeedp {
            let gap = &self.buf[self.secbufp..self.tsfeedp];
            if gap[0] != SECTION_PADDING || gap[gap.len() - 1] != SECTION_PADDING {
                sink.set_flags(BufferFlags::DISCONTINUITY_DETECTED);
                debug!(lost = gap.len(), buffered = self.tsfeedp, "section padding loss");
            }
        }
        self.tsfeedp = 0;
        self.secbufp = 0;
    }

    fn copy_dump<S: SectionSink>(&mut self, data: &[u8], memcopy: fn(&mut [u8], &[u8]), sink: &mut S) {
        if self.tsfeedp >= MAX_SECFEED_SIZE {
            return;
        }
        let mut len = data.len();
        if self.tsfeedp + len > MAX_SECFEED_SIZE {
            sink.set_flags(BufferFlags::DISCONTINUITY_DETECTED);
            debug!(
                lost = self.tsfeedp + len - MAX_SECFEED_SIZE,
                max = MAX_SECFEED_SIZE,
                "section buffer full"
            );
            len = MAX_SECFEED_SIZE - self.tsfeedp;
        }
        if len == 0 {
            return;
        }

        memcopy(&mut self.buf[self.tsfeedp..self.tsfeedp + len], &data[..len]);
        self.tsfeedp += len;

        let limit = self.tsfeedp;
        while self.secbufp + 2 < limit {
            let seclen = section_length(&self.buf[self.secbufp..]);
            if seclen > MAX_SECTION_SIZE || self.secbufp + seclen > limit {
                return;
            }
            if self.pusi_seen {
                sink.deliver(&self.buf[self.secbufp..self.secbufp + seclen]);
            } else {
                sink.set_flags(BufferFlags::DISCONTINUITY_DETECTED);
                debug!(seclen, "boundary not seen yet, discarding section data");
            }
            self.secbufp += seclen;
        }
    }
}

impl Default for SectionAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::packet::tests::ts_packet;

    /// Builds a long-form section with a valid CRC-32.
    pub(crate) fn make_section(table_id: u8, body: &[u8]) -> Vec<u8> {
        let len = body.len() + 5 + 4;
        let mut s = vec![table_id, 0xB0 | ((len >> 8) as u8 & 0x0F), len as u8, 0x00, 0x01, 0xC1, 0x00, 0x00];
        s.extend_from_slice(body);
        let crc = CRC_MPEG.checksum(&s);
        s.extend_from_slice(&crc.to_be_bytes());
        s
    }

    #[derive(Default)]
    struct Collect {
        flags: BufferFlags,
        sections: Vec<(Vec<u8>, BufferFlags)>,
    }

    impl SectionSink for Collect {
        fn set_flags(&mut self, flags: BufferFlags) {
            self.flags |= flags;
        }
        fn deliver(&mut self, section: &[u8]) {
            let flags = std::mem::take(&mut self.flags);
            self.sections.push((section.to_vec(), flags));
        }
    }

    fn copy(dst: &mut [u8], src: &[u8]) {
        dst.copy_from_slice(src);
    }

    fn push(asm: &mut SectionAssembler, sink: &mut Collect, pkt: &[u8]) {
        let hdr = TsHeader::new(pkt).unwrap();
        asm.push_packet(&hdr, copy, sink);
    }

    #[test]
    fn crc_of_intact_section_is_zero() {
        let sec = make_section(0x00, &[0x00, 0x01, 0xE1, 0x00]);
        assert_eq!(crc32_mpeg(&sec), 0);
        assert_eq!(section_length(&sec), sec.len());
    }

    #[test]
    fn single_packet_section_delivered_once() {
        let sec = make_section(0x00, &[0x00, 0x01, 0xE1, 0x00]);
        let mut payload = vec![0x00];
        payload.extend_from_slice(&sec);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();
        push(&mut asm, &mut sink, &ts_packet(0, 0, true, &payload));
        assert_eq!(sink.sections.len(), 1);
        assert_eq!(sink.sections[0].0, sec);
        assert!(sink.sections[0].1.is_empty());
    }

    #[test]
    fn section_spanning_packets() {
        let body: Vec<u8> = (0..300).map(|i| i as u8).collect();
        let sec = make_section(0x42, &body);
        let mut payload = vec![0x00];
        payload.extend_from_slice(&sec[..183]);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();
        push(&mut asm, &mut sink, &ts_packet(0x11, 4, true, &payload));
        assert!(sink.sections.is_empty());
        push(&mut asm, &mut sink, &ts_packet(0x11, 5, false, &sec[183..]));
        assert_eq!(sink.sections.len(), 1);
        assert_eq!(sink.sections[0].0, sec);
    }

    #[test]
    fn data_before_first_boundary_is_discarded() {
        let sec = make_section(0x42, &[1, 2, 3]);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();
        // no PUSI yet: complete section but startup garbage
        push(&mut asm, &mut sink, &ts_packet(0x11, 0, false, &sec));
        assert!(sink.sections.is_empty());
        assert!(!asm.boundary_seen());
    }

    #[test]
    fn pointer_field_splits_tail_and_head() {
        let first = make_section(0x42, &[0xAA; 200]);
        let second = make_section(0x46, &[0xBB; 4]);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();

        let mut p1 = vec![0x00];
        p1.extend_from_slice(&first[..183]);
        push(&mut asm, &mut sink, &ts_packet(0x11, 0, true, &p1));

        let tail = &first[183..];
        let mut p2 = vec![tail.len() as u8];
        p2.extend_from_slice(tail);
        p2.extend_from_slice(&second);
        push(&mut asm, &mut sink, &ts_packet(0x11, 1, true, &p2));

        assert_eq!(sink.sections.len(), 2);
        assert_eq!(sink.sections[0].0, first);
        assert_eq!(sink.sections[1].0, second);
        // packet was padded with 0xFF, so closing the buffer is clean
        assert!(sink.flags.is_empty());
    }

    #[test]
    fn continuity_jump_drops_partial_section() {
        let sec = make_section(0x42, &[0x11; 300]);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();
        let mut p1 = vec![0x00];
        p1.extend_from_slice(&sec[..183]);
        push(&mut asm, &mut sink, &ts_packet(0x11, 0, true, &p1));
        push(&mut asm, &mut sink, &ts_packet(0x11, 2, false, &sec[183..]));
        assert!(sink.sections.is_empty());
        assert!(sink.flags.contains(BufferFlags::DISCONTINUITY_DETECTED));
        assert!(!asm.boundary_seen());
    }

    #[test]
    fn padding_check_only_looks_at_endpoints() {
        let sec = make_section(0x42, &[0x01]);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();

        // leftover after the section is FF FF FF 00 00 FF..FF: corrupt in
        // the middle, but both endpoints are padding
        let mut p1 = vec![0x00];
        p1.extend_from_slice(&sec);
        p1.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0x00, 0x00]);
        push(&mut asm, &mut sink, &ts_packet(0x11, 0, true, &p1));
        // the second PUSI closes the buffer
        let mut p2 = vec![0x00];
        p2.extend_from_slice(&sec);
        push(&mut asm, &mut sink, &ts_packet(0x11, 1, true, &p2));
        assert_eq!(sink.sections.len(), 2);
        assert!(sink.sections[1].1.is_empty());
    }

    #[test]
    fn non_padding_leftover_flags_discontinuity() {
        let sec = make_section(0x42, &[0x01]);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();

        // a truncated second section is left in the buffer
        let mut p1 = vec![0x00];
        p1.extend_from_slice(&sec);
        p1.extend_from_slice(&[0x42, 0xB0, 0xFF, 0x00]);
        push(&mut asm, &mut sink, &ts_packet(0x11, 0, true, &p1));
        let mut p2 = vec![0x00];
        p2.extend_from_slice(&sec);
        push(&mut asm, &mut sink, &ts_packet(0x11, 1, true, &p2));
        assert_eq!(sink.sections.len(), 2);
        assert!(sink.sections[1].1.contains(BufferFlags::DISCONTINUITY_DETECTED));
    }

    #[test]
    fn oversized_section_overflows_buffer() {
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();
        // section_length 0xFFF is larger than any section, keeps accumulating
        let mut p = vec![0x00, 0x42, 0x7F, 0xFF];
        p.extend_from_slice(&[0u8; 180]);
        push(&mut asm, &mut sink, &ts_packet(0x11, 0, true, &p));
        for cc in 1..=24u8 {
            push(&mut asm, &mut sink, &ts_packet(0x11, cc & 0x0F, false, &[0u8; 184]));
        }
        assert!(sink.flags.contains(BufferFlags::DISCONTINUITY_DETECTED));
        assert!(asm.buffered() <= MAX_SECFEED_SIZE);
        assert!(sink.sections.is_empty());
    }

    /// Packet whose one-byte adaptation field sets discontinuity_indicator.
    fn discontinuity_packet(pid: u16, cc: u8, pusi: bool, payload: &[u8]) -> [u8; 188] {
        let mut pkt = ts_packet(pid, cc, pusi, &[]);
        pkt[3] = 0x30 | cc;
        pkt[4] = 1;
        pkt[5] = 0x80;
        pkt[6..6 + payload.len()].copy_from_slice(payload);
        pkt
    }

    #[test]
    fn discontinuity_indicator_drops_partial_section() {
        let sec = make_section(0x42, &[0x11; 300]);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();
        let mut p1 = vec![0x00];
        p1.extend_from_slice(&sec[..183]);
        push(&mut asm, &mut sink, &ts_packet(0x11, 0, true, &p1));
        // counter is in order, the indicator alone breaks the section
        push(&mut asm, &mut sink, &discontinuity_packet(0x11, 1, false, &sec[183..]));
        assert!(sink.sections.is_empty());
        assert!(sink.flags.contains(BufferFlags::DISCONTINUITY_INDICATOR));
        assert!(!asm.boundary_seen());
    }

    #[test]
    fn discontinuity_indicator_rides_on_next_section() {
        let first = make_section(0x42, &[0x01]);
        let second = make_section(0x46, &[0x02]);
        let mut asm = SectionAssembler::new();
        let mut sink = Collect::default();
        let mut p1 = vec![0x00];
        p1.extend_from_slice(&first);
        push(&mut asm, &mut sink, &ts_packet(0x11, 0, true, &p1));
        let mut p2 = vec![0x00];
        p2.extend_from_slice(&second);
        push(&mut asm, &mut sink, &discontinuity_packet(0x11, 1, true, &p2));

        assert_eq!(sink.sections.len(), 2);
        assert!(sink.sections[0].1.is_empty());
        assert_eq!(sink.sections[1].0, second);
        assert_eq!(sink.sections[1].1, BufferFlags::DISCONTINUITY_INDICATOR);
    }
}
