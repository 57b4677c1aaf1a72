//! BBHEADER carried in a carrier packet.

use bitstream_io::{BigEndian, BitRead, BitReader};
use crc::{Crc, CRC_8_DVB_S2};

use crate::constants::{BB_HEADER_LEN, BB_SYNCD_NONE};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_DVB_S2);

/// CRC-8 (poly 0xD5) used for both the BBHEADER and user packets.
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// Decoded baseband header. Length fields are already in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BbHeader {
    pub matype1: u8,
    pub isi: u8,
    pub upl: usize,
    pub dfl: usize,
    pub sync: u8,
    /// `None` when no user packet starts in this data field
    pub syncd: Option<usize>,
    pub crc_ok: bool,
}

impl BbHeader {
    /// Parses the 10 header bytes; `None` if fewer are available.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let raw = raw.get(..BB_HEADER_LEN)?;
        let mut br = BitReader::endian(raw, BigEndian);
        let matype1 = br.read::<8, u8>().ok()?;
        let isi = br.read::<8, u8>().ok()?;
        let upl = br.read::<16, u16>().ok()?;
        let dfl = br.read::<16, u16>().ok()?;
        let sync = br.read::<8, u8>().ok()?;
        let syncd = br.read::<16, u16>().ok()?;
        let crc = br.read::<8, u8>().ok()?;

        Some(Self {
            matype1,
            isi,
            upl: upl as usize / 8,
            dfl: dfl as usize / 8,
            sync,
            syncd: (syncd != BB_SYNCD_NONE).then_some(syncd as usize / 8),
            crc_ok: crc8(&raw[..BB_HEADER_LEN - 1]) == crc,
        })
    }
}
