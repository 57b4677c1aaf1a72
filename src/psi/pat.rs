//! PAT decoding of a complete, already reassembled section.

use anyhow::bail;

#[derive(Clone, Debug, serde::Serialize)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub programs: Vec<PatEntry>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

/// `section` starts at table_id and includes the CRC (as delivered by a section feed).
pub fn parse_pat(section: &[u8]) -> anyhow::Result<PatSection> {
    if section.len() < 12 {
        bail!("short section");
    }
    if section[0] != 0x00 {
        bail!("not PAT");
    }
    let end = crate::psi::section_length(section);
    if end < 12 {
        bail!("section_length {} too small for a PAT", end - 3);
    }
    if end > section.len() {
        bail!("truncated section");
    }

    let body = &section[8..end - 4];
    let programs = body
        .chunks_exact(4)
        .map(|entry| PatEntry {
            program_number: u16::from_be_bytes([entry[0], entry[1]]),
            pmt_pid: (((entry[2] & 0x1F) as u16) << 8) | entry[3] as u16,
        })
        .filter(|entry| entry.program_number != 0)
        .collect();

    Ok(PatSection {
        transport_stream_id: u16::from_be_bytes([section[3], section[4]]),
        version: (section[5] & 0x3E) >> 1,
        current_next: section[5] & 0x01 != 0,
        programs,
    })
}
