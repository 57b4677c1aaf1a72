//! Section filters: value / mask / mode triples over the first 18 bytes of a
//! section.

use crate::constants::DEMUX_MASK_MAX;
use crate::types::FilterId;

/// Filter pattern as supplied by the caller.
///
/// A mask bit selects a bit for comparison. A set mode bit requires equality
/// with `value`, a clear mode bit requires that at least one such bit differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionFilterSpec {
    pub value: [u8; DEMUX_MASK_MAX],
    pub mask: [u8; DEMUX_MASK_MAX],
    pub mode: [u8; DEMUX_MASK_MAX],
}

impl SectionFilterSpec {
    /// Passes every section.
    pub fn match_all() -> Self {
        Self {
            value: [0; DEMUX_MASK_MAX],
            mask: [0; DEMUX_MASK_MAX],
            mode: [0xFF; DEMUX_MASK_MAX],
        }
    }

    /// Passes sections whose table_id equals `table_id`.
    pub fn table_id(table_id: u8) -> Self {
        let mut spec = Self::match_all();
        spec.value[0] = table_id;
        spec.mask[0] = 0xFF;
        spec
    }
}

impl Default for SectionFilterSpec {
    fn default() -> Self {
        Self::match_all()
    }
}

#[derive(Debug, Clone)]
pub struct SectionFilter {
    pub id: FilterId,
    value: [u8; DEMUX_MASK_MAX],
    mask_and_mode: [u8; DEMUX_MASK_MAX],
    mask_and_not_mode: [u8; DEMUX_MASK_MAX],
    do_neq: bool,
}

impl SectionFilter {
    pub fn new(id: FilterId, spec: &SectionFilterSpec) -> Self {
        let mut mask_and_mode = [0u8; DEMUX_MASK_MAX];
        let mut mask_and_not_mode = [0u8; DEMUX_MASK_MAX];
        let mut do_neq = false;
        for i in 0..DEMUX_MASK_MAX {
            mask_and_mode[i] = spec.mask[i] & spec.mode[i];
            mask_and_not_mode[i] = spec.mask[i] & !spec.mode[i];
            do_neq |= mask_and_not_mode[i] != 0;
        }
        Self {
            id,
            value: spec.value,
            mask_and_mode,
            mask_and_not_mode,
            do_neq,
        }
    }

    /// Bytes past the end of a short section compare as zero.
    pub fn matches(&self, section: &[u8]) -> bool {
        let mut neq = 0u8;
        for i in 0..DEMUX_MASK_MAX {
            let xor = self.value[i] ^ section.get(i).copied().unwrap_or(0);
            if self.mask_and_mode[i] & xor != 0 {
                return false;
            }
            neq |= self.mask_and_not_mode[i] & xor;
        }
        !(self.do_neq && neq == 0)
    }
}
