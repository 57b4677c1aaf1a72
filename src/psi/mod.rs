pub mod filter;
pub mod pat;
pub mod section;

pub use filter::{SectionFilter, SectionFilterSpec};
pub use pat::{parse_pat, PatEntry, PatSection};
pub use section::{crc32_mpeg, section_length, SectionAssembler, SectionSink};
