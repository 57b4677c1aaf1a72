// src/lib.rs
//! Software MPEG-TS demultiplexer with BBFRAME de-embedding.
//!
//! Packets enter through [`Demux`], are checked and dispatched against a
//! FeedSet, and reach Output Feeds as raw packets, payload bytes or
//! reassembled sections. Carrier PIDs can be routed into de-embedded inner
//! transport streams, each with its own FeedSet.

pub mod monitor {
    use std::{net::SocketAddr, path::PathBuf};

    use crate::config::DemuxConfig;

    pub enum Input {
        Udp(SocketAddr),
        File(PathBuf),
    }

    pub struct Options {
        pub input: Input,
        pub packet_size: usize,
        pub refresh_secs: u64,
        pub config: DemuxConfig,
        /// payload-only feeds
        pub pids: Vec<u16>,
        pub section_pids: Vec<u16>,
        /// carrier PID and ISI to de-embed
        pub bbframe: Option<(u16, u8)>,
    }

    /// Async entry-point; returns at end of file, on Ctrl-C or socket error
    pub async fn run(opts: Options) -> anyhow::Result<()> {
        crate::core::run(opts).await
    }
}

pub mod arena;
pub mod config;
pub mod constants;
pub mod deembed;
pub mod demux;
pub mod error;
pub mod feed;
pub mod feedset;
pub mod logging;
pub mod packet;
pub mod psi;
pub mod report;
pub mod resync;
pub mod stats;
pub mod types;

mod core;
mod network;

pub use config::DemuxConfig;
pub use demux::{Demux, Frontend, SoftwareFrontend};
pub use error::{DemuxError, FrontendError, Result};
pub use feed::DemuxHooks;
pub use psi::SectionFilterSpec;
pub use stats::FeedSetStats;
pub use types::{
    BufferFlags, Census, FeedId, FeedInfo, FeedKind, FeedSetId, FeedState, FilterId, PesType,
    SectionCallback, StreamHandle, TsCallback, TsType,
};
