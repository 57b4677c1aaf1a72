//! The software demux.
//!
//! Two locks split the work. `control` serialises allocation, start/stop and
//! bbframe routing and is held across calls into the [`Frontend`]. `engine`
//! guards everything packet dispatch touches and is only ever taken briefly,
//! possibly while `control` is held; `control` is never taken while `engine`
//! is held.

mod graph;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::DemuxConfig;
use crate::constants::{MAX_PID, PESLEN_RESET, PID_FULL_STREAM, TS_PACKET_SIZE, TS_PACKET_SIZE_204};
use crate::error::{DemuxError, FrontendError, Result};
use crate::feed::{DemuxHooks, FeedBody, OutputFeed};
use crate::psi::{SectionAssembler, SectionFilter, SectionFilterSpec};
use crate::resync::Resynchronizer;
use crate::stats::FeedSetStats;
use crate::types::{
    BufferFlags, Census, FeedId, FeedInfo, FeedKind, FeedSetId, FeedState, FilterId, PesType,
    SectionCallback, StreamHandle, TsCallback, TsType,
};

use graph::Graph;

/// Hardware side of a feed: enables and disables filtering for it.
pub trait Frontend: Send {
    fn start_feed(&mut self, feed: &FeedInfo) -> std::result::Result<(), FrontendError>;
    fn stop_feed(&mut self, feed: &FeedInfo) -> std::result::Result<(), FrontendError>;
}

/// Frontend for pure software filtering; accepts every feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareFrontend;

impl Frontend for SoftwareFrontend {
    fn start_feed(&mut self, feed: &FeedInfo) -> std::result::Result<(), FrontendError> {
        debug!(pid = feed.pid, kind = ?feed.kind, "start feed");
        Ok(())
    }

    fn stop_feed(&mut self, feed: &FeedInfo) -> std::result::Result<(), FrontendError> {
        debug!(pid = feed.pid, kind = ?feed.kind, "stop feed");
        Ok(())
    }
}

struct BbframeRoute {
    carrier_pid: u16,
    isi: u8,
    stream: StreamHandle,
}

struct Control {
    frontend: Option<Box<dyn Frontend>>,
    feed_num: usize,
    filter_num: usize,
    decoder_slots: [Option<FeedId>; PesType::DECODER_SLOTS],
    bbframes: Option<BbframeRoute>,
}

struct Engine {
    resync: Resynchronizer,
    graph: Graph,
}

pub struct Demux {
    control: Mutex<Control>,
    engine: Mutex<Engine>,
}

impl Demux {
    pub fn new(config: DemuxConfig, frontend: Option<Box<dyn Frontend>>) -> Self {
        Self {
            control: Mutex::new(Control {
                frontend,
                feed_num: config.feed_num,
                filter_num: config.filter_num,
                decoder_slots: [None; PesType::DECODER_SLOTS],
                bbframes: None,
            }),
            engine: Mutex::new(Engine {
                resync: Resynchronizer::new(),
                graph: Graph::new(&config),
            }),
        }
    }

    /// Demux with a [`SoftwareFrontend`].
    pub fn software(config: DemuxConfig) -> Self {
        Self::new(config, Some(Box::new(SoftwareFrontend)))
    }

    pub fn set_hooks(&self, hooks: DemuxHooks) {
        self.engine.lock().graph.hooks = hooks;
    }

    /// The physical FeedSet.
    pub fn root(&self) -> FeedSetId {
        self.engine.lock().graph.root
    }

    /// FeedSet used for feeds allocated without a parent.
    pub fn default_feed_set(&self) -> FeedSetId {
        self.engine.lock().graph.default_set
    }

    // ---------------------------------------------------------------- input

    /// Aligned 188 byte packets; a trailing partial packet is ignored.
    pub fn inject_packets(&self, buf: &[u8]) {
        let mut engine = self.engine.lock();
        let root = engine.graph.root;
        for pkt in buf.chunks_exact(TS_PACKET_SIZE) {
            engine.graph.dispatch(root, pkt);
        }
    }

    /// Arbitrary chunks of a 188 or 204 byte packet stream.
    pub fn inject_unaligned(&self, buf: &[u8], packet_size: usize) -> Result<()> {
        if packet_size != TS_PACKET_SIZE && packet_size != TS_PACKET_SIZE_204 {
            return Err(DemuxError::InvalidArgument("packet size must be 188 or 204"));
        }
        let mut engine = self.engine.lock();
        let Engine { resync, graph } = &mut *engine;
        let root = graph.root;
        resync.push(buf, packet_size, |pkt| graph.dispatch(root, pkt));
        Ok(())
    }

    /// Bytes handed unparsed to the full-stream raw feeds of the default set.
    pub fn inject_raw(&self, buf: &[u8]) {
        self.engine.lock().graph.dispatch_raw(buf);
    }

    // ---------------------------------------------------------------- feeds

    pub fn allocate_ts_feed(
        &self,
        pid: u16,
        ts_type: TsType,
        pes_type: PesType,
        callback: TsCallback,
        parent: Option<FeedSetId>,
    ) -> Result<FeedId> {
        if pid > PID_FULL_STREAM {
            return Err(DemuxError::InvalidPid(pid));
        }
        let mut control = self.control.lock();
        let slot = if ts_type.contains(TsType::DECODER) {
            let slot = pes_type
                .slot()
                .ok_or(DemuxError::InvalidArgument("decoder feed needs a PES slot"))?;
            if control.decoder_slots[slot].is_some() {
                return Err(DemuxError::Busy);
            }
            Some(slot)
        } else {
            None
        };

        let mut engine = self.engine.lock();
        let graph = &mut engine.graph;
        if graph.feeds.len() >= control.feed_num || graph.filters_used >= control.filter_num {
            return Err(DemuxError::Busy);
        }
        let set = parent.unwrap_or(graph.default_set);
        let feed = OutputFeed {
            id: FeedId(set.0),
            pid,
            set,
            state: FeedState::Ready,
            filtering: false,
            flags: BufferFlags::empty(),
            body: FeedBody::Ts {
                ts_type,
                pes_type,
                cc: None,
                peslen: PESLEN_RESET,
                callback,
            },
        };
        let id = graph.attach_feed(set, feed).ok_or(DemuxError::UnknownHandle)?;
        graph.filters_used += 1;
        drop(engine);

        if let Some(slot) = slot {
            control.decoder_slots[slot] = Some(id);
        }
        debug!(pid, ?ts_type, ?pes_type, "TS feed allocated");
        Ok(id)
    }

    pub fn allocate_section_feed(
        &self,
        pid: u16,
        check_crc: bool,
        callback: SectionCallback,
        parent: Option<FeedSetId>,
    ) -> Result<FeedId> {
        if pid > MAX_PID {
            return Err(DemuxError::InvalidPid(pid));
        }
        let control = self.control.lock();
        let mut engine = self.engine.lock();
        let graph = &mut engine.graph;
        if graph.feeds.len() >= control.feed_num {
            return Err(DemuxError::Busy);
        }
        let set = parent.unwrap_or(graph.default_set);
        let feed = OutputFeed {
            id: FeedId(set.0),
            pid,
            set,
            state: FeedState::Ready,
            filtering: false,
            flags: BufferFlags::empty(),
            body: FeedBody::Section {
                check_crc,
                assembler: SectionAssembler::new(),
                filters: Vec::new(),
                callback,
            },
        };
        let id = graph.attach_feed(set, feed).ok_or(DemuxError::UnknownHandle)?;
        debug!(pid, check_crc, "section feed allocated");
        Ok(id)
    }

    pub fn allocate_section_filter(&self, feed: FeedId, spec: &SectionFilterSpec) -> Result<FilterId> {
        let control = self.control.lock();
        let mut engine = self.engine.lock();
        let graph = &mut engine.graph;
        if graph.filters_used >= control.filter_num {
            return Err(DemuxError::Busy);
        }
        let id = FilterId(graph.next_filter_id);
        let Some(output) = graph.feeds.get_mut(feed.0) else {
            return Err(gone("allocate_section_filter"));
        };
        let FeedBody::Section { filters, .. } = &mut output.body else {
            return Err(DemuxError::InvalidArgument("not a section feed"));
        };
        filters.push(SectionFilter::new(id, spec));
        graph.next_filter_id = graph.next_filter_id.wrapping_add(1);
        graph.filters_used += 1;
        Ok(id)
    }

    pub fn release_section_filter(&self, feed: FeedId, filter: FilterId) -> Result<()> {
        let _control = self.control.lock();
        let mut engine = self.engine.lock();
        let graph = &mut engine.graph;
        let Some(output) = graph.feeds.get_mut(feed.0) else {
            return Err(gone("release_section_filter"));
        };
        let FeedBody::Section { filters, .. } = &mut output.body else {
            return Err(DemuxError::InvalidArgument("not a section feed"));
        };
        let before = filters.len();
        filters.retain(|f| f.id != filter);
        if filters.len() == before {
            return Err(DemuxError::InvalidArgument("unknown filter"));
        }
        graph.filters_used -= 1;
        Ok(())
    }

    pub fn start_filtering(&self, feed: FeedId) -> Result<()> {
        let mut control = self.control.lock();
        let info = {
            let engine = self.engine.lock();
            let Some(output) = engine.graph.feeds.get(feed.0) else {
                return Err(gone("start_filtering"));
            };
            if output.state != FeedState::Ready {
                return Err(DemuxError::InvalidState {
                    op: "start_filtering",
                    state: output.state,
                });
            }
            if output.kind() == FeedKind::Section && output.filter_count() == 0 {
                return Err(DemuxError::InvalidArgument("section feed has no filter"));
            }
            output.info()
        };

        let frontend = control.frontend.as_mut().ok_or(DemuxError::NoDevice)?;
        {
            let mut engine = self.engine.lock();
            if let Some(output) = engine.graph.feeds.get_mut(feed.0) {
                output.prepare_start();
            }
        }
        frontend.start_feed(&info).map_err(DemuxError::Frontend)?;

        let mut engine = self.engine.lock();
        if let Some(output) = engine.graph.feeds.get_mut(feed.0) {
            output.filtering = true;
            output.state = FeedState::Go;
        }
        Ok(())
    }

    /// Stops delivery. The feed is stopped even when the frontend reports an
    /// error, which is returned afterwards.
    pub fn stop_filtering(&self, feed: FeedId) -> Result<()> {
        let mut control = self.control.lock();
        self.stop_locked(&mut control, feed)
    }

    fn stop_locked(&self, control: &mut Control, feed: FeedId) -> Result<()> {
        let info = {
            let engine = self.engine.lock();
            let Some(output) = engine.graph.feeds.get(feed.0) else {
                return Err(gone("stop_filtering"));
            };
            if output.state != FeedState::Go {
                return Err(DemuxError::InvalidState {
                    op: "stop_filtering",
                    state: output.state,
                });
            }
            output.info()
        };
        let frontend = control.frontend.as_mut().ok_or(DemuxError::NoDevice)?;
        let res = frontend.stop_feed(&info);

        let mut engine = self.engine.lock();
        if let Some(output) = engine.graph.feeds.get_mut(feed.0) {
            output.filtering = false;
            output.state = FeedState::Ready;
        }
        res.map_err(DemuxError::Frontend)
    }

    pub fn release_ts_feed(&self, feed: FeedId) -> Result<()> {
        self.release_feed(feed, false)
    }

    pub fn release_section_feed(&self, feed: FeedId) -> Result<()> {
        self.release_feed(feed, true)
    }

    fn release_feed(&self, feed: FeedId, section: bool) -> Result<()> {
        let mut control = self.control.lock();
        let state = {
            let engine = self.engine.lock();
            let Some(output) = engine.graph.feeds.get(feed.0) else {
                return Err(gone("release_feed"));
            };
            if (output.kind() == FeedKind::Section) != section {
                return Err(DemuxError::InvalidArgument("feed kind does not match release call"));
            }
            output.state
        };
        // a failed stop still releases the feed; the error is returned last
        let stopped = if state == FeedState::Go {
            self.stop_locked(&mut control, feed)
        } else {
            Ok(())
        };

        let mut engine = self.engine.lock();
        let Some(output) = engine.graph.detach_feed(feed) else {
            return Err(gone("release_feed"));
        };
        engine.graph.filters_used -= match &output.body {
            FeedBody::Ts { .. } => 1,
            FeedBody::Section { filters, .. } => filters.len(),
        };
        drop(engine);

        for slot in control.decoder_slots.iter_mut() {
            if *slot == Some(feed) {
                *slot = None;
            }
        }
        debug!(pid = output.pid, "feed released");
        stopped
    }

    /// Current state; `Free` once released.
    pub fn feed_state(&self, feed: FeedId) -> FeedState {
        self.engine
            .lock()
            .graph
            .feeds
            .get(feed.0)
            .map_or(FeedState::Free, |f| f.state)
    }

    pub fn feed_info(&self, feed: FeedId) -> Option<FeedInfo> {
        self.engine.lock().graph.feeds.get(feed.0).map(OutputFeed::info)
    }

    pub fn section_filters(&self, feed: FeedId) -> Vec<FilterId> {
        self.engine
            .lock()
            .graph
            .feeds
            .get(feed.0)
            .map(OutputFeed::filter_ids)
            .unwrap_or_default()
    }

    // ---------------------------------------------------------- de-embedding

    /// Stream for the inner TS `isi` carried on `carrier_pid` of `parent`
    /// (default set when `None`), plus the FeedSet its packets go to.
    /// Requesting an existing pair returns it with one more reference.
    pub fn allocate_deembedded_stream(
        &self,
        carrier_pid: u16,
        isi: u8,
        parent: Option<FeedSetId>,
    ) -> Result<(StreamHandle, FeedSetId)> {
        let _control = self.control.lock();
        self.allocate_stream_locked(carrier_pid, isi, parent)
    }

    fn allocate_stream_locked(
        &self,
        carrier_pid: u16,
        isi: u8,
        parent: Option<FeedSetId>,
    ) -> Result<(StreamHandle, FeedSetId)> {
        if carrier_pid > MAX_PID {
            return Err(DemuxError::InvalidPid(carrier_pid));
        }
        let spare = {
            let engine = self.engine.lock();
            engine.graph.new_feed_set(carrier_pid, isi)
        };
        let mut engine = self.engine.lock();
        let graph = &mut engine.graph;
        let parent = parent.unwrap_or(graph.default_set);
        graph
            .get_or_insert_stream(parent, carrier_pid, isi, spare)
            .ok_or(DemuxError::UnknownHandle)
    }

    pub fn release_deembedded_stream(&self, stream: StreamHandle) -> Result<()> {
        let _control = self.control.lock();
        self.engine
            .lock()
            .graph
            .release_stream(stream)
            .ok_or(DemuxError::UnknownHandle)
    }

    /// Routes `carrier_pid`/`isi` of the physical stream into de-embedding
    /// and makes the inner stream the default FeedSet, or undoes that.
    pub fn set_bbframes_state(&self, enabled: bool, carrier_pid: u16, isi: u8) -> Result<()> {
        let mut control = self.control.lock();
        if let Some(route) = &control.bbframes {
            if enabled && route.carrier_pid == carrier_pid && route.isi == isi {
                return Ok(());
            }
        }

        if let Some(route) = control.bbframes.take() {
            let mut engine = self.engine.lock();
            engine.graph.default_set = engine.graph.root;
            engine.graph.release_stream(route.stream);
            info!(carrier_pid = route.carrier_pid, isi = route.isi, "bbframe de-embedding off");
        }

        if enabled {
            let root = self.root();
            let (stream, set) = self.allocate_stream_locked(carrier_pid, isi, Some(root))?;
            self.engine.lock().graph.default_set = set;
            control.bbframes = Some(BbframeRoute {
                carrier_pid,
                isi,
                stream,
            });
            info!(carrier_pid, isi, "bbframe de-embedding on");
        }
        Ok(())
    }

    // ----------------------------------------------------------------- stats

    pub fn census(&self) -> Census {
        self.engine.lock().graph.census()
    }

    pub fn stats(&self, set: FeedSetId) -> Result<FeedSetStats> {
        self.engine
            .lock()
            .graph
            .stats(set)
            .ok_or(DemuxError::UnknownHandle)
    }
}

/// Error for a feed handle that no longer resolves.
fn gone(op: &'static str) -> DemuxError {
    DemuxError::InvalidState {
        op,
        state: FeedState::Free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::ts_packet;
    use std::sync::{Arc, Mutex as StdMutex};

    type Log = Arc<StdMutex<Vec<(Vec<u8>, BufferFlags)>>>;

    fn recorder(log: &Log) -> TsCallback {
        let log = log.clone();
        Box::new(move |data, flags| log.lock().unwrap().push((data.to_vec(), flags)))
    }

    struct FailingStop;

    impl Frontend for FailingStop {
        fn start_feed(&mut self, _: &FeedInfo) -> std::result::Result<(), FrontendError> {
            Ok(())
        }
        fn stop_feed(&mut self, _: &FeedInfo) -> std::result::Result<(), FrontendError> {
            Err("bus error".into())
        }
    }

    #[test]
    fn state_machine_errors() {
        let dmx = Demux::software(DemuxConfig::default());
        let log = Log::default();
        let f = dmx
            .allocate_ts_feed(0x100, TsType::PACKET, PesType::Other, recorder(&log), None)
            .unwrap();
        assert_eq!(dmx.feed_state(f), FeedState::Ready);
        assert!(matches!(
            dmx.stop_filtering(f),
            Err(DemuxError::InvalidState { state: FeedState::Ready, .. })
        ));
        dmx.start_filtering(f).unwrap();
        assert!(matches!(
            dmx.start_filtering(f),
            Err(DemuxError::InvalidState { state: FeedState::Go, .. })
        ));
        dmx.release_ts_feed(f).unwrap();
        assert_eq!(dmx.feed_state(f), FeedState::Free);
        assert!(matches!(
            dmx.release_ts_feed(f),
            Err(DemuxError::InvalidState { state: FeedState::Free, .. })
        ));
    }

    #[test]
    fn pool_exhaustion_is_busy() {
        let cfg = DemuxConfig {
            feed_num: 2,
            ..DemuxConfig::default()
        };
        let dmx = Demux::software(cfg);
        let log = Log::default();
        for pid in [0x10, 0x11] {
            dmx.allocate_ts_feed(pid, TsType::PACKET, PesType::Other, recorder(&log), None)
                .unwrap();
        }
        assert!(matches!(
            dmx.allocate_ts_feed(0x12, TsType::PACKET, PesType::Other, recorder(&log), None),
            Err(DemuxError::Busy)
        ));
    }

    #[test]
    fn invalid_pid_and_missing_frontend() {
        let dmx = Demux::new(DemuxConfig::default(), None);
        let log = Log::default();
        assert!(matches!(
            dmx.allocate_ts_feed(0x2001, TsType::PACKET, PesType::Other, recorder(&log), None),
            Err(DemuxError::InvalidPid(0x2001))
        ));
        let f = dmx
            .allocate_ts_feed(0x100, TsType::PACKET, PesType::Other, recorder(&log), None)
            .unwrap();
        assert!(matches!(dmx.start_filtering(f), Err(DemuxError::NoDevice)));
        assert!(matches!(
            dmx.inject_unaligned(&[0x47], 200),
            Err(DemuxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn failed_stop_still_stops() {
        let dmx = Demux::new(DemuxConfig::default(), Some(Box::new(FailingStop)));
        let log = Log::default();
        let f = dmx
            .allocate_ts_feed(0x100, TsType::PACKET, PesType::Other, recorder(&log), None)
            .unwrap();
        dmx.start_filtering(f).unwrap();
        assert!(matches!(dmx.stop_filtering(f), Err(DemuxError::Frontend(_))));
        assert_eq!(dmx.feed_state(f), FeedState::Ready);
        dmx.inject_packets(&ts_packet(0x100, 0, false, &[]));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn decoder_slot_is_exclusive() {
        let dmx = Demux::software(DemuxConfig::default());
        let log = Log::default();
        let ty = TsType::DECODER | TsType::DEMUX;
        let a = dmx
            .allocate_ts_feed(0x100, ty, PesType::Video0, recorder(&log), None)
            .unwrap();
        assert!(matches!(
            dmx.allocate_ts_feed(0x101, ty, PesType::Video0, recorder(&log), None),
            Err(DemuxError::Busy)
        ));
        assert!(matches!(
            dmx.allocate_ts_feed(0x101, ty, PesType::Other, recorder(&log), None),
            Err(DemuxError::InvalidArgument(_))
        ));
        dmx.release_ts_feed(a).unwrap();
        dmx.allocate_ts_feed(0x101, ty, PesType::Video0, recorder(&log), None)
            .unwrap();
    }

    #[test]
    fn dvr_feeds_share_one_copy() {
        let dmx = Demux::software(DemuxConfig::default());
        let first = Log::default();
        let second = Log::default();
        let demuxed = Log::default();
        for log in [&first, &second] {
            let f = dmx
                .allocate_ts_feed(0x100, TsType::PACKET, PesType::Other, recorder(log), None)
                .unwrap();
            dmx.start_filtering(f).unwrap();
        }
        let f = dmx
            .allocate_ts_feed(
                0x100,
                TsType::PACKET | TsType::DEMUX,
                PesType::Other,
                recorder(&demuxed),
                None,
            )
            .unwrap();
        dmx.start_filtering(f).unwrap();

        dmx.inject_packets(&ts_packet(0x100, 0, false, &[]));
        assert_eq!(first.lock().unwrap().len(), 1);
        assert!(second.lock().unwrap().is_empty());
        assert_eq!(demuxed.lock().unwrap().len(), 1);
    }

    #[test]
    fn transport_errors_flagged_or_dropped() {
        for feed_err_pkts in [true, false] {
            let cfg = DemuxConfig {
                feed_err_pkts,
                ..DemuxConfig::default()
            };
            let dmx = Demux::software(cfg);
            let log = Log::default();
            let f = dmx
                .allocate_ts_feed(0x100, TsType::PACKET, PesType::Other, recorder(&log), None)
                .unwrap();
            dmx.start_filtering(f).unwrap();

            let mut bad = ts_packet(0x100, 0, false, &[]);
            bad[1] |= 0x80;
            dmx.inject_packets(&bad);
            dmx.inject_packets(&ts_packet(0x100, 0, false, &[]));

            let log = log.lock().unwrap();
            if feed_err_pkts {
                assert_eq!(log.len(), 2);
                assert_eq!(log[0].1, BufferFlags::TEI);
                assert!(log[1].1.is_empty());
            } else {
                // the flag rides on the next delivered packet
                assert_eq!(log.len(), 1);
                assert_eq!(log[0].1, BufferFlags::TEI);
            }
        }
    }

    #[test]
    fn full_stream_feed_and_inject_raw() {
        let dmx = Demux::software(DemuxConfig::default());
        let log = Log::default();
        let f = dmx
            .allocate_ts_feed(PID_FULL_STREAM, TsType::PACKET, PesType::Other, recorder(&log), None)
            .unwrap();
        dmx.start_filtering(f).unwrap();
        dmx.inject_packets(&ts_packet(0x10, 0, false, &[]));
        dmx.inject_packets(&ts_packet(0x11, 0, false, &[]));
        dmx.inject_raw(b"not a packet");
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].0, b"not a packet");
    }

    #[test]
    fn failed_stop_on_release_is_reported() {
        let dmx = Demux::new(DemuxConfig::default(), Some(Box::new(FailingStop)));
        let log = Log::default();
        let f = dmx
            .allocate_ts_feed(0x100, TsType::PACKET, PesType::Other, recorder(&log), None)
            .unwrap();
        dmx.start_filtering(f).unwrap();
        assert!(matches!(dmx.release_ts_feed(f), Err(DemuxError::Frontend(_))));
        // released all the same
        assert_eq!(dmx.feed_state(f), FeedState::Free);
        assert_eq!(dmx.census().feeds, 0);

        // a feed that never started releases without asking the frontend
        let g = dmx
            .allocate_ts_feed(0x101, TsType::PACKET, PesType::Other, recorder(&log), None)
            .unwrap();
        dmx.release_ts_feed(g).unwrap();
    }

    #[test]
    fn idle_feed_collects_no_flags() {
        let dmx = Demux::software(DemuxConfig::default());
        let log = Log::default();
        let f = dmx
            .allocate_ts_feed(0x100, TsType::PACKET, PesType::Other, recorder(&log), None)
            .unwrap();

        let mut bad = ts_packet(0x100, 0, false, &[]);
        bad[1] |= 0x80;
        dmx.inject_packets(&bad);
        dmx.inject_packets(&ts_packet(0x100, 0, false, &[]));
        dmx.inject_packets(&ts_packet(0x100, 7, false, &[]));

        dmx.start_filtering(f).unwrap();
        dmx.inject_packets(&ts_packet(0x100, 8, false, &[]));
        {
            let log = log.lock().unwrap();
            assert_eq!(log.len(), 1);
            assert!(log[0].1.is_empty());
        }

        // same after a stop: errors seen while stopped are not carried over
        dmx.stop_filtering(f).unwrap();
        dmx.inject_packets(&ts_packet(0x100, 12, false, &[]));
        dmx.start_filtering(f).unwrap();
        dmx.inject_packets(&ts_packet(0x100, 13, false, &[]));
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[1].1.is_empty());
    }
}
