//! The node graph behind the hot-path lock: FeedSets, Output Feeds, Stages
//! and Streams, packet dispatch, and reference-counted teardown.

use tracing::{debug, error, trace};

use crate::arena::Arena;
use crate::config::DemuxConfig;
use crate::constants::PID_FULL_STREAM;
use crate::deembed::{self, Stage, Stream, UserPacket};
use crate::feed::{DemuxHooks, OutputFeed};
use crate::feedset::{FeedSet, PacketCheck};
use crate::packet::TsHeader;
use crate::stats::{report_speed, FeedSetStats};
use crate::types::{BufferFlags, Census, FeedId, FeedSetId, StageId, StreamHandle};

pub(crate) struct Graph {
    pub tscheck: bool,
    pub feed_err_pkts: bool,
    pub speedcheck: bool,
    speed_interval: u64,
    pub hooks: DemuxHooks,
    pub feeds: Arena<OutputFeed>,
    pub sets: Arena<FeedSet>,
    pub stages: Arena<Stage>,
    pub streams: Arena<Stream>,
    pub root: FeedSetId,
    /// where packets without an explicit parent land
    pub default_set: FeedSetId,
    pub filters_used: usize,
    pub next_filter_id: u32,
    census: Census,
    /// reconstructed packet buffers, one per nesting level in use
    scratch: Vec<Vec<UserPacket>>,
}

impl Graph {
    pub fn new(config: &DemuxConfig) -> Self {
        let mut sets = Arena::new();
        let mut root_set = FeedSet::new(None, None, config.speed_pkts_interval);
        // held by the demux itself
        root_set.refs = 1;
        let root = FeedSetId(sets.insert(root_set));
        Self {
            tscheck: config.tscheck,
            feed_err_pkts: config.feed_err_pkts,
            speedcheck: config.speedcheck,
            speed_interval: config.speed_pkts_interval,
            hooks: DemuxHooks::default(),
            feeds: Arena::new(),
            sets,
            stages: Arena::new(),
            streams: Arena::new(),
            root,
            default_set: root,
            filters_used: 0,
            next_filter_id: 0,
            census: Census::default(),
            scratch: Vec::new(),
        }
    }

    pub fn census(&self) -> Census {
        Census {
            feed_sets: self.sets.len(),
            stages: self.stages.len(),
            streams: self.streams.len(),
            feeds: self.feeds.len(),
            ..self.census
        }
    }

    pub fn new_feed_set(&self, carrier_pid: u16, isi: u8) -> FeedSet {
        FeedSet::new(Some(carrier_pid), Some(isi), self.speed_interval)
    }

    /// Runs one aligned 188 byte packet through `set_id` and everything
    /// hanging off it.
    pub fn dispatch(&mut self, set_id: FeedSetId, pkt: &[u8]) {
        let Some(hdr) = TsHeader::new(pkt) else {
            return;
        };
        let pid = hdr.pid();
        let Some(set) = self.sets.get_mut(set_id.0) else {
            return;
        };

        if let Some(kbps) = set.count_packet(self.speedcheck) {
            report_speed(set.carrier_pid, set.isi, kbps);
        }
        let check = set.check_packet(&hdr, self.tscheck);
        let stage = set.stages.get(&pid).copied();

        // erroneous packets never reach de-embedding
        if let (Some(stage_id), false) = (stage, check.is_err()) {
            let mut inner = self.scratch.pop().unwrap_or_default();
            let target = match self.stages.get_mut(stage_id.0) {
                Some(stage) => {
                    deembed::process_carrier_packet(stage, &mut self.streams, pkt, &mut inner)
                }
                None => None,
            };
            if let Some(target) = target {
                for up in &inner {
                    trace!(carrier_pid = pid, "dispatching de-embedded packet");
                    self.dispatch(target, up);
                }
            }
            inner.clear();
            self.scratch.push(inner);
        }

        let flag = match check {
            PacketCheck::Ok => BufferFlags::empty(),
            PacketCheck::TransportError => BufferFlags::TEI,
            PacketCheck::ContinuityError => BufferFlags::PKT_COUNTER_MISMATCH,
        };
        let drop = check == PacketCheck::TransportError && !self.feed_err_pkts;

        let Some(set) = self.sets.get_mut(set_id.0) else {
            return;
        };
        let feed_ids = std::mem::take(&mut set.feeds);
        let mut dvr_done = false;
        for id in &feed_ids {
            let Some(feed) = self.feeds.get_mut(id.0) else {
                continue;
            };
            // only started feeds collect flags
            if !feed.filtering || !feed.matches_pid(pid) {
                continue;
            }
            feed.flags |= flag;
            if drop {
                continue;
            }
            if feed.is_dvr() {
                if dvr_done {
                    continue;
                }
                dvr_done = true;
            }
            if feed.pid == PID_FULL_STREAM {
                feed.deliver_raw(pkt);
            } else {
                feed.handle_packet(&hdr, &mut self.hooks);
            }
        }
        if let Some(set) = self.sets.get_mut(set_id.0) {
            set.feeds = feed_ids;
        }
    }

    /// Unparsed bytes to the full-stream raw feeds of the default set.
    pub fn dispatch_raw(&mut self, buf: &[u8]) {
        let Some(set) = self.sets.get(self.default_set.0) else {
            return;
        };
        for id in &set.feeds {
            if let Some(feed) = self.feeds.get_mut(id.0) {
                if feed.pid == PID_FULL_STREAM && feed.is_dvr() {
                    feed.deliver_raw(buf);
                }
            }
        }
    }

    pub fn stats(&self, set_id: FeedSetId) -> Option<FeedSetStats> {
        let set = self.sets.get(set_id.0)?;
        let stream = set
            .owner
            .and_then(|h| self.streams.get(h.0))
            .map(|s| s.counters.clone());
        Some(FeedSetStats {
            carrier_pid: set.carrier_pid,
            isi: set.isi,
            feeds: set.feeds.len(),
            stages: set.stages.len(),
            counters: set.counters.clone(),
            speed_kbps: set.speed.last_kbps(),
            stream,
        })
    }

    pub fn attach_feed(&mut self, set_id: FeedSetId, feed: OutputFeed) -> Option<FeedId> {
        let set = self.sets.get_mut(set_id.0)?;
        let id = FeedId(self.feeds.insert(feed));
        set.feeds.push(id);
        set.refs += 1;
        if let Some(feed) = self.feeds.get_mut(id.0) {
            feed.id = id;
        }
        Some(id)
    }

    /// Drops a feed from its set; the set goes when that was its last reference.
    pub fn detach_feed(&mut self, id: FeedId) -> Option<OutputFeed> {
        let feed = self.feeds.remove(id.0)?;
        if let Some(set) = self.sets.get_mut(feed.set.0) {
            set.feeds.retain(|f| *f != id);
        }
        self.release_set(feed.set);
        Some(feed)
    }

    /// Stream for (`carrier_pid`, `isi`) below `parent`, created from
    /// `spare` when missing. An existing stream gains a reference and `spare`
    /// is dropped.
    pub fn get_or_insert_stream(
        &mut self,
        parent: FeedSetId,
        carrier_pid: u16,
        isi: u8,
        spare: FeedSet,
    ) -> Option<(StreamHandle, FeedSetId)> {
        let parent_set = self.sets.get_mut(parent.0)?;
        let existing = parent_set.stages.get(&carrier_pid).copied();
        let stage_id = match existing {
            Some(id) => id,
            None => {
                parent_set.refs += 1;
                let id = StageId(self.stages.insert(Stage::new(carrier_pid, parent)));
                if let Some(parent_set) = self.sets.get_mut(parent.0) {
                    parent_set.stages.insert(carrier_pid, id);
                }
                debug!(carrier_pid, "de-embedding stage created");
                id
            }
        };
        let stage = self.stages.get_mut(stage_id.0)?;

        if let Some(handle) = stage.streams.get(&isi).copied() {
            let stream = self.streams.get_mut(handle.0)?;
            stream.refs += 1;
            return Some((handle, stream.set));
        }

        let mut spare = spare;
        spare.refs = 1;
        let set_id = FeedSetId(self.sets.insert(spare));
        let mut stream = Stream::new(isi, stage_id, set_id);
        stream.refs = 1;
        let handle = StreamHandle(self.streams.insert(stream));
        stage.register(isi, handle);
        if let Some(set) = self.sets.get_mut(set_id.0) {
            set.owner = Some(handle);
        }
        debug!(carrier_pid, isi, "de-embedded stream created");
        Some((handle, set_id))
    }

    /// Drops one reference; `None` for a stale handle.
    pub fn release_stream(&mut self, handle: StreamHandle) -> Option<()> {
        let stream = self.streams.get_mut(handle.0)?;
        stream.refs -= 1;
        if stream.refs == 0 {
            self.teardown_stream(handle);
        }
        Some(())
    }

    /// Stream, then its FeedSet, then its Stage, then the Stage's parent.
    fn teardown_stream(&mut self, handle: StreamHandle) {
        let Some(stream) = self.streams.remove(handle.0) else {
            return;
        };
        self.census.stream_teardowns += 1;
        debug!(isi = stream.isi, ?stream.counters, "de-embedded stream released");

        if let Some(set) = self.sets.get_mut(stream.set.0) {
            set.owner = None;
        }
        self.release_set(stream.set);

        let Some(stage) = self.stages.get_mut(stream.stage.0) else {
            error!("stream outlived its stage");
            debug_assert!(false, "stream outlived its stage");
            return;
        };
        if stage.unregister(stream.isi) {
            self.teardown_stage(stream.stage);
        }
    }

    fn teardown_stage(&mut self, id: StageId) {
        let Some(stage) = self.stages.remove(id.0) else {
            return;
        };
        self.census.stage_teardowns += 1;
        debug!(carrier_pid = stage.carrier_pid, "de-embedding stage released");
        if let Some(parent) = self.sets.get_mut(stage.parent.0) {
            parent.stages.remove(&stage.carrier_pid);
        }
        self.release_set(stage.parent);
    }

    fn release_set(&mut self, id: FeedSetId) {
        let Some(set) = self.sets.get_mut(id.0) else {
            return;
        };
        set.refs -= 1;
        if set.refs > 0 {
            return;
        }
        if !set.feeds.is_empty() || !set.stages.is_empty() {
            // every feed and stage holds a reference, so this is a counting bug
            error!(
                feeds = set.feeds.len(),
                stages = set.stages.len(),
                "FeedSet released while still referenced"
            );
            debug_assert!(false, "FeedSet released while still referenced");
            return;
        }
        if id == self.default_set {
            self.default_set = self.root;
        }
        self.sets.remove(id.0);
        self.census.feed_set_teardowns += 1;
    }
}
