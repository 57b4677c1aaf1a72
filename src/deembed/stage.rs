use std::collections::HashMap;

use crate::types::{FeedSetId, StreamHandle};

/// Carrier demux: one per carrier PID in a FeedSet.
pub(crate) struct Stage {
    pub carrier_pid: u16,
    /// FeedSet whose packets feed this stage; holds one of its references
    pub parent: FeedSetId,
    /// ISI of the last header seen
    pub current_isi: Option<u8>,
    pub current: Option<StreamHandle>,
    pub streams: HashMap<u8, StreamHandle>,
    /// one per registered stream
    pub refs: u32,
}

impl Stage {
    pub fn new(carrier_pid: u16, parent: FeedSetId) -> Self {
        Self {
            carrier_pid,
            parent,
            current_isi: None,
            current: None,
            streams: HashMap::new(),
            refs: 0,
        }
    }

    /// Switches to the stream carrying `isi`, if one is registered.
    pub fn select(&mut self, isi: u8) -> Option<StreamHandle> {
        if self.current_isi != Some(isi) {
            self.current_isi = Some(isi);
            self.current = self.streams.get(&isi).copied();
        }
        self.current
    }

    pub fn register(&mut self, isi: u8, stream: StreamHandle) {
        self.streams.insert(isi, stream);
        self.refs += 1;
        if self.current_isi == Some(isi) {
            self.current = Some(stream);
        }
    }

    /// Returns `true` when the last stream left.
    pub fn unregister(&mut self, isi: u8) -> bool {
        if self.streams.remove(&isi).is_some() {
            self.refs -= 1;
            if self.current_isi == Some(isi) {
                self.current = None;
            }
        }
        self.streams.is_empty()
    }
}
