use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::audio_models::{DeviceHandle, StreamId};
use crate::models::state::CallingMode;
use crate::session::stream::StreamState;

#[derive(Default)]
struct Entries {
    streams: Vec<Arc<StreamState>>,
    by_handle: HashMap<DeviceHandle, StreamId>,
}

/// Arena of stream states keyed by device handle.
///
/// Entries are created lazily and only removed by [`StreamRegistry::drain`].
/// A `StreamId` stays valid until the next drain.
#[derive(Default)]
pub(crate) struct StreamRegistry {
    entries: RwLock<Entries>,
}

impl StreamRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Existing entry for `handle`, or a fresh one created with `mode`.
    pub(crate) fn get_or_create(&self, handle: DeviceHandle, mode: CallingMode) -> Arc<StreamState> {
        if let Some(stream) = self.lookup(handle) {
            return stream;
        }

        let mut entries = self.entries.write();
        if let Some(id) = entries.by_handle.get(&handle) {
            return Arc::clone(&entries.streams[id.index()]);
        }

        let id = StreamId(entries.streams.len());
        let stream = Arc::new(StreamState::new(id, handle, mode));
        entries.streams.push(Arc::clone(&stream));
        entries.by_handle.insert(handle, id);
        log::debug!("Registered stream {} for device {} ({:?})", id, handle, mode);
        stream
    }

    pub(crate) fn lookup(&self, handle: DeviceHandle) -> Option<Arc<StreamState>> {
        let entries = self.entries.read();
        entries
            .by_handle
            .get(&handle)
            .map(|id| Arc::clone(&entries.streams[id.index()]))
    }

    /// Whether `stream` is still the entry registered for its handle.
    pub(crate) fn is_current(&self, stream: &Arc<StreamState>) -> bool {
        self.lookup(stream.handle)
            .map_or(false, |current| Arc::ptr_eq(&current, stream))
    }

    pub(crate) fn all(&self) -> Vec<Arc<StreamState>> {
        self.entries.read().streams.clone()
    }

    /// Swap the entry at `stream.id` for `stream`, keeping its identity.
    pub(crate) fn replace(&self, stream: Arc<StreamState>) {
        let mut entries = self.entries.write();
        if let Some(slot) = entries.streams.get_mut(stream.id.index()) {
            *slot = stream;
        }
    }

    /// Remove and return every entry.
    pub(crate) fn drain(&self) -> Vec<Arc<StreamState>> {
        let mut entries = self.entries.write();
        entries.by_handle.clear();
        std::mem::take(&mut entries.streams)
    }
}
