use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::config::HookConfiguration;
use crate::models::error::HookError;
use crate::models::format::StreamFormat;
use crate::traits::clock::Clock;
use crate::traits::hook_delegate::HookDelegate;

/// Session-wide state shared by the control surface, producers and workers.
pub(crate) struct HookContext {
    pub(crate) config: HookConfiguration,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) capturing: AtomicBool,
    pub(crate) skip_on_busy: AtomicBool,
    delegate: RwLock<Option<Arc<dyn HookDelegate>>>,
}

impl HookContext {
    pub(crate) fn new(config: HookConfiguration, clock: Arc<dyn Clock>) -> Self {
        Self {
            skip_on_busy: AtomicBool::new(config.skip_on_busy),
            capturing: AtomicBool::new(false),
            config,
            clock,
            delegate: RwLock::new(None),
        }
    }

    pub(crate) fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    pub(crate) fn skip_on_busy(&self) -> bool {
        self.skip_on_busy.load(Ordering::SeqCst)
    }

    pub(crate) fn set_delegate(&self, delegate: Arc<dyn HookDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    fn delegate(&self) -> Option<Arc<dyn HookDelegate>> {
        self.delegate.read().clone()
    }

    pub(crate) fn notify_error(&self, stream_id: u32, error: &HookError) {
        if let Some(delegate) = self.delegate() {
            delegate.on_error(stream_id, error);
        }
    }

    pub(crate) fn notify_dropped(&self, stream_id: u32) {
        if let Some(delegate) = self.delegate() {
            delegate.on_buffer_dropped(stream_id);
        }
    }

    pub(crate) fn notify_initialized(&self, stream_id: u32, format: &StreamFormat) {
        if let Some(delegate) = self.delegate() {
            delegate.on_stream_initialized(stream_id, format);
        }
    }
}
