use crate::models::error::HookError;

/// Downstream packet sink a hook session forwards captured audio into.
///
/// Bound once per session. Implemented by:
/// - `MemorySink` (in-memory, used by tests)
/// - `StreamFileWriter` (length-prefixed stream file)
pub trait PacketSink: Send + Sync {
    /// Open a write channel for one stream initialization.
    fn open_channel(&self) -> Result<Box<dyn PacketChannel>, HookError>;
}

/// Append-only write channel owned by exactly one capture worker.
///
/// A packet is built inside a transaction and becomes visible downstream
/// only when the transaction is closed.
pub trait PacketChannel: Send {
    /// Start a new packet. Discards any transaction left unresolved by a
    /// failed write.
    fn open_transaction(&mut self) -> Result<(), HookError>;

    /// Append bytes to the open packet.
    fn write(&mut self, bytes: &[u8]) -> Result<(), HookError>;

    /// Publish the open packet.
    fn close_transaction(&mut self) -> Result<(), HookError>;

    /// Write `parts` as one packet.
    fn write_packet(&mut self, parts: &[&[u8]]) -> Result<(), HookError> {
        self.open_transaction()?;
        for part in parts {
            self.write(part)?;
        }
        self.close_transaction()
    }
}
