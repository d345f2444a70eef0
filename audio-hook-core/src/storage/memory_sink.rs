use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::HookError;
use crate::traits::sink::{PacketChannel, PacketSink};

#[derive(Default)]
struct Shared {
    packets: Mutex<Vec<Vec<u8>>>,
    published: Condvar,
}

/// Packet sink that keeps every published packet in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    shared: Arc<Shared>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all packets published so far, in publication order.
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.shared.packets.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.shared.packets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` packets were published. Returns false
    /// on timeout.
    pub fn wait_for_packets(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut packets = self.shared.packets.lock();
        while packets.len() < count {
            if self.shared.published.wait_until(&mut packets, deadline).timed_out() {
                return packets.len() >= count;
            }
        }
        true
    }
}

impl PacketSink for MemorySink {
    fn open_channel(&self) -> Result<Box<dyn PacketChannel>, HookError> {
        Ok(Box::new(MemoryChannel {
            shared: Arc::clone(&self.shared),
            packet: None,
        }))
    }
}

struct MemoryChannel {
    shared: Arc<Shared>,
    packet: Option<Vec<u8>>,
}

impl PacketChannel for MemoryChannel {
    fn open_transaction(&mut self) -> Result<(), HookError> {
        self.packet = Some(Vec::new());
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HookError> {
        self.packet
            .as_mut()
            .ok_or_else(|| HookError::ChannelWrite("no open transaction".into()))?
            .extend_from_slice(bytes);
        Ok(())
    }

    fn close_transaction(&mut self) -> Result<(), HookError> {
        let packet = self
            .packet
            .take()
            .ok_or_else(|| HookError::ChannelWrite("no open transaction".into()))?;
        self.shared.packets.lock().push(packet);
        self.shared.published.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn publishes_on_close_only() {
        let sink = MemorySink::new();
        let mut channel = sink.open_channel().unwrap();

        channel.open_transaction().unwrap();
        channel.write(&[1, 2]).unwrap();
        assert!(sink.is_empty());

        channel.write(&[3]).unwrap();
        channel.close_transaction().unwrap();
        assert_eq!(sink.packets(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn write_without_transaction_fails() {
        let sink = MemorySink::new();
        let mut channel = sink.open_channel().unwrap();
        assert!(matches!(channel.write(&[1]), Err(HookError::ChannelWrite(_))));
        assert!(channel.close_transaction().is_err());
    }

    #[test]
    fn wait_for_packets_sees_other_threads() {
        let sink = MemorySink::new();
        let producer = {
            let sink = sink.clone();
            thread::spawn(move || {
                let mut channel = sink.open_channel().unwrap();
                for i in 0..3u8 {
                    channel.write_packet(&[&[i]]).unwrap();
                }
            })
        };

        assert!(sink.wait_for_packets(3, Duration::from_secs(5)));
        producer.join().unwrap();
        assert!(!sink.wait_for_packets(4, Duration::from_millis(10)));
    }
}
