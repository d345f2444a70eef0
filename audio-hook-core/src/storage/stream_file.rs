use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::models::error::HookError;
use crate::traits::sink::{PacketChannel, PacketSink};

pub const STREAM_FILE_MAGIC: &[u8; 4] = b"AHKS";
pub const STREAM_FILE_VERSION: u16 = 1;
const STREAM_FILE_HEADER_SIZE: usize = 6;

/// Packet sink that appends every published packet to a stream file.
///
/// ## File Format
///
/// ```text
/// [4-byte magic "AHKS"][2-byte LE version]
/// [Record 1: 4-byte LE length | packet]
/// [Record 2: ...]
/// ...
/// ```
///
/// Channels share the file; each closed transaction is appended as one
/// record under the writer lock, so records never interleave.
pub struct StreamFileWriter {
    file_path: PathBuf,
    state: Arc<Mutex<Option<OpenFile>>>,
}

struct OpenFile {
    file: BufWriter<File>,
    packets: u64,
    bytes: u64,
}

impl OpenFile {
    fn append(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.file.write_all(&(packet.len() as u32).to_le_bytes())?;
        self.file.write_all(packet)?;
        self.packets += 1;
        self.bytes += 4 + packet.len() as u64;
        Ok(())
    }
}

impl StreamFileWriter {
    /// Create the file and write the stream header.
    pub fn create(file_path: PathBuf) -> Result<Self, HookError> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| HookError::Storage(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&file_path)
            .map_err(|e| HookError::Storage(format!("failed to create file: {}", e)))?;
        let mut file = BufWriter::new(file);
        file.write_all(STREAM_FILE_MAGIC)
            .and_then(|_| file.write_all(&STREAM_FILE_VERSION.to_le_bytes()))
            .map_err(|e| HookError::Storage(format!("failed to write header: {}", e)))?;

        Ok(Self {
            file_path,
            state: Arc::new(Mutex::new(Some(OpenFile {
                file,
                packets: 0,
                bytes: STREAM_FILE_HEADER_SIZE as u64,
            }))),
        })
    }

    /// Flush and close the file, returning its SHA-256 hex digest.
    ///
    /// Channels still open afterwards fail their writes.
    pub fn finish(&self) -> Result<String, HookError> {
        let open = self
            .state
            .lock()
            .take()
            .ok_or_else(|| HookError::Storage("stream file already finished".into()))?;

        let mut file = open.file;
        file.flush()
            .map_err(|e| HookError::Storage(format!("failed to flush stream file: {}", e)))?;
        drop(file);

        log::info!(
            "Finished stream file {} ({} packets, {} bytes)",
            self.file_path.display(),
            open.packets,
            open.bytes
        );
        sha256_file(&self.file_path)
    }

    /// Packets appended so far, or `None` once finished.
    pub fn packets_written(&self) -> Option<u64> {
        self.state.lock().as_ref().map(|open| open.packets)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl PacketSink for StreamFileWriter {
    fn open_channel(&self) -> Result<Box<dyn PacketChannel>, HookError> {
        if self.state.lock().is_none() {
            return Err(HookError::Storage("stream file already finished".into()));
        }
        Ok(Box::new(FileChannel {
            state: Arc::clone(&self.state),
            packet: None,
        }))
    }
}

struct FileChannel {
    state: Arc<Mutex<Option<OpenFile>>>,
    packet: Option<Vec<u8>>,
}

impl PacketChannel for FileChannel {
    fn open_transaction(&mut self) -> Result<(), HookError> {
        let mut packet = self.packet.take().unwrap_or_default();
        packet.clear();
        self.packet = Some(packet);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HookError> {
        let packet = self
            .packet
            .as_mut()
            .ok_or_else(|| HookError::ChannelWrite("no open transaction".into()))?;
        packet.extend_from_slice(bytes);
        Ok(())
    }

    fn close_transaction(&mut self) -> Result<(), HookError> {
        let packet = self
            .packet
            .as_ref()
            .ok_or_else(|| HookError::ChannelWrite("no open transaction".into()))?;

        let mut state = self.state.lock();
        let open = state
            .as_mut()
            .ok_or_else(|| HookError::ChannelWrite("stream file is closed".into()))?;
        open.append(packet)
            .map_err(|e| HookError::ChannelWrite(format!("append failed: {}", e)))?;
        drop(state);

        // Keep the allocation for the next packet.
        if let Some(packet) = self.packet.as_mut() {
            packet.clear();
        }
        Ok(())
    }
}

/// Read every packet of a stream file.
pub fn read_stream_file(path: &Path) -> Result<Vec<Vec<u8>>, HookError> {
    let data = fs::read(path).map_err(|e| HookError::Storage(format!("failed to read stream file: {}", e)))?;
    if data.len() < STREAM_FILE_HEADER_SIZE || &data[0..4] != STREAM_FILE_MAGIC {
        return Err(HookError::Storage("not a stream file".into()));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != STREAM_FILE_VERSION {
        return Err(HookError::Storage(format!("unsupported stream file version {}", version)));
    }

    let mut packets = Vec::new();
    let mut rest = &data[STREAM_FILE_HEADER_SIZE..];
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(HookError::Storage("truncated record length".into()));
        }
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let record = rest
            .get(4..4 + len)
            .ok_or_else(|| HookError::Storage(format!("truncated record of {} bytes", len)))?;
        packets.push(record.to_vec());
        rest = &rest[4 + len..];
    }
    Ok(packets)
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, HookError> {
    let data =
        fs::read(path).map_err(|e| HookError::Storage(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_closed_transactions_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.ahks");
        let writer = StreamFileWriter::create(path.clone()).unwrap();

        let mut channel = writer.open_channel().unwrap();
        channel.write_packet(&[&[1, 2], &[3]]).unwrap();

        // Left unresolved, then discarded by the next transaction.
        channel.open_transaction().unwrap();
        channel.write(&[0xFF; 8]).unwrap();

        channel.open_transaction().unwrap();
        channel.write(&[4, 5]).unwrap();
        channel.close_transaction().unwrap();

        assert_eq!(writer.packets_written(), Some(2));
        let checksum = writer.finish().unwrap();
        assert_eq!(checksum.len(), 64);

        let data = fs::read(&path).unwrap();
        assert_eq!(&data[0..4], b"AHKS");
        assert_eq!(data.len(), 6 + (4 + 3) + (4 + 2));
        assert_eq!(read_stream_file(&path).unwrap(), vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn channels_fail_after_finish() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StreamFileWriter::create(dir.path().join("capture.ahks")).unwrap();
        let mut channel = writer.open_channel().unwrap();

        writer.finish().unwrap();

        let err = channel.write_packet(&[&[1]]).unwrap_err();
        assert!(matches!(err, HookError::ChannelWrite(_)));
        assert!(writer.open_channel().is_err());
        assert!(writer.finish().is_err());
    }

    #[test]
    fn checksum_matches_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("capture.ahks");
        let writer = StreamFileWriter::create(path.clone()).unwrap();
        writer.open_channel().unwrap().write_packet(&[&[7; 32]]).unwrap();
        let checksum = writer.finish().unwrap();

        let expected = hex_encode(&Sha256::digest(&fs::read(&path).unwrap()));
        assert_eq!(checksum, expected);
    }

    #[test]
    fn rejects_foreign_and_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = dir.path().join("foreign.bin");
        fs::write(&foreign, b"RIFF....").unwrap();
        assert!(read_stream_file(&foreign).is_err());

        let truncated = dir.path().join("truncated.ahks");
        let mut data = b"AHKS".to_vec();
        data.extend_from_slice(&STREAM_FILE_VERSION.to_le_bytes());
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3]);
        fs::write(&truncated, data).unwrap();
        assert!(matches!(read_stream_file(&truncated), Err(HookError::Storage(_))));
    }
}
