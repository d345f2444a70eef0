pub mod memory_sink;
pub mod metadata;
pub mod stream_file;
