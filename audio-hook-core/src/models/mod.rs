pub mod audio_models;
pub mod capture_summary;
pub mod config;
pub mod error;
pub mod format;
pub mod state;
