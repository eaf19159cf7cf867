//! mkv-processor - batch audio/subtitle track extraction for Matroska folders
//!
//! Probes every MKV file in a folder with ffprobe, keeps the preferred audio
//! track in a new container, extracts text subtitles, renames sources after
//! their tracks and records everything in an append-only ledger, optionally
//! mirrored to a GitHub repository.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod media;
pub mod naming;
pub mod prompt;
pub mod scratch;
pub mod selector;
pub mod sync;
pub mod workflow;

#[cfg(test)]
pub mod testing;
