//! `growthlog` - Track plant growth from a small web form
//!
//! This library provides the record store, the growth series builder, photo
//! upload storage and the axum application serving the entry form and chart.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod logging;
pub mod series;
pub mod storage;
pub mod uploads;
pub mod web;

pub use config::Config;
pub use entry::{PlantEntry, PlantEntryDraft};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use series::{build_series, Series};
pub use storage::{Storage, StorageStats};
pub use uploads::{StoredFileRef, UploadStore};
