//! Filesystem-backed storage tier for immutable event-stream records.
//!
//! Records are persisted as indexed block-gzip containers that support
//! random access into compressed data. A record may consist of several
//! named child streams (raw payload, metadata, context), each segment
//! addressable. Writes are placed across a pool of volumes by a
//! configurable selection policy; background sweeps reclaim orphaned
//! files and physically purge logically deleted records.

pub mod block;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod meta;
pub mod segment;
pub mod store;
pub mod volume;

pub use block::{BlockGzipReader, BlockGzipWriter, DEFAULT_BLOCK_SIZE};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use segment::{SegmentReader, SegmentWriter};
pub use store::{RecordKey, Store, StreamSource, StreamTarget, StreamType};
pub use volume::{
    CapacitySnapshot, CapacityTracker, SelectorPolicy, Volume, VolumeKind, VolumeSelector,
    VolumeStatus,
};
