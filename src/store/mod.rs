//! Record store: routes a logical record to its child-stream files.
//!
//! A write resolves a volume through the selection policy, takes the
//! advisory lock, and hands out segment writers per child stream. A
//! read resolves the same paths deterministically, with the volume
//! coming from the metadata collaborator.

mod paths;
mod types;

pub use paths::{DecodedName, PathResolver, STORE_DIR};
pub use types::{StreamType, CONTAINER_EXT};

pub use crate::meta::RecordKey;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::block::{BlockGzipReader, BlockGzipWriter};
use crate::config::StoreConfig;
use crate::lock::LockFile;
use crate::meta::MetaLookup;
use crate::segment::{SegmentReader, SegmentWriter};
use crate::volume::{CapacityProbe, CapacityTracker, SelectorPolicy, Volume, VolumeSelector};
use crate::{Error, Result};

pub struct Store {
    config: StoreConfig,
    resolver: Arc<PathResolver>,
    selector: VolumeSelector,
    tracker: CapacityTracker,
    meta: Arc<dyn MetaLookup>,
    volumes: RwLock<Vec<Volume>>,
}

impl Store {
    pub fn new(
        config: StoreConfig,
        meta: Arc<dyn MetaLookup>,
        probe: Box<dyn CapacityProbe>,
    ) -> Result<Self> {
        let resolver = Arc::new(PathResolver::new(config.fragment_map_path.clone())?);
        let selector = VolumeSelector::new(SelectorPolicy::from_config(&config.selector));
        let tracker = CapacityTracker::new(probe, config.capacity_ttl);
        Ok(Self {
            config,
            resolver,
            selector,
            tracker,
            meta,
            volumes: RwLock::new(Vec::new()),
        })
    }

    /// Replace the volume registry snapshot. The registry itself is
    /// owned externally; the store only consumes it.
    pub fn set_volumes(&self, volumes: Vec<Volume>) {
        *self.volumes.write().expect("volume registry lock") = volumes;
    }

    pub fn volumes(&self) -> Vec<Volume> {
        self.volumes.read().expect("volume registry lock").clone()
    }

    pub fn resolver(&self) -> &Arc<PathResolver> {
        &self.resolver
    }

    pub fn capacity_tracker(&self) -> &CapacityTracker {
        &self.tracker
    }

    pub fn meta(&self) -> &Arc<dyn MetaLookup> {
        &self.meta
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Pick the volume for a new record: active volumes only, capacity
    /// annotated from the tracker, ranked by the configured policy.
    fn place(&self) -> Result<Volume> {
        let mut candidates: Vec<Volume> = self
            .volumes
            .read()
            .expect("volume registry lock")
            .iter()
            .filter(|v| v.is_writable())
            .cloned()
            .collect();
        for volume in &mut candidates {
            self.tracker.annotate(volume);
        }
        self.selector
            .select(&candidates)
            .cloned()
            .ok_or(Error::NoVolume)
    }

    /// Open a record for writing. The chosen volume is reported via
    /// [`StreamTarget::volume_id`]; recording the association is the
    /// caller's responsibility.
    pub fn open_target(&self, key: &RecordKey) -> Result<StreamTarget> {
        let volume = self.place()?;
        let raw_path = self.resolver.resolve(&volume.path, key, StreamType::Raw)?;
        let meta_path = self.resolver.resolve(&volume.path, key, StreamType::Meta)?;
        let context_path = self
            .resolver
            .resolve(&volume.path, key, StreamType::Context)?;
        if let Some(parent) = raw_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock = LockFile::acquire(&raw_path)?;
        debug!("record {} opens on volume {}", key.id, volume.id);

        let block_size = self.config.block_size;
        let raw = open_segment_writer(&raw_path, block_size)?;
        Ok(StreamTarget {
            volume_id: volume.id,
            block_size,
            meta_path,
            context_path,
            raw_path,
            raw,
            boundary: None,
            meta: None,
            context: None,
            lock: Some(lock),
        })
    }

    /// Open a record for reading. Fails with `NotFound` if the
    /// metadata collaborator has no volume for it.
    pub fn open_source(&self, key: &RecordKey) -> Result<StreamSource> {
        let volume_id = self
            .meta
            .volume_for_record(key.id)?
            .ok_or_else(|| Error::Io(ErrorKind::NotFound.into()))?;
        let volume = self
            .volumes
            .read()
            .expect("volume registry lock")
            .iter()
            .find(|v| v.id == volume_id)
            .cloned()
            .ok_or_else(|| Error::Io(ErrorKind::NotFound.into()))?;

        Ok(StreamSource {
            raw_path: self.resolver.resolve(&volume.path, key, StreamType::Raw)?,
            meta_path: self.resolver.resolve(&volume.path, key, StreamType::Meta)?,
            context_path: self
                .resolver
                .resolve(&volume.path, key, StreamType::Context)?,
        })
    }
}

fn open_segment_writer(
    data_path: &std::path::Path,
    block_size: u64,
) -> Result<SegmentWriter<BlockGzipWriter>> {
    let index_path = PathResolver::companion_of(data_path, StreamType::SegmentIndex);
    let data = BlockGzipWriter::create(data_path, block_size)?;
    let index = BlockGzipWriter::create(&index_path, block_size)?;
    Ok(SegmentWriter::new(data, index))
}

/// Write handle for one record: the raw stream plus lazily created
/// meta/context streams, all finalized together at close.
pub struct StreamTarget {
    volume_id: u32,
    block_size: u64,
    raw_path: PathBuf,
    meta_path: PathBuf,
    context_path: PathBuf,
    raw: SegmentWriter<BlockGzipWriter>,
    /// Part-boundary index over the raw stream.
    boundary: Option<BlockGzipWriter>,
    meta: Option<SegmentWriter<BlockGzipWriter>>,
    context: Option<SegmentWriter<BlockGzipWriter>>,
    lock: Option<LockFile>,
}

impl StreamTarget {
    pub fn volume_id(&self) -> u32 {
        self.volume_id
    }

    pub fn raw(&mut self) -> &mut SegmentWriter<BlockGzipWriter> {
        &mut self.raw
    }

    pub fn meta(&mut self) -> Result<&mut SegmentWriter<BlockGzipWriter>> {
        if self.meta.is_none() {
            self.meta = Some(open_segment_writer(&self.meta_path, self.block_size)?);
        }
        Ok(self.meta.as_mut().expect("meta writer open"))
    }

    pub fn context(&mut self) -> Result<&mut SegmentWriter<BlockGzipWriter>> {
        if self.context.is_none() {
            self.context = Some(open_segment_writer(&self.context_path, self.block_size)?);
        }
        Ok(self.context.as_mut().expect("context writer open"))
    }

    /// Mark the end of the current part of the raw stream. Parts are a
    /// coarser division than segments, kept in their own index.
    pub fn add_part(&mut self) -> Result<()> {
        if self.boundary.is_none() {
            let path = PathResolver::companion_of(&self.raw_path, StreamType::BoundaryIndex);
            let mut writer = BlockGzipWriter::create(&path, self.block_size)?;
            writer.write_all(&0u64.to_be_bytes())?;
            self.boundary = Some(writer);
        }
        let offset = self.raw.position();
        self.boundary
            .as_mut()
            .expect("boundary writer open")
            .write_all(&offset.to_be_bytes())
    }

    /// Finalize every open container and release the lock.
    pub fn close(mut self) -> Result<()> {
        self.raw.close()?;
        if let Some(boundary) = self.boundary.take() {
            boundary.close()?;
        }
        if let Some(meta) = self.meta.take() {
            meta.close()?;
        }
        if let Some(context) = self.context.take() {
            context.close()?;
        }
        if let Some(lock) = self.lock.take() {
            lock.release()?;
        }
        Ok(())
    }
}

/// Read handle for one record.
pub struct StreamSource {
    raw_path: PathBuf,
    meta_path: PathBuf,
    context_path: PathBuf,
}

impl StreamSource {
    fn child_path(&self, child: StreamType) -> Option<&PathBuf> {
        match child {
            StreamType::Raw => Some(&self.raw_path),
            StreamType::Meta => Some(&self.meta_path),
            StreamType::Context => Some(&self.context_path),
            _ => None,
        }
    }

    /// Child streams present on disk for this record.
    pub fn child_types(&self) -> Vec<StreamType> {
        StreamType::ADDRESSABLE
            .into_iter()
            .filter(|t| self.child_path(*t).is_some_and(|p| p.exists()))
            .collect()
    }

    /// Open a child stream. Unknown or absent children are `Ok(None)`
    /// so callers can treat them as optional.
    pub fn open_child(&self, child: StreamType) -> Result<Option<SegmentReader<BlockGzipReader>>> {
        let Some(data_path) = self.child_path(child) else {
            return Ok(None);
        };
        if !data_path.exists() {
            return Ok(None);
        }
        let data = BlockGzipReader::open(data_path)?;
        let index_path = PathResolver::companion_of(data_path, StreamType::SegmentIndex);
        let index = if index_path.exists() {
            Some(BlockGzipReader::open(&index_path)?)
        } else {
            None
        };
        Ok(Some(SegmentReader::new(data, index)?))
    }

    pub fn open_raw(&self) -> Result<Option<SegmentReader<BlockGzipReader>>> {
        self.open_child(StreamType::Raw)
    }

    /// View of the raw stream divided by part boundaries instead of
    /// segments.
    pub fn open_parts(&self) -> Result<Option<SegmentReader<BlockGzipReader>>> {
        if !self.raw_path.exists() {
            return Ok(None);
        }
        let data = BlockGzipReader::open(&self.raw_path)?;
        let index_path = PathResolver::companion_of(&self.raw_path, StreamType::BoundaryIndex);
        let index = if index_path.exists() {
            Some(BlockGzipReader::open(&index_path)?)
        } else {
            None
        };
        Ok(Some(SegmentReader::new(data, index)?))
    }
}
