//! Deterministic path layout.
//!
//! A record's files live at
//! `<volume root>/store/<TYPE>/<YYYY>/<MM>/<DD>/<FEED>=<id>.<ext>.bgz`,
//! where `<TYPE>` and `<FEED>` are normalized path fragments of the
//! record's type and feed names. Fragment mappings are cached and
//! optionally persisted so they stay stable across restarts.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::warn;
use time::OffsetDateTime;

use crate::meta::RecordKey;
use crate::store::types::{StreamType, CONTAINER_EXT};
use crate::{Error, Result};

pub const STORE_DIR: &str = "store";

/// What a file name tells us about its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    pub feed_fragment: String,
    pub record_id: u64,
    /// Extension chain, e.g. `[Raw, SegmentIndex]` for `*.dat.seg.bgz`.
    pub types: Vec<StreamType>,
    pub is_lock: bool,
}

#[derive(Debug, Default)]
struct FragmentCache {
    by_name: HashMap<String, String>,
    by_fragment: HashMap<String, String>,
}

/// Maps feed/type names to filesystem-safe fragments and record
/// identities to paths. Owns the fragment cache behind a read-write
/// lock; misses take the write lock, lookups share the read lock.
pub struct PathResolver {
    map_path: Option<PathBuf>,
    fragments: RwLock<FragmentCache>,
}

impl PathResolver {
    /// `map_path` is where the name→fragment map is persisted; `None`
    /// keeps it in memory only.
    pub fn new(map_path: Option<PathBuf>) -> Result<Self> {
        let mut cache = FragmentCache::default();
        if let Some(path) = &map_path {
            if path.exists() {
                let bytes = std::fs::read(path)?;
                let by_name: HashMap<String, String> = serde_json::from_slice(&bytes)
                    .map_err(|_| Error::Format("fragment map is not valid json"))?;
                for (name, fragment) in &by_name {
                    cache
                        .by_fragment
                        .entry(fragment.clone())
                        .or_insert_with(|| name.clone());
                }
                cache.by_name = by_name;
            }
        }
        Ok(Self {
            map_path,
            fragments: RwLock::new(cache),
        })
    }

    /// Fragment for a feed or type name, computing and caching on miss.
    /// Insert-if-absent: a name already mapped keeps its fragment.
    pub fn fragment(&self, name: &str) -> Result<String> {
        {
            let cache = self.fragments.read().expect("fragment cache lock");
            if let Some(fragment) = cache.by_name.get(name) {
                return Ok(fragment.clone());
            }
        }

        let fragment = normalize(name);
        if fragment.is_empty() {
            return Err(Error::InvalidName(name.to_string()));
        }

        let mut cache = self.fragments.write().expect("fragment cache lock");
        // Another thread may have won the race.
        if let Some(existing) = cache.by_name.get(name) {
            return Ok(existing.clone());
        }
        if let Some(other) = cache.by_fragment.get(&fragment) {
            if other != name {
                warn!("non-standard name {name:?}: fragment {fragment:?} already maps {other:?}");
            }
        } else {
            cache.by_fragment.insert(fragment.clone(), name.to_string());
        }
        cache.by_name.insert(name.to_string(), fragment.clone());
        if let Some(path) = &self.map_path {
            persist(path, &cache.by_name)?;
        }
        Ok(fragment)
    }

    /// Path of one of the record's addressable child streams.
    pub fn resolve(&self, volume_root: &Path, key: &RecordKey, child: StreamType) -> Result<PathBuf> {
        debug_assert!(child.is_addressable());
        let type_fragment = self.fragment(&key.stream_type)?;
        let feed_fragment = self.fragment(&key.feed)?;

        let date = OffsetDateTime::from(key.created);
        let mut path = volume_root.join(STORE_DIR);
        path.push(type_fragment);
        path.push(format!("{:04}", date.year()));
        path.push(format!("{:02}", u8::from(date.month())));
        path.push(format!("{:02}", date.day()));
        path.push(format!(
            "{feed_fragment}={:09}.{}.{CONTAINER_EXT}",
            key.id,
            child.extension()
        ));
        Ok(path)
    }

    /// Companion file of a child stream: the extra extension chains in
    /// front of the container suffix (`x.dat.bgz` → `x.dat.seg.bgz`).
    pub fn companion_of(path: &Path, companion: StreamType) -> PathBuf {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let stem = name
            .strip_suffix(&format!(".{CONTAINER_EXT}"))
            .unwrap_or(name);
        path.with_file_name(format!(
            "{stem}.{}.{CONTAINER_EXT}",
            companion.extension()
        ))
    }

    /// Inverse mapping: what record does this file belong to?
    /// Returns `None` for files outside the naming convention.
    pub fn decode(path: &Path) -> Option<DecodedName> {
        let name = path.file_name()?.to_str()?;
        decode_file_name(name)
    }

    /// Every file in the same directory belonging to the same record,
    /// lock files included.
    pub fn sibling_files(path: &Path) -> Result<Vec<PathBuf>> {
        let decoded = Self::decode(path).ok_or(Error::Format("not a store file"))?;
        let prefix = format!("{}={:09}.", decoded.feed_fragment, decoded.record_id);
        let dir = path.parent().ok_or(Error::Format("store file has no parent"))?;

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(&prefix) {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Uppercase, with every character outside `[A-Za-z0-9_]` replaced by
/// an underscore.
fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn decode_file_name(name: &str) -> Option<DecodedName> {
    let (name, is_lock) = match name.strip_suffix(".lock") {
        Some(stripped) => (stripped, true),
        None => (name, false),
    };
    let name = name.strip_suffix(&format!(".{CONTAINER_EXT}"))?;
    let (feed_fragment, rest) = name.split_once('=')?;
    if feed_fragment.is_empty() {
        return None;
    }

    let mut parts = rest.split('.');
    let id = parts.next()?;
    if id.len() != 9 || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let record_id = id.parse().ok()?;

    let types: Vec<StreamType> = parts
        .map(StreamType::from_extension)
        .collect::<Option<_>>()?;
    if types.is_empty() {
        return None;
    }
    Some(DecodedName {
        feed_fragment: feed_fragment.to_string(),
        record_id,
        types,
        is_lock,
    })
}

/// Write the map to a temp file and rename it into place.
fn persist(path: &Path, by_name: &HashMap<String, String>) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(by_name).expect("string map serialises");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(&data)?;
    file.sync_all()?;
    std::fs::rename(tmp, path)?;
    Ok(())
}
