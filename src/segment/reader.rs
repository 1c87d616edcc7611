use std::collections::{BTreeSet, VecDeque};

use crate::block::ByteSource;
use crate::{Error, Result};

/// Which segments a read pass covers. `include` and `exclude` switch
/// the mode wholesale; the two sets are never mixed.
#[derive(Debug, Clone)]
enum Selection {
    All,
    AllExcept(BTreeSet<u64>),
    OnlyThese(BTreeSet<u64>),
}

/// Reads a data container as a sequence of logical segments.
///
/// The companion index holds the start offset of every segment; an
/// absent or empty index means the whole stream is one segment.
/// Selection must be fixed before the first read.
#[derive(Debug)]
pub struct SegmentReader<S: ByteSource> {
    data: S,
    starts: Vec<u64>,
    selection: Selection,
    reading: bool,
    ranges: VecDeque<(u64, u64)>,
    /// Active range as (next position, end).
    current: Option<(u64, u64)>,
}

impl<S: ByteSource> SegmentReader<S> {
    /// Open over a data source and its boundary index source.
    pub fn new(data: S, index: Option<S>) -> Result<Self> {
        let starts = match index {
            Some(mut index) => read_offsets(&mut index)?,
            None => Vec::new(),
        };
        if let Some(&first) = starts.first() {
            if first != 0 {
                return Err(Error::Corrupt("segment index does not start at zero"));
            }
        }
        if starts.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Corrupt("segment index is not monotonic"));
        }
        if starts.last().is_some_and(|&last| last > data.size()) {
            return Err(Error::Corrupt("segment index exceeds the data length"));
        }
        Ok(Self {
            data,
            starts,
            selection: Selection::All,
            reading: false,
            ranges: VecDeque::new(),
            current: None,
        })
    }

    /// Number of segments in the stream.
    pub fn count(&self) -> u64 {
        self.starts.len().max(1) as u64
    }

    /// Total data length in bytes.
    pub fn size(&self) -> u64 {
        self.data.size()
    }

    /// Byte range `[start, end)` covered by segment `n`.
    pub fn segment_range(&self, n: u64) -> Result<(u64, u64)> {
        self.check_bounds(n)?;
        if self.starts.is_empty() {
            return Ok((0, self.data.size()));
        }
        let start = self.starts[n as usize];
        let end = self
            .starts
            .get(n as usize + 1)
            .copied()
            .unwrap_or_else(|| self.data.size());
        Ok((start, end))
    }

    pub fn include(&mut self, n: u64) -> Result<()> {
        self.check_mutable()?;
        self.check_bounds(n)?;
        if !matches!(self.selection, Selection::OnlyThese(_)) {
            self.selection = Selection::OnlyThese(BTreeSet::new());
        }
        if let Selection::OnlyThese(set) = &mut self.selection {
            set.insert(n);
        }
        Ok(())
    }

    pub fn exclude(&mut self, n: u64) -> Result<()> {
        self.check_mutable()?;
        self.check_bounds(n)?;
        if !matches!(self.selection, Selection::AllExcept(_)) {
            self.selection = Selection::AllExcept(BTreeSet::new());
        }
        if let Selection::AllExcept(set) = &mut self.selection {
            set.insert(n);
        }
        Ok(())
    }

    /// Reset to the default: every segment is read.
    pub fn include_all(&mut self) -> Result<()> {
        self.check_mutable()?;
        self.selection = Selection::All;
        Ok(())
    }

    /// Drop every segment; reads return nothing until `include` is
    /// called.
    pub fn exclude_all(&mut self) -> Result<()> {
        self.check_mutable()?;
        self.selection = Selection::OnlyThese(BTreeSet::new());
        Ok(())
    }

    /// Read from the selected segments in ascending order; 0 at end.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.reading {
            self.ranges = self.plan()?;
            self.current = None;
            self.reading = true;
        }
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.current {
                Some((pos, end)) if pos < end => {
                    let take = buf.len().min((end - pos) as usize);
                    let n = self.data.read(&mut buf[..take])?;
                    if n == 0 {
                        return Ok(0);
                    }
                    self.current = Some((pos + n as u64, end));
                    return Ok(n);
                }
                _ => match self.ranges.pop_front() {
                    Some((start, end)) => {
                        self.data.seek(start)?;
                        self.current = Some((start, end));
                    }
                    None => return Ok(0),
                },
            }
        }
    }

    /// Drain the selected segments into a vector.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    fn plan(&self) -> Result<VecDeque<(u64, u64)>> {
        let mut ranges = VecDeque::new();
        match &self.selection {
            Selection::All => {
                if self.data.size() > 0 {
                    ranges.push_back((0, self.data.size()));
                }
            }
            Selection::OnlyThese(set) => {
                for &n in set {
                    let (start, end) = self.segment_range(n)?;
                    if start < end {
                        ranges.push_back((start, end));
                    }
                }
            }
            Selection::AllExcept(set) => {
                for n in 0..self.count() {
                    if set.contains(&n) {
                        continue;
                    }
                    let (start, end) = self.segment_range(n)?;
                    if start < end {
                        ranges.push_back((start, end));
                    }
                }
            }
        }
        Ok(ranges)
    }

    fn check_mutable(&self) -> Result<()> {
        if self.reading {
            return Err(Error::SelectionLocked);
        }
        Ok(())
    }

    fn check_bounds(&self, n: u64) -> Result<()> {
        if n >= self.count() {
            return Err(Error::SegmentRange {
                segment: n,
                count: self.count(),
            });
        }
        Ok(())
    }
}

/// Drain a boundary-index source into its list of 8-byte offsets.
fn read_offsets<S: ByteSource>(index: &mut S) -> Result<Vec<u64>> {
    let size = index.size();
    if size % 8 != 0 {
        return Err(Error::Corrupt("segment index is misaligned"));
    }
    let mut bytes = Vec::with_capacity(size as usize);
    let mut buf = [0u8; 4096];
    loop {
        let n = index.read(&mut buf)?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&buf[..n]);
    }
    if bytes.len() as u64 != size {
        return Err(Error::Corrupt("segment index shorter than declared"));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| u64::from_be_bytes(c.try_into().expect("slice length")))
        .collect())
}
