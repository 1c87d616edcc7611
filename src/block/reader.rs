use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::block::header::{ContainerHeader, HEADER_SIZE, MAGIC_MARKER};
use crate::block::index::BlockIndex;
use crate::block::ByteSource;
use crate::{Error, Result};

/// One decompressed block kept in memory per reader.
struct CachedBlock {
    /// Uncompressed offset of the first byte of this block.
    start: u64,
    data: Vec<u8>,
    /// File offset of the block that follows this one.
    next_file_offset: u64,
}

/// Reads an indexed block-gzip container.
///
/// Sequential reads walk the framed blocks without touching the index;
/// the trailing index is loaded lazily the first time a seek lands
/// outside the current block. Each reader owns its position and block
/// cache, so any number of readers may share one closed file.
pub struct BlockGzipReader {
    file: File,
    header: ContainerHeader,
    index: Option<BlockIndex>,
    /// Uncompressed read position.
    pos: u64,
    cached: Option<CachedBlock>,
}

impl BlockGzipReader {
    /// Open a finalized container for reading. Fails with a format
    /// error if the file carries an unknown identifier or was never
    /// closed properly.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; HEADER_SIZE as usize];
        if file.metadata()?.len() < HEADER_SIZE {
            return Err(Error::Format("file too small for container header"));
        }
        file.read_exact(&mut buf)?;
        let header = ContainerHeader::decode(&buf)?;
        if !header.is_finalized() {
            return Err(Error::Format("container was not finalized"));
        }
        if file.metadata()?.len() < header.eof_offset {
            return Err(Error::Format("container truncated"));
        }
        Ok(Self {
            file,
            header,
            index: None,
            pos: 0,
            cached: None,
        })
    }

    pub fn block_size(&self) -> u64 {
        self.header.block_size
    }

    /// Total uncompressed data length.
    pub fn size(&self) -> u64 {
        self.header.data_len
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Position the next read at the given uncompressed offset.
    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// Read up to `buf.len()` uncompressed bytes; 0 at end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.pos >= self.header.data_len {
            return Ok(0);
        }
        loop {
            if let Some(cached) = &self.cached {
                let end = cached.start + cached.data.len() as u64;
                if self.pos >= cached.start && self.pos < end {
                    let in_block = (self.pos - cached.start) as usize;
                    let take = buf.len().min(cached.data.len() - in_block);
                    buf[..take].copy_from_slice(&cached.data[in_block..in_block + take]);
                    self.pos += take as u64;
                    return Ok(take);
                }
            }
            self.load_block_for(self.pos)?;
        }
    }

    /// Bring the block containing `pos` into the cache. Contiguous
    /// sequential reads follow the frame chain; anything else goes
    /// through the index.
    fn load_block_for(&mut self, pos: u64) -> Result<()> {
        let sequential = match &self.cached {
            Some(cached) if pos == cached.start + cached.data.len() as u64 => {
                Some((cached.next_file_offset, pos))
            }
            None if pos == 0 => Some((HEADER_SIZE, 0)),
            _ => None,
        };

        let (file_offset, start) = match sequential {
            Some(target) => target,
            None => {
                self.ensure_index()?;
                let entry = self
                    .index
                    .as_ref()
                    .expect("index loaded")
                    .entry_for_offset(pos)
                    .ok_or(Error::Corrupt("no block covers read offset"))?;
                (entry.file_offset, entry.uncompressed_offset)
            }
        };

        let (data, next_file_offset) = self.read_block_at(file_offset)?;
        self.cached = Some(CachedBlock {
            start,
            data,
            next_file_offset,
        });
        Ok(())
    }

    /// Decompress the block whose leading marker sits at `file_offset`,
    /// validating the framing on both sides.
    fn read_block_at(&mut self, file_offset: u64) -> Result<(Vec<u8>, u64)> {
        self.file.seek(SeekFrom::Start(file_offset))?;

        let mut marker = [0u8; 8];
        self.file.read_exact(&mut marker)?;
        if marker != MAGIC_MARKER {
            return Err(Error::Corrupt("bad leading block marker"));
        }

        let mut len_buf = [0u8; 8];
        self.file.read_exact(&mut len_buf)?;
        let compressed_len = u64::from_be_bytes(len_buf);
        let block_end = file_offset + 8 + 8 + compressed_len + 8;
        if block_end > self.header.index_offset {
            return Err(Error::Corrupt("block overruns the index"));
        }

        let mut compressed = vec![0u8; compressed_len as usize];
        self.file.read_exact(&mut compressed)?;

        self.file.read_exact(&mut marker)?;
        if marker != MAGIC_MARKER {
            return Err(Error::Corrupt("bad trailing block marker"));
        }

        let mut data = Vec::with_capacity(self.header.block_size as usize);
        GzDecoder::new(&compressed[..]).read_to_end(&mut data)?;
        if data.len() as u64 > self.header.block_size {
            return Err(Error::Corrupt("block exceeds declared block size"));
        }
        Ok((data, block_end))
    }

    fn ensure_index(&mut self) -> Result<()> {
        if self.index.is_some() {
            return Ok(());
        }
        let len = (self.header.eof_offset - self.header.index_offset) as usize;
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(self.header.index_offset))?;
        self.file.read_exact(&mut buf)?;
        let index = BlockIndex::decode(&buf)?;
        let indexed: u64 = index.entries().iter().map(|e| e.uncompressed_len).sum();
        if indexed != self.header.data_len {
            return Err(Error::Corrupt("index does not cover the data length"));
        }
        self.index = Some(index);
        Ok(())
    }
}

impl ByteSource for BlockGzipReader {
    fn size(&self) -> u64 {
        BlockGzipReader::size(self)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        BlockGzipReader::seek(self, pos);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        BlockGzipReader::read(self, buf)
    }
}
