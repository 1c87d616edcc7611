use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::read::GzEncoder;
use flate2::Compression;

use crate::block::header::{ContainerHeader, HEADER_SIZE, MAGIC_MARKER};
use crate::block::index::BlockIndex;
use crate::block::ByteSink;
use crate::Result;

/// Writes an indexed block-gzip container.
///
/// Bytes are buffered until a full block's worth is available, then
/// compressed and framed. The block size is fixed for the lifetime of
/// the file; every block except the last holds exactly `block_size`
/// uncompressed bytes. [`BlockGzipWriter::close`] flushes the partial
/// tail block, appends the index and patches the header; without it the
/// file stays unreadable by design.
pub struct BlockGzipWriter {
    file: File,
    block_size: u64,
    buffer: Vec<u8>,
    index: BlockIndex,
    /// Next write position in the file.
    file_pos: u64,
    /// Total uncompressed bytes accepted.
    data_len: u64,
}

impl BlockGzipWriter {
    /// Create (or truncate) the container at `path`.
    pub fn create(path: &Path, block_size: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&ContainerHeader::placeholder(block_size).encode())?;
        Ok(Self {
            file,
            block_size,
            buffer: Vec::with_capacity(block_size as usize),
            index: BlockIndex::new(),
            file_pos: HEADER_SIZE,
            data_len: 0,
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Uncompressed bytes written so far.
    pub fn position(&self) -> u64 {
        self.data_len
    }

    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let room = self.block_size as usize - self.buffer.len();
            let take = room.min(buf.len());
            self.buffer.extend_from_slice(&buf[..take]);
            buf = &buf[take..];
            if self.buffer.len() == self.block_size as usize {
                self.emit_block()?;
            }
        }
        self.data_len = self
            .index
            .entries()
            .last()
            .map(|e| e.uncompressed_offset + e.uncompressed_len)
            .unwrap_or(0)
            + self.buffer.len() as u64;
        Ok(())
    }

    /// Compress and frame the buffered block.
    fn emit_block(&mut self) -> Result<()> {
        let mut compressed = Vec::new();
        GzEncoder::new(&self.buffer[..], Compression::default())
            .read_to_end(&mut compressed)?;

        let block_start = self.file_pos;
        self.file.write_all(&MAGIC_MARKER)?;
        self.file
            .write_all(&(compressed.len() as u64).to_be_bytes())?;
        self.file.write_all(&compressed)?;
        self.file.write_all(&MAGIC_MARKER)?;
        self.file_pos += 8 + 8 + compressed.len() as u64 + 8;

        self.index.push(block_start, self.buffer.len() as u64);
        self.buffer.clear();
        Ok(())
    }

    /// Flush the tail block, write the index and patch the header.
    pub fn close(mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.emit_block()?;
        }

        let index_offset = self.file_pos;
        let index_bytes = self.index.encode();
        self.file.write_all(&index_bytes)?;
        let eof_offset = index_offset + index_bytes.len() as u64;

        let header = ContainerHeader {
            block_size: self.block_size,
            data_len: self.data_len,
            index_offset,
            eof_offset,
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.encode())?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl ByteSink for BlockGzipWriter {
    fn position(&self) -> u64 {
        BlockGzipWriter::position(self)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        BlockGzipWriter::write_all(self, buf)
    }

    fn close(self) -> Result<()> {
        BlockGzipWriter::close(self)
    }
}
