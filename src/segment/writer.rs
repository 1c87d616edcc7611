use crate::block::ByteSink;
use crate::Result;

/// Writes a data stream together with its segment boundary index.
///
/// The data and index sinks are independent containers. The first
/// write (or boundary) records segment start 0; each `add_segment`
/// call records the current data offset as the start of the next
/// segment.
pub struct SegmentWriter<S: ByteSink> {
    data: S,
    index: S,
    started: bool,
    segment_count: u64,
}

impl<S: ByteSink> SegmentWriter<S> {
    pub fn new(data: S, index: S) -> Self {
        Self {
            data,
            index,
            started: false,
            segment_count: 0,
        }
    }

    /// Uncompressed bytes written to the data stream.
    pub fn position(&self) -> u64 {
        self.data.position()
    }

    /// Segments recorded so far (at least 1 once anything was written).
    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if !buf.is_empty() {
            self.ensure_started()?;
        }
        self.data.write_all(buf)
    }

    /// Mark the end of the current segment; subsequent bytes belong to
    /// the next one.
    pub fn add_segment(&mut self) -> Result<()> {
        self.ensure_started()?;
        let offset = self.data.position();
        self.index.write_all(&offset.to_be_bytes())?;
        self.segment_count += 1;
        Ok(())
    }

    fn ensure_started(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.index.write_all(&0u64.to_be_bytes())?;
        self.started = true;
        self.segment_count = 1;
        Ok(())
    }

    /// Finalize both containers.
    pub fn close(self) -> Result<()> {
        self.data.close()?;
        self.index.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Plain in-memory sink capturing the raw bytes.
    struct MemSink(Rc<RefCell<Vec<u8>>>);

    impl ByteSink for MemSink {
        fn position(&self) -> u64 {
            self.0.borrow().len() as u64
        }

        fn write_all(&mut self, buf: &[u8]) -> Result<()> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(())
        }

        fn close(self) -> Result<()> {
            Ok(())
        }
    }

    fn offsets(bytes: &[u8]) -> Vec<u64> {
        bytes
            .chunks_exact(8)
            .map(|c| u64::from_be_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn records_segment_starts() {
        let data = Rc::new(RefCell::new(Vec::new()));
        let index = Rc::new(RefCell::new(Vec::new()));
        let mut writer = SegmentWriter::new(MemSink(data.clone()), MemSink(index.clone()));

        writer.write_all(&[1u8; 100]).unwrap();
        writer.add_segment().unwrap();
        writer.write_all(&[2u8; 150]).unwrap();
        writer.add_segment().unwrap();
        writer.write_all(&[3u8; 50]).unwrap();
        writer.close().unwrap();

        assert_eq!(offsets(&index.borrow()), vec![0, 100, 250]);
        assert_eq!(data.borrow().len(), 300);
    }

    #[test]
    fn no_boundaries_no_index_entries() {
        let data = Rc::new(RefCell::new(Vec::new()));
        let index = Rc::new(RefCell::new(Vec::new()));
        let mut writer = SegmentWriter::new(MemSink(data.clone()), MemSink(index.clone()));

        // Nothing at all written: index stays empty.
        writer.close().unwrap();
        assert!(index.borrow().is_empty());
    }

    #[test]
    fn first_write_records_zero() {
        let data = Rc::new(RefCell::new(Vec::new()));
        let index = Rc::new(RefCell::new(Vec::new()));
        let mut writer = SegmentWriter::new(MemSink(data), MemSink(index.clone()));

        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.segment_count(), 1);
        writer.close().unwrap();
        assert_eq!(offsets(&index.borrow()), vec![0]);
    }
}
