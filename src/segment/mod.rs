//! Segment addressing over a container pair.
//!
//! A segment is a logical sub-range of a container's uncompressed byte
//! stream, delimited by boundaries the writer records into a companion
//! index container. The index stores the start offset of every segment
//! as an 8-byte big-endian value, the first entry being 0; a stream
//! with no recorded boundaries reads as one implicit full-range
//! segment.

mod reader;
mod writer;

pub use reader::SegmentReader;
pub use writer::SegmentWriter;
