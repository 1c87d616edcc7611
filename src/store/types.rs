/// File extension shared by every container file.
pub const CONTAINER_EXT: &str = "bgz";

/// Named child streams of a record.
///
/// `Raw`, `Meta` and `Context` are addressable child streams, each
/// backed by its own container file. `SegmentIndex` and
/// `BoundaryIndex` are internal companions: a stream's segment index
/// chains onto its extension (`dat.seg`), and the raw stream may carry
/// an additional part-boundary index (`dat.bdy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Raw,
    Meta,
    Context,
    SegmentIndex,
    BoundaryIndex,
}

impl StreamType {
    /// The child streams a caller can request by name.
    pub const ADDRESSABLE: [StreamType; 3] =
        [StreamType::Raw, StreamType::Meta, StreamType::Context];

    pub const fn extension(self) -> &'static str {
        match self {
            StreamType::Raw => "dat",
            StreamType::Meta => "meta",
            StreamType::Context => "ctx",
            StreamType::SegmentIndex => "seg",
            StreamType::BoundaryIndex => "bdy",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "dat" => Some(StreamType::Raw),
            "meta" => Some(StreamType::Meta),
            "ctx" => Some(StreamType::Context),
            "seg" => Some(StreamType::SegmentIndex),
            "bdy" => Some(StreamType::BoundaryIndex),
            _ => None,
        }
    }

    pub const fn is_addressable(self) -> bool {
        matches!(self, StreamType::Raw | StreamType::Meta | StreamType::Context)
    }
}
