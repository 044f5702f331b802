use std::path::PathBuf;

/// Identifies the table slot an error belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotId {
    pub index: usize,
    pub chip: String,
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot {} ({})", self.index, self.chip)
    }
}

/// Every way a generation run can fail. All of them abort the run.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum Error {
    /// Failed to fetch the stub descriptor for {slot} from {url}
    Fetch {
        slot: SlotId,
        url: String,
        #[source]
        source: FetchError,
    },

    /// Stub descriptor for {slot} does not exist at {path:?}
    NotFound { slot: SlotId, path: PathBuf },

    /// Failed to read the stub descriptor for {slot} from {path:?}
    Read {
        slot: SlotId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to decode the stub descriptor for {slot}
    Decode {
        slot: SlotId,
        #[source]
        source: DecodeError,
    },

    /// The slot layout does not match the chip enumeration
    Ordering(#[from] OrderingError),

    /// Failed to render template '{name}'
    Template {
        name: String,
        #[source]
        source: TemplateError,
    },

    /// Failed to load the slot layout
    Layout(#[from] LayoutError),

    /// I/O error on {path:?}
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum FetchError {
    /// Request failed
    Transport(#[from] reqwest::Error),

    /// Server responded with HTTP status {0}
    Status(reqwest::StatusCode),
}

#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum DecodeError {
    /// Malformed descriptor JSON
    Json(#[from] serde_json::Error),

    /// inconsistent data segment
    #[ignore_extra_doc_attributes]
    ///
    /// Exactly one of `data` and `data_start` was present.
    InconsistentDataSegment,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, docsplay::Display)]
pub enum OrderingError {
    /// layout has {actual} slots, but {constant} is {expected}
    SlotCount {
        constant: String,
        expected: usize,
        actual: usize,
    },

    /// slot at position {position} declares index {index}
    IndexMismatch { position: usize, index: usize },

    /// chip {chip} appears more than once
    DuplicateChip { chip: String },

    /// '{0}' is not a valid C identifier
    InvalidIdentifier(String),

    /// {chip} is slot {index} in the layout, but {value} in the consumer enumeration
    EnumValueMismatch {
        chip: String,
        index: usize,
        value: usize,
    },

    /// {chip} is not declared in the consumer enumeration
    MissingEnumerator { chip: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, docsplay::Display)]
pub enum TemplateError {
    /// unknown placeholder '{name}' at byte {offset}
    UnknownPlaceholder { name: String, offset: usize },

    /// unmatched '{brace}' at byte {offset}
    UnmatchedBrace { brace: char, offset: usize },
}

#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum LayoutError {
    /// Unknown built-in layout '{0}'
    UnknownBuiltin(String),

    /// Failed to read layout file {path:?}
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed layout description
    Parse(#[from] serde_yaml::Error),
}
