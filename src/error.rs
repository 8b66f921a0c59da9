
//! Error type and the stable numeric error codes of the SIF format tooling.

use std::borrow::Cow;
use std::fmt;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;

/// Specialized result type for SIF operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A result with no payload, used by operations that only signal success.
pub type UnitResult = Result<()>;

/// The category of a failure.
///
/// Each kind maps to a stable numeric code, kept identical to the codes
/// used by existing SIF tooling so that scripted callers can match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A memory allocation failed.
    Memory,

    /// The file handle was missing or unusable.
    NullFile,

    /// The file header was missing or unusable.
    NullHeader,

    /// A block number was negative or out of bounds,
    /// or the tile-to-block indices contradicted each other.
    InvalidBlockNumber,

    /// A tile index was out of bounds.
    InvalidTileNumber,

    /// Reading from the underlying file failed, or its
    /// contents could not be understood as a SIF image.
    Read,

    /// Writing to the underlying file failed.
    Write,

    /// Seeking within the underlying file failed.
    Seek,

    /// Truncating the underlying file failed.
    Truncate,

    /// A mutating operation was attempted on a read-only file,
    /// or the file could not be opened in the requested mode.
    InvalidFileMode,

    /// The file was written by a newer version of the format
    /// than this library can process.
    IncompatibleVersion,

    /// No meta-data entry exists for the requested key.
    MetaDataKey,

    /// A meta-data value could not be interpreted as requested,
    /// for example a string read on a value without a `NUL` terminator.
    MetaDataValue,

    /// The requested wire format version cannot be written.
    CannotWriteVersion,

    /// A band index was out of bounds.
    InvalidBand,

    /// A pixel coordinate was out of bounds.
    ///
    /// Coordinates in this crate are unsigned, so this kind is retained
    /// only for code-table stability; out-of-range windows surface as
    /// [`ErrorKind::InvalidRegionSize`].
    InvalidCoordinate,

    /// A tile size argument was invalid.
    InvalidTileSize,

    /// A region size argument was invalid or the region
    /// extends beyond the image.
    InvalidRegionSize,

    /// A caller-supplied buffer had the wrong length for the
    /// requested operation.
    InvalidBuffer,

    /// The user data type word does not encode a "simple" sample type.
    UndefinedDataType,

    /// The file does not conform to the expected data type convention.
    IncorrectDataType,

    /// The user data type word does not encode a known byte order.
    UndefinedEndian,
}

impl ErrorKind {
    /// The stable numeric code of this kind.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Memory => 1,
            ErrorKind::NullFile => 2,
            ErrorKind::NullHeader => 3,
            ErrorKind::InvalidBlockNumber => 4,
            ErrorKind::InvalidTileNumber => 5,
            ErrorKind::Read => 6,
            ErrorKind::Write => 7,
            ErrorKind::Seek => 8,
            ErrorKind::Truncate => 9,
            ErrorKind::InvalidFileMode => 10,
            ErrorKind::IncompatibleVersion => 11,
            ErrorKind::MetaDataKey => 12,
            ErrorKind::MetaDataValue => 13,
            ErrorKind::CannotWriteVersion => 14,
            ErrorKind::InvalidBand => 15,
            ErrorKind::InvalidCoordinate => 16,
            ErrorKind::InvalidTileSize => 17,
            ErrorKind::InvalidRegionSize => 18,
            ErrorKind::InvalidBuffer => 19,
            ErrorKind::UndefinedDataType => 100,
            ErrorKind::IncorrectDataType => 101,
            ErrorKind::UndefinedEndian => 102,
        }
    }
}

/// Describe a numeric error code, including codes this library
/// never produces itself (the PNM export family of the original tooling).
pub fn error_description(code: i32) -> &'static str {
    match code {
        0 => "no error",
        1 => "memory allocation failed",
        2 => "null file pointer",
        3 => "null header",
        4 => "invalid block number",
        5 => "invalid tile number",
        6 => "error when reading",
        7 => "error when writing",
        8 => "error when seeking",
        9 => "error when truncating",
        10 => "invalid file mode",
        11 => "cannot process files of the version stored in the SIF file",
        12 => "cannot find a (key, value) pair with the specified key",
        13 => "the value of the meta-data item is invalid",
        14 => "cannot write files of the version requested",
        15 => "band index invalid",
        16 => "invalid coordinate",
        17 => "invalid tile size",
        18 => "invalid region size",
        19 => "invalid buffer passed",
        20 => "invalid type code for PNM output",
        21 => "invalid band count for PGM output",
        22 => "invalid band count for PPM output",
        23 => "PNM output requires the 'simple' data type convention",
        100 => "undefined data type code (simple)",
        101 => "data type mismatch (simple)",
        102 => "endian code not understood (simple)",
        _ => "unknown error",
    }
}

/// An error raised by any SIF operation.
///
/// Carries the [`ErrorKind`], an optional human-readable detail,
/// and the underlying OS error where one exists.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    source: Option<IoError>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Error { kind, detail: None, source: None }
    }

    pub(crate) fn detailed(kind: ErrorKind, detail: impl Into<Cow<'static, str>>) -> Self {
        Error { kind, detail: Some(detail.into()), source: None }
    }

    pub(crate) fn io(kind: ErrorKind, source: IoError) -> Self {
        Error { kind, detail: None, source: Some(source) }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The stable numeric code of this error.
    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    /// The operating system error code that caused this error, if any.
    pub fn os_error(&self) -> Option<i32> {
        self.source.as_ref().and_then(IoError::raw_os_error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", error_description(self.kind.code()))?;

        if let Some(detail) = &self.detail {
            write!(formatter, ": {}", detail)?;
        }

        if let Some(source) = &self.source {
            write!(formatter, " ({})", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|io| io as &(dyn std::error::Error + 'static))
    }
}

/// Convert a signed wire integer to a size, failing for negative values.
#[inline]
pub(crate) fn i32_to_usize(value: i32, context: &'static str) -> Result<usize> {
    if value < 0 { Err(Error::detailed(ErrorKind::Read, context)) }
    else { Ok(value as usize) }
}
