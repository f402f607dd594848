//! Flat error kinds shared by every fallible operation in the core.
//!
//! `spec.md` §6/§7 describe errors as flat numeric kinds rather than a
//! per-module hierarchy. `Error::code` recovers that numbering for callers
//! (e.g. the DBM, which branches on it) while the variants themselves stay
//! idiomatic `thiserror` so `?` and `Display` work as usual.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("file header is corrupt or unsupported")]
    ECorruptHeader,
    #[error("page number is out of range")]
    EPageNo,
    #[error("cell index is out of range")]
    ECellNo,
    #[error("out of memory")]
    ENoMem,
    #[error("I/O error: {0}")]
    EIo(String),
    #[error("key not found")]
    ENotFound,
    #[error("duplicate key")]
    EDuplicate,
    #[error("cursor has no next entry")]
    CursorENoNext,
    #[error("cursor has no previous entry")]
    CursorENoPrev,
    #[error("cursor seek target does not exist")]
    CursorEKeyNotFound,
}

impl Error {
    /// Numeric kind matching the flat error codes of §6/§7.
    pub fn code(&self) -> i32 {
        match self {
            Error::ECorruptHeader => 1,
            Error::EPageNo => 2,
            Error::ECellNo => 3,
            Error::ENoMem => 4,
            Error::EIo(_) => 5,
            Error::ENotFound => 6,
            Error::EDuplicate => 7,
            Error::CursorENoNext => 8,
            Error::CursorENoPrev => 9,
            Error::CursorEKeyNotFound => 10,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::EIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
