// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A stable classification of failures so that callers (notably the archive
//    reader) can decide per-kind whether to skip a column, skip a block, or abort.

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// Failure classes. Container-level kinds (`Corruption`, `Decrypt`) are
/// recoverable by skipping the affected column; block-level kinds abort the
/// block; writer-side errors are fatal to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Magic mismatch, unknown primitive type, unknown encoder or cipher id.
    Format,
    /// CRC32 mismatch, sentinel mismatch, impossible run arithmetic.
    Corruption,
    /// Keychain miss, AEAD tag failure, wrong cipher for container.
    Decrypt,
    /// Stream ended before a declared length was fully consumed.
    Truncation,
    /// Writer received a record with decreasing position on the same contig.
    InputOrdering,
    /// Index query referenced an unknown contig or out-of-range position.
    Bounds,
    /// A 16-bit count field (pattern ids, allele counts) would overflow.
    Oversize,
    /// Propagated from the underlying byte stream.
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    #[allow(dead_code)]
    inner: DynBacktraceError,
}

pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(ErrorKind::Io, err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "tachyon", "{:?}: {:?}", kind, err);
        let dbe = DynBacktraceError::from(err);
        Error { kind, inner: dbe }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether the archive reader may skip the affected column and keep
    /// going with the rest of the block.
    pub fn is_column_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::Corruption | ErrorKind::Decrypt)
    }
}

pub fn err(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    let err = SimpleErr(msg.into());
    Error::new(kind, err)
}

#[test]
fn test_error() {
    let e = err(ErrorKind::Corruption, "test error");
    assert_eq!(e.kind(), ErrorKind::Corruption);
    assert!(e.is_column_recoverable());
    let e = err(ErrorKind::Truncation, "test error");
    assert!(!e.is_column_recoverable());
}
