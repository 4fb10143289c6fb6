use std::{error::Error as StdError, fmt};

type Cause = Box<dyn StdError + Send + Sync>;

pub struct Error {
    inner: Box<ErrorImpl>,
    description: Option<String>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    General,

    /// Indicates that the requested offset is not covered by any retained segment
    OffsetOutOfRange,

    /// Indicates that an index has no entry at the requested position
    NotFound,

    /// Indicates that a fixed capacity index can't take another entry
    CapacityExceeded,

    /// Indicates that a segment doesn't start where the previous one ends
    InvalidOffset,

    /// Indicates that an operation would remove the active segment
    ActiveSegment,

    /// Indicates that the bytes on disk don't match their declared length
    Malformed,

    /// Indicates Encode error
    Encode,

    /// Indicates Decode error
    Decode,

    /// Indicates that the file operation is failure
    File,

    /// Indicates Memory (mmap) error
    Memory,

    /// Indicates that loading the configuration is failure
    Config,

    /// Indicates that the resource is closed already
    Closed,

    /// Indicates that a lock is poisoned
    Lock,
}

impl Error {
    pub fn new(kind: Kind, description: Option<String>, cause: Option<Cause>) -> Self {
        Self {
            description,
            inner: Box::new(ErrorImpl { kind, cause }),
        }
    }

    pub fn new_general(description: &str) -> Self {
        Error::new(Kind::General, Some(description.to_owned()), None)
    }

    pub fn new_offset_out_of_range(offset: u64) -> Self {
        Error::new(
            Kind::OffsetOutOfRange,
            Some(format!("offset out of range: {offset}")),
            None,
        )
    }

    pub fn new_not_found(description: &str) -> Self {
        Error::new(Kind::NotFound, Some(description.to_owned()), None)
    }

    pub fn new_capacity_exceeded(description: &str) -> Self {
        Error::new(Kind::CapacityExceeded, Some(description.to_owned()), None)
    }

    pub fn new_invalid_offset(expected: u64, actual: u64) -> Self {
        Error::new(
            Kind::InvalidOffset,
            Some(format!("invalid offset: expected {expected}, got {actual}")),
            None,
        )
    }

    pub fn new_active_segment(start_offset: u64) -> Self {
        Error::new(
            Kind::ActiveSegment,
            Some(format!("can't remove active segment {start_offset}")),
            None,
        )
    }

    pub fn new_malformed(cause: Option<Cause>, description: Option<String>) -> Self {
        Error::new(Kind::Malformed, description, cause)
    }

    pub fn new_encode(cause: Option<Cause>, description: Option<String>) -> Self {
        Error::new(Kind::Encode, description, cause)
    }

    pub fn new_decode(description: &str) -> Self {
        Error::new(Kind::Decode, Some(description.to_owned()), None)
    }

    pub fn new_file(cause: Option<Cause>, description: Option<String>) -> Self {
        Error::new(Kind::File, description, cause)
    }

    pub fn new_memory(cause: Option<Cause>, description: Option<String>) -> Self {
        Error::new(Kind::Memory, description, cause)
    }

    pub fn new_config(cause: Option<Cause>, description: Option<String>) -> Self {
        Error::new(Kind::Config, description, cause)
    }

    pub fn new_closed(description: &str) -> Self {
        Error::new(Kind::Closed, Some(description.to_owned()), None)
    }

    pub fn new_lock(description: &str) -> Self {
        Error::new(Kind::Lock, Some(description.to_owned()), None)
    }

    pub fn get_kind(&self) -> Kind {
        self.inner.kind
    }

    pub fn is_offset_out_of_range(&self) -> bool {
        matches!(self.inner.kind, Kind::OffsetOutOfRange)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.inner.kind, Kind::NotFound)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("yiilian_core::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        if let Some(ref description) = self.description {
            f.field(description);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(description) = &self.description {
            f.write_str(description)?
        } else {
            write!(f, "{:?}", self.inner.kind)?
        }

        if let Some(ref cause) = self.inner.cause {
            write!(f, ": {}", cause)?
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::{Error, Kind};

    #[test]
    fn test_display() {
        let error = Error::new_offset_out_of_range(5);
        assert_eq!("offset out of range: 5", error.to_string());
        assert!(error.is_offset_out_of_range());

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = Error::new_file(Some(io_error.into()), Some("open 0.store".to_owned()));
        assert_eq!("open 0.store: no such file", error.to_string());
        assert!(error.source().is_some());

        let error = Error::new(Kind::Closed, None, None);
        assert_eq!("Closed", error.to_string());
    }

    #[test]
    fn test_kind() {
        assert_eq!(Kind::NotFound, Error::new_not_found("empty").get_kind());
        assert_eq!(
            Kind::CapacityExceeded,
            Error::new_capacity_exceeded("full").get_kind()
        );
        assert_eq!(Kind::InvalidOffset, Error::new_invalid_offset(3, 4).get_kind());
        assert!(!Error::new_active_segment(0).is_not_found());

        let error = Error::new_encode(None, Some("serialize record failed".to_owned()));
        assert_eq!(Kind::Encode, error.get_kind());
        assert_eq!("serialize record failed", error.to_string());
    }
}
