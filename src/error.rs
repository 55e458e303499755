/// Every failure in this crate is a caller bug: bad input caught at a public
/// boundary, never a transient condition to retry.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("resolution {0} is not one of 60, 300, 3600")]
    InvalidResolution(i64),

    #[error("duration {0} is negative")]
    InvalidDuration(i64),

    #[error("range [{start}, {end}) is empty or inverted")]
    InvalidRange { start: i64, end: i64 },

    #[error("range [{start}, {end}) is not aligned to resolution {resolution}")]
    UnalignedRange {
        start: i64,
        end: i64,
        resolution: i64,
    },

    #[error("expected {expected} samples for [{start}, {end}) at resolution {resolution}, got {actual}")]
    DataLengthMismatch {
        start: i64,
        end: i64,
        resolution: i64,
        expected: usize,
        actual: usize,
    },

    #[error("query over [{start}, {end}) is not entirely covered by the cache")]
    QueryNotCovered { start: i64, end: i64 },
}

pub type Result<T> = std::result::Result<T, Error>;
