use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown wire format: no layout is {length} bytes long")]
    UnknownFormat { length: usize },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(
        "invalid device date {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
    )]
    InvalidDate {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    },

    #[error("invalid gateway arrival time '{0}'")]
    InvalidArrivalTime(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
