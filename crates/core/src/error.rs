use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid resource key: {0}")]
    InvalidResourceKey(String),

    #[error("invalid temp id: {0}")]
    InvalidTempId(String),

    #[error("invalid day index: {0}")]
    InvalidDayIndex(u8),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
