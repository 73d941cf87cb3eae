#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    #[error("unknown accelerator: {0}")]
    UnknownAccelerator(String),

    #[error("invalid catalog entry {key}: {reason}")]
    InvalidCatalog { key: String, reason: String },

    #[error("{quantity} is not a finite number")]
    NonFinite { quantity: &'static str },

    #[error("{quantity} is out of range")]
    Overflow { quantity: &'static str },

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, CalcError>;
