use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChangerError>;

#[derive(Error, Debug)]
pub enum ChangerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    Device(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl ChangerError {
    pub fn parse<T: Into<String>>(msg: T) -> Self {
        Self::Parse(msg.into())
    }

    pub fn precondition<T: Into<String>>(msg: T) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn device<T: Into<String>>(msg: T) -> Self {
        Self::Device(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}
