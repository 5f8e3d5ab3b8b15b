//! Example host errors.

use sitewhere_client::{ClientError, RegistryError};
use sitewhere_core::TracingError;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to register commands: {0}")]
    Commands(#[from] RegistryError),

    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TracingError),

    /// Registration needs a specification token outside loopback mode.
    #[error(
        "no specification token; set [device] specification_token or pass --specification-token"
    )]
    MissingSpecificationToken,
}
