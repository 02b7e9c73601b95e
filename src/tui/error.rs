use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("IO/Terminal error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),

    #[error("Render error: {0}")]
    RenderError(String),
}
