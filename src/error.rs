use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
pub enum DrowsewatchError {
    #[error(transparent)]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    ImageError(#[from] image::ImageError),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    GpioError(#[from] rppal::gpio::Error),

    #[error("Some other error: {0}")]
    Other(String),
}

impl DrowsewatchError {
    /// Most wrapped error types are not `Clone`; when a result has to go
    /// both to a channel and to the caller, degrade the copy to a string.
    pub fn clone_for_error_reporting(&self) -> Self {
        DrowsewatchError::Other(self.to_string())
    }
}
