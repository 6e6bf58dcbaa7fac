// One error type for the whole demo.
// Every variant states *where* things went wrong.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Creating the window failed
    #[error("Window init error: {0}")]
    WindowInit(String),

    /// Pushing the surface to the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String),

    /// The backbuffer or surface could not be allocated
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Copying the backbuffer onto the visible surface failed
    #[error("Blit error: {0}")]
    Blit(String),

    /// The registered draw callback failed
    #[error("Draw error: {0}")]
    Draw(String),

    /// The render thread could not be started or stopped
    #[error("Render thread error: {0}")]
    Thread(String),

    /// A configuration value was missing a sane value
    #[error("Config error: {0}")]
    Config(String),
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Draw(format!("{e:#}"))
    }
}
