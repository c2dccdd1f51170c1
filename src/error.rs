use thiserror::Error;

/// Everything that can sink a run or a record. Field-level read failures are
/// deliberately not here: they degrade into absent values instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing required configuration: {0} (set it in the environment or a .env file)")]
    ConfigMissing(&'static str),

    #[error("CRM sign-in failed: {0}")]
    AuthFailed(String),

    #[error("record has no RMA number, refusing to create an untitled page")]
    MissingOrderNumber,

    #[error("webdriver error: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    #[error("remote webdriver session error: {0}")]
    RemoteSession(#[from] fantoccini::error::NewSessionError),

    #[error("remote webdriver error: {0}")]
    RemoteCommand(#[from] fantoccini::error::CmdError),

    #[error("notion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notion api returned {status}: {message}")]
    NotionApi { status: u16, message: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
