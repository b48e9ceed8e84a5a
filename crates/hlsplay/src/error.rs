use thiserror::Error;

#[derive(Error, Debug)]
pub enum HlsError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Invalid m3u8 file: {0}")]
    M3u8ParseError(String),

    #[error("Precondition violated: {0}")]
    Precondition(&'static str),

    #[error("Fetch session stopped")]
    Stopped,

    #[error("Playlist ended before sequence {0} became available")]
    EndOfStream(u64),

    #[error("Fetch session failed: {0}")]
    SessionFailed(String),

    #[error("Fetch task panicked: {0}")]
    Panicked(String),

    #[error("Variant playlists nested deeper than {0} levels")]
    VariantDepthExceeded(usize),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

impl HlsError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::M3u8ParseError(message.into())
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            HlsError::HttpError(status) => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            HlsError::RequestError(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            _ => false,
        }
    }
}

pub type HlsResult<T> = Result<T, HlsError>;
