use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid path")]
    InvalidPath,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("a directory occupies the path")]
    IsDirectory,
    #[error("path is not a directory")]
    NotADirectory,
    #[error("conflicting entry")]
    Conflict,
    #[error("unexpected response status {0}")]
    UnexpectedResponse(StatusCode),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
}

/// The verb a response belongs to; needed to tell 409s apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verb {
    List,
    Info,
    Read,
    CreateDirectory,
    Write,
    Delete,
}

impl ClientError {
    pub(crate) fn from_status(verb: Verb, status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ClientError::InvalidPath,
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            StatusCode::FORBIDDEN => ClientError::Forbidden,
            StatusCode::NOT_FOUND => ClientError::NotFound,
            StatusCode::CONFLICT => match verb {
                Verb::CreateDirectory => ClientError::AlreadyExists,
                Verb::Write => ClientError::IsDirectory,
                _ => ClientError::Conflict,
            },
            other => ClientError::UnexpectedResponse(other),
        }
    }
}
