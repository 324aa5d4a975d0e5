use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("EPİAŞ credentials not found. Set EPIAS_USERNAME and EPIAS_PASSWORD (or EPIAS_TGT)")]
    MissingCredentials,

    #[error("EPİAŞ login rejected with status {0}")]
    LoginRejected(StatusCode),

    #[error("TGT token not found in login response")]
    TicketNotFound,

    #[error("EPİAŞ {dataset} API error: {status} - {body}")]
    Status {
        dataset: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }
}
