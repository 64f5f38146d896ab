use thiserror::Error;

/// Everything that can go wrong between construction and a finished capture cycle.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("face-verify: must provide a video device via the camera option")]
    MissingTarget,

    #[error("face-verify: video device not found: {0}")]
    TargetNotFound(String),

    #[error("face-verify: video capture is not supported on this platform")]
    Unsupported,

    #[error("face-verify: cannot build Facebox client: {0}")]
    Client(String),

    #[error("face-verify: cannot start (see previous errors)")]
    CannotStart,

    #[error("failed to access webcam: {0}")]
    Acquisition(String),

    #[error("failed to capture snapshot: {0}")]
    Capture(String),

    #[error("bad response from Facebox: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bad response from Facebox: {}", describe_body(.body))]
    BadStatus { status: u16, body: String },

    #[error("{0}")]
    Service(String),

    #[error("invalid response from Facebox: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

pub const SERVICE_FALLBACK: &str =
    "Facebox: something went wrong, check the logs for technical information";

fn describe_body(body: &str) -> &str {
    let body = body.trim();
    if body.is_empty() {
        "check the logs for technical information"
    } else {
        body
    }
}

pub type Result<T> = std::result::Result<T, VerifyError>;
