pub mod config;
pub mod error;
pub mod facebox;
pub mod verify;

pub use config::{Config, Options};
pub use error::{Result, VerifyError};
pub use facebox::{CheckResponse, Face, FaceboxClient, Verify};
pub use verify::{classify, Callbacks, FaceVerify, InsecureReason, Polling, Timer, Verdict};

// Re-export vision types for convenience
pub use faceverify_vision::{snapshot, source, video, CaptureBackend, Constraints, FrameSource};
