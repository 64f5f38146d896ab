pub mod snapshot;
pub mod source;
pub mod video;

// Re-export commonly used types
pub use snapshot::SnapshotEncoder;
pub use source::{CaptureBackend, FrameSource, StillFrame, V4lBackend};
pub use video::{Camera, Constraints};
