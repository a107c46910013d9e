//! # hook-capture-core
//!
//! Capture-session lifecycle and asynchronous frame processing for audio
//! intercepted by an external hook.
//!
//! A trigger reports session starts, session stops and raw PCM buffers. Each
//! session gets its own capture thread writing a sink file and feeding a
//! bounded frame queue; a fixed worker pool analyzes, converts, persists and
//! applies effects to queued frames.
//!
//! ## Architecture
//!
//! ```text
//! hook-capture-core (this crate)
//! ├── traits/       ← AudioInput, InputProvider, CaptureDelegate, FrameConverter, FrameEffect, EffectSink
//! ├── models/       ← CaptureError, CoordinatorState, CaptureConfiguration, AudioFrame, SessionRecord
//! ├── input/        ← HookFeed (routes intercepted buffers to session inputs)
//! ├── processing/   ← FrameQueue, ProcessingPipeline, analysis, gain, WAV header
//! ├── session/      ← Coordinator, SessionRegistry, CaptureSession
//! └── storage/      ← SessionSink, FrameStore, metadata sidecar
//! ```

pub mod input;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use input::hook_feed::{FeedDelivery, HookFeed};
pub use models::audio_models::{AudioFrame, FrameStats, SessionId, SourceTag};
pub use models::config::{CaptureConfiguration, SinkFormat};
pub use models::error::CaptureError;
pub use models::session_info::{ExitReason, SessionRecord, SessionSummary};
pub use models::state::CoordinatorState;
pub use processing::frame_queue::{Cancelled, FrameQueue};
pub use processing::pipeline::{PipelineStages, PipelineStats, ProcessingPipeline};
pub use processing::transforms::{GainEffect, IdentityConverter};
pub use session::capture_session::CaptureSession;
pub use session::coordinator::{Coordinator, FrameDelivery};
pub use session::registry::{SessionRegistry, StopOutcome};
pub use traits::audio_input::{AudioInput, InputProvider};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::effect_sink::{DiscardEffectSink, EffectSink};
pub use traits::frame_stage::{FrameConverter, FrameEffect};
