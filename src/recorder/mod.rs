//! Recording system module
//!
//! The encode path for one recording: container sinks (sample journal and
//! FFmpeg), the frame-ingestion pipeline with its lazily-created video
//! track, and the timestamp reconciler that keeps both tracks monotonic
//! across camera switches.

pub mod ffmpeg;
pub mod geometry;
pub mod pipeline;
pub mod state;
pub mod timeline;
pub mod writer;

pub use pipeline::{PipelineStats, RecordingPipeline};
pub use state::{RecordingInfo, RecordingPhase};
pub use timeline::{Timeline, TimelineSnapshot};
pub use writer::{
    AudioTrackSettings, ContainerSink, JournalSink, SinkFactory, VideoTrackSettings, WriterError,
};
