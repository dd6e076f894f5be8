pub mod clock;
pub mod commands;
pub mod decoder;
pub mod engine;
mod engine_thread;
pub mod eq;
pub mod graph;
pub mod handle;
pub mod output;
pub mod recorder;
pub mod telemetry;
pub mod throttle;

pub use clock::AudioClock;
pub use commands::EngineCmd;
pub use engine::{EngineConfig, PlaybackEngine};
pub use graph::{Block, OutputMeter, RenderCmd};
pub use handle::{EngineHandle, EngineReadState};
pub use output::{render_link, DeviceOutput, NullOutput, RenderLink, Renderer};
pub use recorder::{RecorderError, RecordingFormat};
