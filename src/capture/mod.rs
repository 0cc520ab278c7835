pub mod commands;
pub mod screen;
pub mod speech;

pub use screen::{CaptureError, ScreenCapture, ScreenCaptureBroker};
pub use speech::{ListeningState, SpeechController};
