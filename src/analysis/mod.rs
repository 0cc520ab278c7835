pub mod commands;
pub mod engine;
pub mod error;
pub mod mode;
pub mod parser;

pub use engine::{AnalysisEngine, AnalysisResult};
pub use error::{AnalysisError, AnalysisFailure};
pub use mode::{Mode, ResponseShape};
