pub mod client;
mod types;

pub use client::{CompletionRequest, HttpModelClient, ModelClient, ModelError};
