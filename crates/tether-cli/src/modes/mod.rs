//! Output modes for session events.
//!
//! - `text`: human-readable lines with a prompt (default)
//! - `json`: one serialized event per line

mod json;
mod text;

use clap::ValueEnum;
use tether_core::events::EventSink;

pub use json::JsonRenderer;
pub use text::TextRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn renderer(format: OutputFormat) -> Box<dyn EventSink + Send> {
    match format {
        OutputFormat::Text => Box::new(TextRenderer::stdout()),
        OutputFormat::Json => Box::new(JsonRenderer::stdout()),
    }
}
