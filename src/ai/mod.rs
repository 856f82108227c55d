mod client;
mod prompt;

pub use client::{render_reply, ModelClient, ERROR_MARKER, FALLBACK_MODELS};
pub use prompt::build_prompt;
