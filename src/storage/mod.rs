mod analytics;
mod history;

pub use analytics::*;
pub use history::*;
