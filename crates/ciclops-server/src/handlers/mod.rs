//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod corrections;
pub mod documents;
pub mod fiscal;
pub mod health;
pub mod summaries;

// Re-export all handlers for use in router
pub use corrections::*;
pub use documents::*;
pub use fiscal::*;
pub use health::*;
pub use summaries::*;
