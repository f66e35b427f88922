//! Protocol layer for the line-oriented chat
//!
//! Plain text lines over a byte stream; this module owns their exact format.

pub mod messages;

// Re-export commonly used types
pub use messages::*;
