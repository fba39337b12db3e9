//! Domain types for the moderation engine.
//!
//! Requests, normalized provider results and the final decision. All of
//! these are request-scoped values; nothing here is shared between calls.

mod decision;
mod modality;
mod result;

pub use decision::*;
pub use modality::*;
pub use result::*;
