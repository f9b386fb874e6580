//! Chat completion and moderation API types

mod moderation;
mod openai;

pub use moderation::*;
pub use openai::*;
