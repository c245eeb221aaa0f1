//! Context assembly for the planning call.
//!
//! | Section | Source | Limit |
//! |---------|--------|-------|
//! | Persona | identity config | never trimmed |
//! | Memories | memory store | `memory_limit`, newest first |
//! | Tools | enabled registry entries | all |
//! | Response format | fixed contract | never trimmed |
//! | History | conversation store | `history_limit`, oldest first |

pub mod builder;

pub use builder::{AssembledContext, ContextBuilder};
