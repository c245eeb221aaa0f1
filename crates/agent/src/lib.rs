//! The persona planner, the heart of Hearth.
//!
//! Every inbound message follows a **Plan → Act → Narrate** cycle:
//!
//! 1. **Build context** (persona + memories + enabled tools + recent history)
//! 2. **Plan**: the model answers with one JSON object, a final reply or a tool call
//! 3. **Act**: a tool call runs through the tool engine
//! 4. **Narrate**: a second model call explains the tool result to the user
//!
//! Malformed plans and model failures fall back to plain chat, and a failing
//! plain chat falls back to an apologetic echo, so a reply always comes back.

pub mod context;
pub mod plan;
pub mod planner;
pub mod prompts;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{AssembledContext, ContextBuilder};
pub use plan::{Plan, PlanError, parse_plan};
pub use planner::PersonaPlanner;
