//! Turn engine for the familiar agent.
//!
//! One call to [`EmbodiedAgent::run`] is one embodied turn: user text (or
//! an inner impulse) in, zero or more tool invocations, final assistant
//! text out, memory and desires updated on the way.

pub mod engine;
pub mod interoception;
pub mod prompts;
pub mod tape;

pub use engine::{EmbodiedAgent, InterruptPoll, OnAction, MAX_ITERATIONS};
