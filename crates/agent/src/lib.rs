//! The agent loop for ResolutionGuard.
//!
//! Each run follows an **observe → decide → intervene** cycle:
//!
//! 1. **Receive** a user message and append it to the stored history
//! 2. **Send** the history, the fixed directive and every tool schema to the backend
//! 3. **If tool calls**: run them in order, append each result, loop back to step 2
//! 4. **If text**: append it and return the history
//!
//! The loop also stops on an empty answer or when the iteration ceiling is
//! reached; in the latter case a closing notice is appended.

pub mod loop_runner;
pub mod system_prompt;

pub use loop_runner::{AgentLoop, CEILING_NOTICE, NO_RESPONSE, Turn};
pub use system_prompt::SYSTEM_PROMPT;
