//! The Atlas agent: one user utterance in, one answer out.
//!
//! Per turn the orchestrator:
//!
//! 1. **Assembles** the prompt (system prompt + conversation history + new input)
//! 2. **Asks the model** with the conversion tool on offer
//! 3. **If tool calls**: runs them once, appends the results, asks again with tools disabled
//! 4. **Records** the user turn and the answer in conversation memory
//!
//! Without conversion credentials the orchestrator runs in single-shot mode:
//! instructions plus the latest utterance, no tools, no history.

pub mod orchestrator;
pub mod prompt;

pub use orchestrator::{AGENT_NAME, AgentMode, AgentOrchestrator, GUARDRAIL, ModelDecision};
pub use prompt::PromptTemplate;
