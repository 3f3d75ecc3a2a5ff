//! Message-handling pipeline - classification, routing, and generation
//!
//! This crate is the "brain" of the nouma backend:
//! - Classifies raw message text into a closed intent set (`classifier`)
//! - Loads and routes declaratively-configured agents (`registry`)
//! - Selects a response tier and generates the reply (`generator`, `prompt`)
//! - Orchestrates a full turn with best-effort persistence (`runtime`)
//!
//! # Architecture
//!
//! A turn follows a fixed cascade:
//! 1. **Classification** (`classifier`) - ordered keyword pass, optional LLM
//!    upgrade for `GENERAL`
//! 2. **Routing** (`registry`) - router agent's intent map, defaulting to
//!    `support`
//! 3. **Generation** (`generator`) - static answers, escalation handover,
//!    generative completion, then deterministic per-agent generators
//! 4. **Side effects** (`runtime`) - conversation state, action log, lead
//!    capture, CRM notification
//!
//! # Key Types
//!
//! - `ChatRuntime` - per-message orchestrator (see `runtime` module)
//! - `AgentRegistry` - atomic-swap registry of agent profiles
//! - `LlmClient` - pluggable trait for the generative capability
//!
//! # Safety Principle
//!
//! The LLM is strictly a phrasing layer. It never decides routing, prices,
//! or escalation; those are deterministic decisions made from configuration
//! and catalog rows, and the deterministic tier answers whenever the model
//! is unavailable.

pub mod classifier;
pub mod generator;
pub mod llm;
pub mod prompt;
pub mod registry;
pub mod runtime;

pub use classifier::{detect_intent, detect_language};
pub use generator::{GeneratedReply, ReplyContext};
pub use llm::{ChatTurn, LlmClient, TurnRole};
pub use registry::{AgentRegistry, LoadSummary};
pub use runtime::{ChatRuntime, IncomingMessage, RuntimePolicy, TurnError, TurnNotifier, TurnSummary};
