//! Tool-calling agent runtime for self-hosted model servers
//!
//! An `Agent` drives a conversation against a chat-completions or responses
//! endpoint, runs local tools on the model's behalf, and broadcasts every
//! step as an `Event`. A `SessionLog` persists those events so a later
//! process can rebuild the exact transcript with `reconstruct_transcript`.

pub mod agent;
pub mod config;
pub mod event;
pub mod llm;
pub mod render;
pub mod session;
pub mod tools;
pub mod transcript;

pub use agent::{Agent, InterruptHandle, TurnOutcome, TurnState};
pub use config::{AgentConfig, ProtocolFlavor};
pub use event::{Event, EventSink, SinkSet};
pub use session::{SessionData, SessionLog, SessionStore};
pub use transcript::{reconstruct_transcript, Transcript};
