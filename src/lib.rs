//! Fluency - AI gateway and curriculum server for a self-paced learning platform.
//!
//! Features:
//! - Streaming AI feedback and module chat over the Anthropic Messages API
//! - Per-identity daily usage throttle (memory, SQLite or Supabase counters)
//! - Event-stream re-framing to plain `{text}` deltas
//! - Curriculum content served from a JSON tree
//! - Learner progress storage with versioned migrations

pub mod api;
pub mod config;
pub mod content;
pub mod error;
pub mod http;
pub mod identity;
pub mod logger;
pub mod progress;
pub mod prompts;
pub mod sse;
pub mod throttle;
pub mod upstream;
