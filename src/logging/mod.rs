//! Session audit logging.

pub mod jsonl;

pub use jsonl::{SessionEvent, SessionLog};
