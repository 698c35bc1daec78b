//! Run-owned state schema, persistence, and locking.
//!
//! The state module centralizes schema versions, path handling, and typed
//! JSON structures so the workflow stays deterministic and checkpoint-driven.
/// Current schema version for `state.json`.
pub const STATE_SCHEMA_VERSION: u32 = 1;
/// Current schema version for `history.jsonl`.
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

mod history;
mod lock;
mod paths;
mod store;
mod types;

pub use history::{append_history, now_epoch_ms, phase_entry};
pub use lock::{acquire, RunLock};
pub use paths::RunPaths;
pub use store::{load_state, write_json_atomic, write_state, write_text_atomic};
pub use types::*;
