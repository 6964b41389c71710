//! Lesson History - saved lessons with pay-per-view reopening
//!
//! Keeps a learner's completed lessons and quizzes in client-local storage
//! and decides whether each one may be reopened for free, reopened after a
//! confirmed credit debit, or refused.
//!
//! # Architecture
//!
//! - **Storage**: named slots (`LocalStorage`), in memory or one file per slot
//! - **HistoryStore**: records stored oldest-first, always presented newest-first
//! - **AccessGate**: cost check → confirm → commit, with admin and subscriber exemptions
//! - **HistorySession**: the screen controller tying the two to a viewer and prompts
//!
//! # Example
//!
//! ```rust,ignore
//! use lesson_history::{AccessGate, AccountStore, HistorySession, HistoryStore, MemoryStorage};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let store = HistoryStore::open(storage.clone(), "lesson_history");
//! let gate = AccessGate::new(settings, AccountStore::new(storage, "current_user"));
//! let mut session = HistorySession::new(store, gate, user, viewer);
//!
//! let outcome = session.request_open("quiz-42");
//! let outcome = session.resolve(outcome, &mut prompt)?;
//! ```

// Error types
pub mod error;

// Configuration and system settings
pub mod config;

// Records and accounts
pub mod model;

// Slot storage backends
pub mod storage;

// History and account persistence
pub mod store;

// Pay-per-view gate
pub mod gate;

// Remote account sync
pub mod sync;

// Screen controller
pub mod session;

pub use config::{Config, SyncConfig, SystemSettings};
pub use error::{HistoryError, Result};
pub use gate::{AccessGate, AttemptState, GateDecision, GrantReason, OpenAttempt};
pub use model::{ContentCategory, HistoryRecord, Role, UserAccount};
pub use session::{HistorySession, LessonViewer, Outcome, PendingAction, Prompt};
pub use storage::{FileStorage, LocalStorage, MemoryStorage};
pub use store::{search, AccountStore, HistoryStore};
pub use sync::{spawn_persist, AccountSync, HttpAccountSync};
