//! History screen controller
//!
//! Holds the loaded history, the signed-in account, the active selection and
//! at most one action waiting on the user. Each user action runs to
//! completion before the next one is accepted.

use crate::error::{HistoryError, Result};
use crate::gate::{confirmation_message, denial_message, AccessGate, AttemptState, OpenAttempt};
use crate::model::{HistoryRecord, UserAccount};
use crate::store::{search, HistoryStore};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Renders an opened record
pub trait LessonViewer {
    fn show(&mut self, record: &HistoryRecord);

    /// Back to the history list
    fn close(&mut self);
}

/// Confirmation and alert dialogs
pub trait Prompt {
    /// Ask a yes/no question
    fn confirm(&mut self, message: &str) -> bool;

    /// Acknowledge-only notice
    fn alert(&mut self, message: &str);
}

/// Action waiting on a confirm/cancel answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Open(OpenAttempt),
    Delete { id: String },
}

/// What a user action produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Record handed to the viewer
    Opened { id: String, charged: u32 },
    /// A prompt must be answered through `confirm` or `cancel`
    NeedsConfirmation { message: String },
    /// Not enough credits; nothing changed
    Denied { message: String },
    Deleted { id: String },
    /// Pending action dropped without side effects
    Cancelled,
    NotFound { id: String },
}

pub struct HistorySession<V: LessonViewer> {
    store: HistoryStore,
    gate: AccessGate,
    user: UserAccount,
    viewer: V,
    selection: Option<String>,
    pending: Option<PendingAction>,
    query: String,
}

impl<V: LessonViewer> HistorySession<V> {
    pub fn new(store: HistoryStore, gate: AccessGate, user: UserAccount, viewer: V) -> Self {
        Self {
            store,
            gate,
            user,
            viewer,
            selection: None,
            pending: None,
            query: String::new(),
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn user(&self) -> &UserAccount {
        &self.user
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Record currently shown in the viewer
    pub fn selection(&self) -> Option<&HistoryRecord> {
        self.selection.as_deref().and_then(|id| self.store.get(id))
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Newest-first records matching the current query
    pub fn visible(&self) -> Vec<&HistoryRecord> {
        search(&self.query, self.store.records())
    }

    pub fn request_open(&mut self, id: &str) -> Outcome {
        self.request_open_at(id, Utc::now())
    }

    /// Start opening a record, evaluating subscriptions against `now`.
    ///
    /// Replaces whatever was pending.
    pub fn request_open_at(&mut self, id: &str, now: DateTime<Utc>) -> Outcome {
        self.pending = None;

        let attempt = match self.store.get(id) {
            Some(record) => self.gate.request_open(record, &self.user, now),
            None => return Outcome::NotFound { id: id.to_string() },
        };

        match attempt.state().clone() {
            AttemptState::Granted { charged } => self.show(attempt.record_id(), charged),
            AttemptState::AwaitingConfirmation { cost } => {
                let message = confirmation_message(cost, self.user.credits);
                self.pending = Some(PendingAction::Open(attempt));
                Outcome::NeedsConfirmation { message }
            }
            AttemptState::Denied { cost, balance } => {
                debug!(record = id, cost, balance, "Open denied");
                Outcome::Denied {
                    message: denial_message(cost, balance),
                }
            }
            AttemptState::Aborted => Outcome::Cancelled,
        }
    }

    /// Ask to delete a record. Deletion is never gated but always confirmed.
    pub fn request_delete(&mut self, id: &str) -> Outcome {
        self.pending = None;

        let Some(record) = self.store.get(id) else {
            return Outcome::NotFound { id: id.to_string() };
        };

        let message = format!("Delete \"{}\" from your history?", record.title);
        self.pending = Some(PendingAction::Delete { id: id.to_string() });
        Outcome::NeedsConfirmation { message }
    }

    /// Accept the pending action
    pub fn confirm(&mut self) -> Result<Outcome> {
        let pending = self.pending.take().ok_or(HistoryError::NoPendingAction)?;

        match pending {
            PendingAction::Open(attempt) => {
                let attempt = self.gate.confirm(attempt, &mut self.user)?;
                match attempt.state().clone() {
                    AttemptState::Granted { charged } => Ok(self.show(attempt.record_id(), charged)),
                    AttemptState::Denied { cost, balance } => Ok(Outcome::Denied {
                        message: denial_message(cost, balance),
                    }),
                    AttemptState::AwaitingConfirmation { .. } | AttemptState::Aborted => {
                        Ok(Outcome::Cancelled)
                    }
                }
            }
            PendingAction::Delete { id } => {
                self.store.remove(&id)?;
                if self.selection.as_deref() == Some(id.as_str()) {
                    self.close_viewer();
                }
                Ok(Outcome::Deleted { id })
            }
        }
    }

    /// Decline the pending action. Nothing is debited or removed.
    pub fn cancel(&mut self) -> Outcome {
        match self.pending.take() {
            Some(PendingAction::Open(attempt)) => {
                if let Err(e) = attempt.cancel() {
                    debug!(error = %e, "Pending attempt was not cancellable");
                }
            }
            Some(PendingAction::Delete { id }) => debug!(id = %id, "Delete cancelled"),
            None => {}
        }
        Outcome::Cancelled
    }

    /// Leave the viewer and clear the selection
    pub fn close_viewer(&mut self) {
        self.selection = None;
        self.viewer.close();
    }

    /// Drive one outcome through a prompt, answering it at most once
    pub fn resolve(&mut self, outcome: Outcome, prompt: &mut dyn Prompt) -> Result<Outcome> {
        match outcome {
            Outcome::NeedsConfirmation { message } => {
                if prompt.confirm(&message) {
                    let resolved = self.confirm()?;
                    if let Outcome::Denied { message } = &resolved {
                        prompt.alert(message);
                    }
                    Ok(resolved)
                } else {
                    Ok(self.cancel())
                }
            }
            Outcome::Denied { message } => {
                prompt.alert(&message);
                Ok(Outcome::Denied { message })
            }
            other => Ok(other),
        }
    }

    fn show(&mut self, id: &str, charged: u32) -> Outcome {
        match self.store.get(id) {
            Some(record) => {
                self.viewer.show(record);
                self.selection = Some(id.to_string());
                info!(record = id, charged, "Opened history record");
                Outcome::Opened {
                    id: id.to_string(),
                    charged,
                }
            }
            None => Outcome::NotFound { id: id.to_string() },
        }
    }
}
