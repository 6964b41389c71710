//! Pay-per-view access gate
//!
//! Opening a record from history runs through a small state machine:
//!
//! ```text
//! request_open ──► Granted                      (not gated, free, or exempt)
//!              ──► Denied                       (balance below cost)
//!              ──► AwaitingConfirmation ─confirm─► Granted { charged }
//!                                       ─cancel──► Aborted
//! ```
//!
//! Exemption is checked before the balance, so exempt users never see a
//! cost prompt. A debit only ever happens inside `confirm`.

use crate::config::SystemSettings;
use crate::error::{HistoryError, Result};
use crate::model::{ContentCategory, HistoryRecord, UserAccount};
use crate::store::AccountStore;
use crate::sync::{spawn_persist, AccountSync};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a record opened without charge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReason {
    /// Category is not gated
    NotGated,
    /// Configured cost resolved to zero
    FreeSetting,
    /// Admin or active subscriber
    Exempt,
}

/// Outcome of evaluating a single open request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Open immediately at no cost
    Granted(GrantReason),
    /// Ask the user before debiting `cost`
    AwaitingConfirmation { cost: u32 },
    /// Balance is below cost
    Denied { cost: u32, balance: u32 },
}

/// State of one open attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    AwaitingConfirmation { cost: u32 },
    /// Terminal: record may be shown; `charged` is what was debited
    Granted { charged: u32 },
    /// Terminal: nothing debited, nothing opened
    Denied { cost: u32, balance: u32 },
    /// Terminal: user declined the prompt
    Aborted,
}

impl AttemptState {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitingConfirmation { .. } => "awaiting confirmation",
            Self::Granted { .. } => "granted",
            Self::Denied { .. } => "denied",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::AwaitingConfirmation { .. })
    }
}

/// One click on a history record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAttempt {
    record_id: String,
    state: AttemptState,
}

impl OpenAttempt {
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn is_granted(&self) -> bool {
        matches!(self.state, AttemptState::Granted { .. })
    }

    /// Decline the prompt. No debit happens.
    pub fn cancel(self) -> Result<Self> {
        match self.state {
            AttemptState::AwaitingConfirmation { cost } => {
                debug!(record = %self.record_id, cost, "Open attempt cancelled");
                Ok(Self {
                    record_id: self.record_id,
                    state: AttemptState::Aborted,
                })
            }
            ref other => Err(HistoryError::InvalidTransition {
                action: "cancel",
                state: other.name().to_string(),
            }),
        }
    }

    /// Prompt text while awaiting confirmation, denial text when denied
    pub fn notice(&self, balance: u32) -> Option<String> {
        match self.state {
            AttemptState::AwaitingConfirmation { cost } => Some(confirmation_message(cost, balance)),
            AttemptState::Denied { cost, balance } => Some(denial_message(cost, balance)),
            AttemptState::Granted { .. } | AttemptState::Aborted => None,
        }
    }
}

pub fn confirmation_message(cost: u32, balance: u32) -> String {
    format!(
        "Opening this record costs {} credit(s). You have {}. Continue?",
        cost, balance
    )
}

pub fn denial_message(cost: u32, balance: u32) -> String {
    format!(
        "Insufficient credits: opening this record costs {} credit(s), you have {}.",
        cost, balance
    )
}

/// Decides and enforces whether a record may be opened.
pub struct AccessGate {
    settings: SystemSettings,
    accounts: AccountStore,
    sync: Option<Arc<dyn AccountSync>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl AccessGate {
    pub fn new(settings: SystemSettings, accounts: AccountStore) -> Self {
        Self {
            settings,
            accounts,
            sync: None,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Push debited accounts to a remote service after each commit
    pub fn with_sync(mut self, sync: Arc<dyn AccountSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Pure eligibility check
    pub fn evaluate(&self, category: &ContentCategory, user: &UserAccount, now: DateTime<Utc>) -> GateDecision {
        if !category.is_gated() {
            return GateDecision::Granted(GrantReason::NotGated);
        }

        let cost = self.settings.resolved_cost();
        if cost == 0 {
            return GateDecision::Granted(GrantReason::FreeSetting);
        }

        if user.is_exempt(now) {
            return GateDecision::Granted(GrantReason::Exempt);
        }

        if user.credits < cost {
            return GateDecision::Denied {
                cost,
                balance: user.credits,
            };
        }

        GateDecision::AwaitingConfirmation { cost }
    }

    /// Start an open attempt for `record`
    pub fn request_open(&self, record: &HistoryRecord, user: &UserAccount, now: DateTime<Utc>) -> OpenAttempt {
        let decision = self.evaluate(&record.category, user, now);
        debug!(record = %record.id, category = %record.category, ?decision, "Evaluated open request");

        let state = match decision {
            GateDecision::Granted(_) => AttemptState::Granted { charged: 0 },
            GateDecision::AwaitingConfirmation { cost } => AttemptState::AwaitingConfirmation { cost },
            GateDecision::Denied { cost, balance } => AttemptState::Denied { cost, balance },
        };

        OpenAttempt {
            record_id: record.id.clone(),
            state,
        }
    }

    /// Confirm a pending attempt: debit, persist, then grant.
    ///
    /// The local save and the remote sync are best-effort; neither rolls
    /// back the debit or blocks the open.
    pub fn confirm(&self, attempt: OpenAttempt, user: &mut UserAccount) -> Result<OpenAttempt> {
        let cost = match attempt.state {
            AttemptState::AwaitingConfirmation { cost } => cost,
            ref other => {
                return Err(HistoryError::InvalidTransition {
                    action: "confirm",
                    state: other.name().to_string(),
                })
            }
        };

        if user.credits < cost {
            return Ok(OpenAttempt {
                record_id: attempt.record_id,
                state: AttemptState::Denied {
                    cost,
                    balance: user.credits,
                },
            });
        }

        user.credits -= cost;
        info!(
            record = %attempt.record_id,
            user = %user.id,
            cost,
            balance = user.credits,
            "Committed history open"
        );

        if let Err(e) = self.accounts.save(user) {
            warn!(user = %user.id, error = %e, "Failed to save debited account locally");
        }
        if let Some(sync) = &self.sync {
            if let Some(handle) = spawn_persist(Arc::clone(sync), user.clone()) {
                if let Ok(mut in_flight) = self.in_flight.lock() {
                    in_flight.retain(|h| !h.is_finished());
                    in_flight.push(handle);
                }
            }
        }

        Ok(OpenAttempt {
            record_id: attempt.record_id,
            state: AttemptState::Granted { charged: cost },
        })
    }

    /// Give outstanding account pushes up to `within` to finish.
    ///
    /// Only for process shutdown; the gate itself never waits on a push.
    pub async fn settle(&self, within: Duration) {
        let handles: Vec<JoinHandle<()>> = match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.drain(..).collect(),
            Err(_) => return,
        };
        if handles.is_empty() {
            return;
        }

        let pending = handles.len();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(within, wait_all).await.is_err() {
            warn!(pending, "Account sync still running at shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::storage::{LocalStorage, MemoryStorage};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn make_gate(cost: i64) -> (AccessGate, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let accounts = AccountStore::new(storage.clone(), "current_user");
        let settings = SystemSettings { mcq_history_cost: cost };
        (AccessGate::new(settings, accounts), storage)
    }

    fn mcq(id: &str) -> HistoryRecord {
        HistoryRecord::new(id, ContentCategory::McqResult, "Newton's Laws", "Physics", now())
    }

    fn student(credits: u32) -> UserAccount {
        UserAccount::new("u1", Role::Student, credits)
    }

    #[test]
    fn test_ungated_categories_are_free() {
        let (gate, _) = make_gate(5);
        for category in [
            ContentCategory::Lesson,
            ContentCategory::PremiumNotes,
            ContentCategory::parse("FLASHCARDS"),
        ] {
            assert_eq!(
                gate.evaluate(&category, &student(0), now()),
                GateDecision::Granted(GrantReason::NotGated)
            );
        }
    }

    #[test]
    fn test_zero_cost_skips_prompt() {
        let (gate, _) = make_gate(0);
        assert_eq!(
            gate.evaluate(&ContentCategory::McqQuiz, &student(0), now()),
            GateDecision::Granted(GrantReason::FreeSetting)
        );

        let (gate, _) = make_gate(-2);
        let attempt = gate.request_open(&mcq("r1"), &student(0), now());
        assert_eq!(attempt.state(), &AttemptState::Granted { charged: 0 });
    }

    #[test]
    fn test_exempt_users_skip_cost() {
        let (gate, _) = make_gate(3);
        let admin = UserAccount::new("a", Role::Admin, 0);
        let subscriber = student(0).with_subscription(now() + Duration::days(30));

        assert_eq!(
            gate.evaluate(&ContentCategory::McqResult, &admin, now()),
            GateDecision::Granted(GrantReason::Exempt)
        );
        assert_eq!(
            gate.evaluate(&ContentCategory::McqResult, &subscriber, now()),
            GateDecision::Granted(GrantReason::Exempt)
        );
    }

    #[test]
    fn test_expired_subscription_pays() {
        let (gate, _) = make_gate(2);
        let lapsed = student(5).with_subscription(now() - Duration::days(1));
        assert_eq!(
            gate.evaluate(&ContentCategory::McqResult, &lapsed, now()),
            GateDecision::AwaitingConfirmation { cost: 2 }
        );
    }

    #[test]
    fn test_insufficient_credits_denied() {
        let (gate, storage) = make_gate(2);
        let user = student(1);

        let attempt = gate.request_open(&mcq("r1"), &user, now());
        assert_eq!(attempt.state(), &AttemptState::Denied { cost: 2, balance: 1 });
        assert_eq!(user.credits, 1);

        let notice = attempt.notice(user.credits).unwrap();
        assert!(notice.contains("costs 2 credit(s)"));
        assert!(storage.get_item("current_user").unwrap().is_none());
    }

    #[test]
    fn test_confirm_debits_exactly_once() {
        let (gate, storage) = make_gate(2);
        let mut user = student(5);

        let attempt = gate.request_open(&mcq("r1"), &user, now());
        assert_eq!(attempt.state(), &AttemptState::AwaitingConfirmation { cost: 2 });

        let attempt = gate.confirm(attempt, &mut user).unwrap();
        assert_eq!(attempt.state(), &AttemptState::Granted { charged: 2 });
        assert!(attempt.is_granted());
        assert_eq!(user.credits, 3);

        let saved: UserAccount =
            serde_json::from_str(&storage.get_item("current_user").unwrap().unwrap()).unwrap();
        assert_eq!(saved.credits, 3);

        // A granted attempt cannot be confirmed again
        let err = gate.confirm(attempt, &mut user).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidTransition { action: "confirm", .. }));
        assert_eq!(user.credits, 3);
    }

    #[test]
    fn test_cancel_leaves_credits() {
        let (gate, storage) = make_gate(2);
        let user = student(5);

        let attempt = gate.request_open(&mcq("r1"), &user, now()).cancel().unwrap();
        assert_eq!(attempt.state(), &AttemptState::Aborted);
        assert!(!attempt.is_granted());
        assert!(attempt.state().is_terminal());
        assert_eq!(user.credits, 5);
        assert!(storage.get_item("current_user").unwrap().is_none());

        assert!(attempt.cancel().is_err());
    }

    #[test]
    fn test_confirm_rechecks_balance() {
        let (gate, _) = make_gate(2);
        let mut user = student(5);
        let attempt = gate.request_open(&mcq("r1"), &user, now());

        user.credits = 1;
        let attempt = gate.confirm(attempt, &mut user).unwrap();
        assert_eq!(attempt.state(), &AttemptState::Denied { cost: 2, balance: 1 });
        assert_eq!(user.credits, 1);
    }

    #[tokio::test]
    async fn test_confirm_pushes_account_to_sync() {
        use crate::sync::AccountSync;
        use tokio::sync::mpsc;

        struct ChannelSync(mpsc::UnboundedSender<UserAccount>);

        #[async_trait::async_trait]
        impl AccountSync for ChannelSync {
            async fn persist_user(&self, account: &UserAccount) -> Result<()> {
                let _ = self.0.send(account.clone());
                Ok(())
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (gate, _) = make_gate(2);
        let gate = gate.with_sync(Arc::new(ChannelSync(tx)));
        let mut user = student(5);

        let attempt = gate.request_open(&mcq("r1"), &user, now());
        gate.confirm(attempt, &mut user).unwrap();
        gate.settle(std::time::Duration::from_secs(1)).await;

        let synced = rx.try_recv().unwrap();
        assert_eq!(synced.credits, 3);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_debit() {
        use crate::sync::AccountSync;

        struct FailingSync;

        #[async_trait::async_trait]
        impl AccountSync for FailingSync {
            async fn persist_user(&self, _account: &UserAccount) -> Result<()> {
                Err(HistoryError::Sync("503 Service Unavailable".into()))
            }
        }

        let (gate, storage) = make_gate(2);
        let gate = gate.with_sync(Arc::new(FailingSync));
        let mut user = student(5);

        let attempt = gate.request_open(&mcq("r1"), &user, now());
        let attempt = gate.confirm(attempt, &mut user).unwrap();
        gate.settle(std::time::Duration::from_secs(1)).await;

        assert_eq!(attempt.state(), &AttemptState::Granted { charged: 2 });
        assert_eq!(user.credits, 3);
        let saved = AccountStore::new(storage, "current_user").load().unwrap();
        assert_eq!(saved.credits, 3);
    }

    #[test]
    fn test_failed_local_save_keeps_debit() {
        struct ReadOnlyStorage;

        impl LocalStorage for ReadOnlyStorage {
            fn get_item(&self, _key: &str) -> Result<Option<String>> {
                Ok(None)
            }

            fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
                Err(HistoryError::Storage("quota exceeded".into()))
            }
        }

        let accounts = AccountStore::new(Arc::new(ReadOnlyStorage), "current_user");
        let gate = AccessGate::new(SystemSettings { mcq_history_cost: 2 }, accounts);
        let mut user = student(5);

        let attempt = gate.request_open(&mcq("r1"), &user, now());
        let attempt = gate.confirm(attempt, &mut user).unwrap();

        assert!(attempt.is_granted());
        assert_eq!(attempt.state(), &AttemptState::Granted { charged: 2 });
        assert_eq!(user.credits, 3);
    }

    #[test]
    fn test_other_mcq_tags_are_charged() {
        let (gate, _) = make_gate(2);
        let practice = HistoryRecord::new(
            "r1",
            ContentCategory::parse("MCQ_PRACTICE"),
            "Forces drill",
            "Physics",
            now(),
        );

        let attempt = gate.request_open(&practice, &student(0), now());
        assert_eq!(attempt.state(), &AttemptState::Denied { cost: 2, balance: 0 });
    }
}
