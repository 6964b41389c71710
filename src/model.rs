//! History records and the learner account they are gated against

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content category of a history record.
///
/// Stored as a plain string tag. Unknown tags are kept verbatim in
/// `McqOther` or `Other` so foreign records still load and round-trip.
/// Any tag containing `MCQ` is a multiple-choice variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentCategory {
    /// Generated lesson
    Lesson,
    /// Multiple-choice quiz
    McqQuiz,
    /// Scored multiple-choice result
    McqResult,
    /// Premium study notes
    PremiumNotes,
    /// Any other multiple-choice tag
    McqOther(String),
    /// Anything else
    Other(String),
}

impl ContentCategory {
    /// Parse from string representation
    pub fn parse(tag: &str) -> Self {
        match tag {
            "LESSON" => Self::Lesson,
            "MCQ" | "MCQ_QUIZ" => Self::McqQuiz,
            "MCQ_RESULT" => Self::McqResult,
            "PREMIUM_NOTES" => Self::PremiumNotes,
            other if other.contains("MCQ") => Self::McqOther(other.to_string()),
            other => Self::Other(other.to_string()),
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Lesson => "LESSON",
            Self::McqQuiz => "MCQ_QUIZ",
            Self::McqResult => "MCQ_RESULT",
            Self::PremiumNotes => "PREMIUM_NOTES",
            Self::McqOther(tag) | Self::Other(tag) => tag,
        }
    }

    /// Whether reopening this category from history costs credits
    pub fn is_gated(&self) -> bool {
        match self {
            Self::McqQuiz | Self::McqResult | Self::McqOther(_) => true,
            Self::Lesson | Self::PremiumNotes | Self::Other(_) => false,
        }
    }
}

impl From<String> for ContentCategory {
    fn from(tag: String) -> Self {
        Self::parse(&tag)
    }
}

impl From<ContentCategory> for String {
    fn from(category: ContentCategory) -> Self {
        category.as_str().to_string()
    }
}

impl std::fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A saved lesson or quiz.
///
/// Records are never mutated in place; the store replaces whole
/// records or rewrites the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub category: ContentCategory,
    pub title: String,
    pub subject_name: String,
    pub date_created: DateTime<Utc>,
    /// Lesson payload, handed to the viewer untouched
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl HistoryRecord {
    pub fn new(
        id: impl Into<String>,
        category: ContentCategory,
        title: impl Into<String>,
        subject_name: impl Into<String>,
        date_created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            title: title.into(),
            subject_name: subject_name.into(),
            date_created,
            payload: Map::new(),
        }
    }

    /// Case-insensitive match on title or subject; `needle` must already be lowercase
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.subject_name.to_lowercase().contains(needle)
    }
}

/// Account role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Other(role) => role,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Student
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.to_lowercase().as_str() {
            "admin" => Self::Admin,
            "teacher" => Self::Teacher,
            "student" => Self::Student,
            _ => Self::Other(role),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The signed-in learner. Owned by the account service; this crate keeps a
/// local copy and debits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    #[serde(default)]
    pub credits: u32,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_end_date: Option<DateTime<Utc>>,
    /// Profile fields this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserAccount {
    pub fn new(id: impl Into<String>, role: Role, credits: u32) -> Self {
        Self {
            id: id.into(),
            credits,
            role,
            is_premium: false,
            subscription_end_date: None,
            extra: Map::new(),
        }
    }

    pub fn with_subscription(mut self, end: DateTime<Utc>) -> Self {
        self.is_premium = true;
        self.subscription_end_date = Some(end);
        self
    }

    /// Subscription counts only while its end date is strictly in the future
    pub fn has_active_subscription(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.subscription_end_date.map_or(false, |end| end > now)
    }

    /// Admins and active subscribers never pay for history
    pub fn is_exempt(&self, now: DateTime<Utc>) -> bool {
        self.role == Role::Admin || self.has_active_subscription(now)
    }
}
