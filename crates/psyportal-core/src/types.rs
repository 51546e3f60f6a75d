//! Typed records exchanged with the clinic backend and the platform.
//!
//! Payloads are validated here, at the boundary. Only what the client acts on
//! is required (ids, titles, flags); questions and timestamps stay loose so one
//! odd item cannot fail a whole list.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ═══════════════════════════════════════════════════════
// Notification vocabulary
// ═══════════════════════════════════════════════════════

/// Item streams the poll channel watches. Independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Assignment,
    Message,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Assignment, Category::Message];

    /// Deterministic notification tag: repeated emissions for the same item coalesce.
    pub fn dedup_tag(&self, id: i64) -> String {
        match self {
            Category::Assignment => format!("poll-quest-{id}"),
            Category::Message => format!("poll-msg-{id}"),
        }
    }

    /// Fixed storage key for this category's known-ID set.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Category::Assignment => "known_assignment_ids",
            Category::Message => "known_message_ids",
        }
    }

    /// Kind as declared in push payloads (`data.type`).
    pub fn kind(&self) -> &'static str {
        match self {
            Category::Assignment => "questionnaire",
            Category::Message => "message",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "questionnaire" => Some(Category::Assignment),
            "message" => Some(Category::Message),
            _ => None,
        }
    }
}

/// Host notification permission, as the platform reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Default,
    Granted,
    Denied,
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// A notification shown through the host's notification surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNotification {
    /// Dedup tag, e.g. `poll-quest-103`.
    pub tag: String,
    pub title: String,
    pub body: String,
    pub category: Category,
    pub item_id: i64,
}

/// Severity of an in-app alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
}

/// In-app (non-system) alert: foreground pushes and advisories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub key: String,
    pub title: String,
    pub body: String,
    pub level: AlertLevel,
    /// View opened when the alert is clicked, if any.
    #[serde(default)]
    pub target: Option<String>,
}

impl Alert {
    /// Brief, non-blocking advisory (permission or registration trouble).
    pub fn advisory(key: &str, title: &str, body: &str) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            level: AlertLevel::Warning,
            target: None,
        }
    }
}

/// A message delivered by the push provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl PushMessage {
    /// Declared type (`questionnaire`, `message`, ...).
    pub fn kind(&self) -> Option<&str> {
        self.data.get("type").map(String::as_str)
    }

    pub fn item_id(&self) -> Option<&str> {
        self.data.get("id").map(String::as_str)
    }
}

// ═══════════════════════════════════════════════════════
// Backend records
// ═══════════════════════════════════════════════════════

/// Response of `GET /auth/{code}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub id: i64,
    pub patient_code: String,
    pub access_code: String,
    #[serde(default)]
    pub psychologist_name: Option<String>,
    #[serde(default)]
    pub psychologist_schedule: Option<String>,
    pub access_token: String,
}

/// The authenticated patient, persisted between runs until logout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub patient_code: String,
    pub access_code: String,
    pub psychologist_name: String,
    pub psychologist_schedule: String,
    pub token: String,
}

impl From<AuthResponse> for Patient {
    fn from(auth: AuthResponse) -> Self {
        Self {
            id: auth.id,
            patient_code: auth.patient_code,
            access_code: auth.access_code,
            psychologist_name: auth
                .psychologist_name
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Your therapist".into()),
            psychologist_schedule: auth
                .psychologist_schedule
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Available 9:00 - 18:00".into()),
            token: auth.access_token,
        }
    }
}

/// Parse a backend timestamp. Accepts RFC 3339 and naive ISO 8601
/// (`2025-01-01T10:00:00`, read as UTC). Anything else is `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// How a question is answered.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    /// Numeric slider (`scale` / `likert`).
    Scale { min: i64, max: i64 },
    /// Pick one of the listed options (`frequency`).
    Choice { options: Vec<String> },
    /// Free text; also the fallback for unknown types.
    Text,
}

/// Typed view of one questionnaire question.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub text: String,
    pub kind: QuestionKind,
}

impl Question {
    /// Read a raw question. Never fails: missing or odd fields fall back
    /// to a free-text question, scales default to 1..=10.
    pub fn from_value(raw: &serde_json::Value) -> Self {
        let text = raw["text"].as_str().unwrap_or_default().to_string();
        let bound = |key: &str| {
            let v = &raw[key];
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f as i64))
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        };
        let kind = match raw["type"].as_str() {
            Some("scale" | "likert") => {
                let min = bound("min").unwrap_or(1);
                let max = bound("max").unwrap_or(10).max(min);
                QuestionKind::Scale { min, max }
            }
            Some("frequency") => {
                let options: Vec<String> = raw["options"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter(|v| !v.is_null())
                            .map(|v| match v.as_str() {
                                Some(s) => s.to_string(),
                                None => v.to_string(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if options.is_empty() {
                    QuestionKind::Text
                } else {
                    QuestionKind::Choice { options }
                }
            }
            _ => QuestionKind::Text,
        };
        Self { text, kind }
    }

    /// Interpret typed input as this question's answer. `None` means the
    /// input is not acceptable and the question should be asked again.
    /// Choices accept either the 1-based option number or the option text.
    pub fn parse_answer(&self, input: &str) -> Option<serde_json::Value> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        match &self.kind {
            QuestionKind::Scale { min, max } => {
                let value: i64 = input.parse().ok()?;
                (*min..=*max).contains(&value).then(|| value.into())
            }
            QuestionKind::Choice { options } => {
                if let Ok(n) = input.parse::<usize>() {
                    return options.get(n.checked_sub(1)?).map(|o| o.clone().into());
                }
                options
                    .iter()
                    .find(|o| o.eq_ignore_ascii_case(input))
                    .map(|o| o.clone().into())
            }
            QuestionKind::Text => Some(input.into()),
        }
    }
}

/// Questionnaire as embedded in assignments. Questions stay raw JSON so an
/// unusual question never fails the surrounding list; see [`Question::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Questionnaire {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub questions: Vec<serde_json::Value>,
}

impl Questionnaire {
    pub fn questions(&self) -> Vec<Question> {
        self.questions.iter().map(Question::from_value).collect()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Sent,
    Completed,
    #[serde(other)]
    Other,
}

/// One pending questionnaire completion (`GET /assignments/pending`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAssignment {
    pub id: i64,
    pub assignment_id: i64,
    pub status: CompletionStatus,
    pub questionnaire: Questionnaire,
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub deadline_hours: Option<i64>,
}

impl PendingAssignment {
    pub fn title(&self) -> &str {
        &self.questionnaire.title
    }

    /// Answer deadline: explicit `deadline`, else `scheduled_at + deadline_hours` (24h default).
    pub fn due_by(&self) -> Option<DateTime<Utc>> {
        if let Some(at) = self.deadline.as_deref().and_then(parse_timestamp) {
            return Some(at);
        }
        let start = self.scheduled_at.as_deref().and_then(parse_timestamp)?;
        Some(start + chrono::Duration::hours(self.deadline_hours.unwrap_or(24)))
    }

    /// Past its deadline at `now`. Unknown deadlines are never late.
    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        self.due_by().is_some_and(|due| now >= due)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Active,
    Paused,
    Completed,
    #[serde(other)]
    Other,
}

/// Assignment schedule (`GET /assignments/patient/{code}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub assigned_at: Option<String>,
    #[serde(default)]
    pub frequency_type: Option<String>,
    #[serde(default)]
    pub frequency_count: Option<u32>,
    #[serde(default)]
    pub deadline_hours: Option<u32>,
    #[serde(default)]
    pub next_scheduled_at: Option<String>,
    pub questionnaire: Questionnaire,
}

impl Assignment {
    /// Active and its next scheduled slot (if any) has arrived.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status != AssignmentStatus::Active {
            return false;
        }
        self.next_scheduled_at
            .as_deref()
            .and_then(parse_timestamp)
            .is_none_or(|at| now >= at)
    }
}

/// One chat message between patient and therapist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub patient_id: i64,
    pub content: String,
    pub is_from_patient: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// True when the latest message came from the therapist and is newer than `last_read`.
pub fn has_unread(messages: &[ChatMessage], last_read: Option<i64>) -> bool {
    match messages.last() {
        Some(last) if !last.is_from_patient => last_read.is_none_or(|read| read < last.id),
        _ => false,
    }
}

/// `GET /patient/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientStatus {
    pub is_online: bool,
    pub psychologist_is_online: bool,
}

/// `GET /patient/me`, only the fields the client syncs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default)]
    pub psychologist_name: Option<String>,
    #[serde(default)]
    pub psychologist_schedule: Option<String>,
}

/// One answer in a questionnaire submission (`POST /assignments/{id}/submit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_index: usize,
    pub question_text: String,
    pub answer: serde_json::Value,
}
