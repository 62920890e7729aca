//! Lists, tasks and per-list drafts.
//!
//! # Responsibility
//! - Define the canonical list/task records mirrored from the store.
//! - Convert records to and from store document fields.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes afterwards.
//! - `priority` is never empty once persisted; unknown values fail decoding.
//! - Draft state is transient and never written to the store as-is.

use crate::store::{Document, DocumentId, Fields};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Store-assigned identifier of a list document.
pub type ListId = DocumentId;
/// Store-assigned identifier of a task document.
pub type TaskId = DocumentId;

/// Field carrying the owner partition key on every document.
pub const OWNER_FIELD: &str = "owner_id";
/// Field carrying the parent list id on task documents.
pub const LIST_FIELD: &str = "list_id";

/// Client-side validation failures. Callers treat these as silent no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    BlankOwnerId,
    BlankListName,
    BlankTaskTitle,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankOwnerId => write!(f, "owner id must not be blank"),
            Self::BlankListName => write!(f, "list name must not be blank"),
            Self::BlankTaskTitle => write!(f, "task title must not be blank"),
        }
    }
}

impl Error for ValidationError {}

/// Failure to turn a store document into a domain record.
#[derive(Debug)]
pub struct DecodeError {
    pub id: DocumentId,
    source: serde_json::Error,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid document {}: {}", self.id, self.source)
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Opaque owner partition key supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Builds an owner id from provider output, rejecting blank values.
    ///
    /// The value is kept byte for byte; it is an opaque partition key.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::BlankOwnerId);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task priority. Declaration order is the board column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Every priority in display order.
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Low" | "low" => Ok(Self::Low),
            "Medium" | "medium" => Ok(Self::Medium),
            "High" | "high" => Ok(Self::High),
            other => Err(format!("unknown priority `{other}`")),
        }
    }
}

/// One board list (a column group on the board).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    pub id: ListId,
    pub name: String,
    pub owner_id: OwnerId,
}

#[derive(Serialize, Deserialize)]
struct ListFields {
    name: String,
    owner_id: OwnerId,
}

impl TaskList {
    /// Fields written by `create` for a new list.
    pub fn new_fields(name: &str, owner_id: &OwnerId) -> Fields {
        to_fields(&ListFields {
            name: name.to_string(),
            owner_id: owner_id.clone(),
        })
    }

    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let fields: ListFields = decode_fields(doc)?;
        Ok(Self {
            id: doc.id,
            name: fields.name,
            owner_id: fields.owner_id,
        })
    }
}

/// One task card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub list_id: ListId,
    pub owner_id: OwnerId,
}

#[derive(Serialize, Deserialize)]
struct TaskFields {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    priority: Priority,
    list_id: ListId,
    owner_id: OwnerId,
}

impl Task {
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let fields: TaskFields = decode_fields(doc)?;
        Ok(Self {
            id: doc.id,
            title: fields.title,
            description: fields.description,
            due_date: fields.due_date,
            priority: fields.priority,
            list_id: fields.list_id,
            owner_id: fields.owner_id,
        })
    }

    /// Bucket this task currently belongs to.
    pub fn bucket(&self) -> BucketKey {
        BucketKey::new(self.list_id, self.priority)
    }

    /// Partial fields that move a task into `bucket`.
    pub fn bucket_fields(bucket: BucketKey) -> Fields {
        let mut fields = Fields::new();
        fields.insert(LIST_FIELD.to_string(), Value::String(bucket.list_id.to_string()));
        fields.insert(
            "priority".to_string(),
            Value::String(bucket.priority.as_str().to_string()),
        );
        fields
    }
}

/// Uncommitted task form state for one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    /// `None` until the user picks one; submitted as `Priority::Medium`.
    pub priority: Option<Priority>,
}

impl TaskDraft {
    pub fn is_submittable(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Fields written by `create` when this draft is submitted to `list_id`.
    pub fn to_fields(&self, list_id: ListId, owner_id: &OwnerId) -> Result<Fields, ValidationError> {
        if !self.is_submittable() {
            return Err(ValidationError::BlankTaskTitle);
        }
        Ok(to_fields(&TaskFields {
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            due_date: self.due_date,
            priority: self.priority.unwrap_or(Priority::Medium),
            list_id,
            owner_id: owner_id.clone(),
        }))
    }
}

/// Partial edit of a task's user-editable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<Priority>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
    }

    /// Returns `task` with this patch applied.
    pub fn apply_to(&self, task: &Task) -> Result<Task, ValidationError> {
        let mut next = task.clone();
        if let Some(title) = &self.title {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::BlankTaskTitle);
            }
            next.title = trimmed.to_string();
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            next.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        Ok(next)
    }

    /// Partial store fields for the patched values only.
    pub fn to_fields(&self, patched: &Task) -> Fields {
        let mut fields = Fields::new();
        if self.title.is_some() {
            fields.insert("title".to_string(), Value::String(patched.title.clone()));
        }
        if self.description.is_some() {
            fields.insert(
                "description".to_string(),
                Value::String(patched.description.clone()),
            );
        }
        if self.due_date.is_some() {
            let value = patched
                .due_date
                .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
            fields.insert("due_date".to_string(), value);
        }
        if self.priority.is_some() {
            fields.insert(
                "priority".to_string(),
                Value::String(patched.priority.as_str().to_string()),
            );
        }
        fields
    }
}

/// Finest-grained drop target: one priority lane inside one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub list_id: ListId,
    pub priority: Priority,
}

impl BucketKey {
    pub fn new(list_id: ListId, priority: Priority) -> Self {
        Self { list_id, priority }
    }

    /// Parses a drop-target id rendered by `Display` (`<list uuid>:<Priority>`).
    pub fn parse(value: &str) -> Option<Self> {
        let (list_part, priority_part) = value.trim().rsplit_once(':')?;
        let list_id = Uuid::parse_str(list_part).ok()?;
        let priority = priority_part.parse().ok()?;
        Some(Self { list_id, priority })
    }
}

impl Display for BucketKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.list_id, self.priority)
    }
}

fn to_fields<T: Serialize>(value: &T) -> Fields {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Fields::new(),
    }
}

fn decode_fields<T: for<'de> Deserialize<'de>>(doc: &Document) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(doc.fields.clone()))
        .map_err(|source| DecodeError { id: doc.id, source })
}
