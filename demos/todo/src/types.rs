//! Domain types for the todo demo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use weave_core::validation::{FieldRules, Validate};

/// Unique identifier for a todo item
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TodoId(Uuid);

impl TodoId {
    /// Creates a new random `TodoId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses the textual form used in query strings
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single todo item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Unique identifier
    pub id: TodoId,
    /// User who created the item
    pub owner: String,
    /// Title/description of the todo
    pub title: String,
    /// Free-form labels
    pub tags: Vec<String>,
    /// Whether the todo is completed
    pub completed: bool,
    /// When the todo was created
    pub created_at: DateTime<Utc>,
    /// When the todo was completed (if completed)
    pub completed_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    /// Creates an open item owned by `owner`
    #[must_use]
    pub fn new(owner: String, draft: NewTodo) -> Self {
        Self {
            id: TodoId::new(),
            owner,
            title: draft.title,
            tags: draft.tags,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Body of a create request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTodo {
    /// Title of the new item
    pub title: String,
    /// Labels attached at creation
    pub tags: Vec<String>,
}

impl Validate for NewTodo {
    fn rules() -> Vec<FieldRules> {
        vec![
            FieldRules::new("title")
                .required()
                .max_length(120)
                .message("required=title is required, max_length=title is too long"),
            FieldRules::new("tags")
                .max_length(8)
                .message("at most 8 tags are allowed"),
        ]
    }

    fn validate(&self) -> Result<(), String> {
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err("tags must not be blank".to_string());
        }
        Ok(())
    }
}
