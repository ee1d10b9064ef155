//! Note model and field validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{FieldError, ValidationError};

/// Maximum length of a note title
pub const TITLE_MAX_LEN: usize = 100;
/// Maximum length of a note body
pub const BODY_MAX_LEN: usize = 400;

/// Note entity
///
/// The key is an opaque string assigned by the store on creation and never
/// reused within the same store instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub key: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Note creation/update payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub body: String,
}

impl NoteDraft {
    /// Validate title and body against the schema bounds
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.title.is_empty() {
            errors.push(FieldError::new("title", "Title cannot be blank"));
        } else if self.title.chars().count() > TITLE_MAX_LEN {
            errors.push(FieldError::new(
                "title",
                format!("Title must be at most {} characters long", TITLE_MAX_LEN),
            ));
        }

        if self.body.is_empty() {
            errors.push(FieldError::new("body", "Body cannot be blank"));
        } else if self.body.chars().count() > BODY_MAX_LEN {
            errors.push(FieldError::new(
                "body",
                format!("Body must be at most {} characters long", BODY_MAX_LEN),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, body: &str) -> NoteDraft {
        NoteDraft {
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn accepts_bounded_fields() {
        assert!(draft("Myth of Zeus", "Zeus is the Father...").validate().is_ok());
        assert!(draft(&"t".repeat(TITLE_MAX_LEN), &"b".repeat(BODY_MAX_LEN))
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_blank_fields() {
        let err = draft("", "").validate().unwrap_err();
        let fields: Vec<_> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "body"]);
    }

    #[test]
    fn rejects_overlong_fields() {
        assert!(draft(&"t".repeat(TITLE_MAX_LEN + 1), "ok").validate().is_err());
        assert!(draft("ok", &"b".repeat(BODY_MAX_LEN + 1)).validate().is_err());
    }
}
