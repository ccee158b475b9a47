//! Authorization triples

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// `(subject, object, action)`: role keyword, route template, HTTP method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, FromRow)]
pub struct Policy {
    pub subject: String,
    pub object: String,
    pub action: String,
}

impl Policy {
    /// Build a canonical triple: object lower-case, action upper-case
    pub fn new(
        subject: impl Into<String>,
        object: impl AsRef<str>,
        action: impl AsRef<str>,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: canonical_object(object.as_ref()),
            action: canonical_action(action.as_ref()),
        }
    }

    pub fn canonical(self) -> Self {
        Self::new(self.subject, self.object, self.action)
    }

    pub fn with_subject(&self, subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            ..self.clone()
        }
    }
}

pub fn canonical_object(object: &str) -> String {
    object.to_lowercase()
}

pub fn canonical_action(action: &str) -> String {
    action.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms_collide() {
        assert_eq!(Policy::new("admin", "/X", "get"), Policy::new("admin", "/x", "GET"));
        assert_ne!(Policy::new("Admin", "/x", "GET"), Policy::new("admin", "/x", "GET"));
    }
}
