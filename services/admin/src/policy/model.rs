//! Policy model definition
//!
//! The model uses the casbin `.conf` layout. Only one shape is supported:
//! `(sub, obj, act)` requests matched exactly against `(sub, obj, act)`
//! policies. Anything else is refused at start-up.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Model shipped with the binary, used when `casbin.model-path` is empty
pub const DEFAULT_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("failed to read policy model {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("policy model is missing [{section}] {key}")]
    Missing { section: &'static str, key: &'static str },
    #[error("unsupported {what}: {found}")]
    Unsupported { what: &'static str, found: String },
}

/// A validated model; carries nothing beyond the fact that it was checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyModel {
    pub matcher: String,
}

impl PolicyModel {
    /// Load from `path`, or the embedded model when `path` is empty
    pub fn load(path: &str) -> Result<Self, ModelError> {
        if path.trim().is_empty() {
            return Self::parse(DEFAULT_MODEL);
        }
        let text = std::fs::read_to_string(Path::new(path)).map_err(|e| ModelError::Read {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let sections = sections(text);
        let get = |section: &'static str, key: &'static str| {
            sections
                .get(section)
                .and_then(|entries| entries.get(key))
                .cloned()
                .ok_or(ModelError::Missing { section, key })
        };

        let request = get("request_definition", "r")?;
        if fields(&request) != ["sub", "obj", "act"] {
            return Err(ModelError::Unsupported {
                what: "request definition",
                found: request,
            });
        }

        let policy = get("policy_definition", "p")?;
        if fields(&policy) != ["sub", "obj", "act"] {
            return Err(ModelError::Unsupported {
                what: "policy definition",
                found: policy,
            });
        }

        let matcher = get("matchers", "m")?;
        let mut clauses: Vec<String> = matcher
            .split("&&")
            .map(|clause| clause.split_whitespace().collect::<String>())
            .collect();
        clauses.sort();
        if clauses != ["r.act==p.act", "r.obj==p.obj", "r.sub==p.sub"] {
            return Err(ModelError::Unsupported {
                what: "matcher",
                found: matcher,
            });
        }

        Ok(Self { matcher })
    }
}

fn fields(definition: &str) -> Vec<String> {
    definition
        .split(',')
        .map(|field| field.trim().to_string())
        .collect()
}

fn sections(text: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_string();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_model_is_valid() {
        assert!(PolicyModel::load("").is_ok());
    }

    #[test]
    fn matcher_clause_order_does_not_matter() {
        let text = DEFAULT_MODEL.replace(
            "m = r.sub == p.sub && r.obj == p.obj && r.act == p.act",
            "m = r.act==p.act && r.sub == p.sub && r.obj == p.obj",
        );
        assert!(PolicyModel::parse(&text).is_ok());
    }

    #[test]
    fn rejects_pattern_matchers_and_missing_sections() {
        let text = DEFAULT_MODEL.replace(
            "r.obj == p.obj",
            "keyMatch2(r.obj, p.obj)",
        );
        assert!(matches!(
            PolicyModel::parse(&text),
            Err(ModelError::Unsupported { what: "matcher", .. })
        ));

        let text = DEFAULT_MODEL.replace("p = sub, obj, act", "");
        assert_eq!(
            PolicyModel::parse(&text),
            Err(ModelError::Missing {
                section: "policy_definition",
                key: "p"
            })
        );
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(matches!(
            PolicyModel::load("/nonexistent/rbac_model.conf"),
            Err(ModelError::Read { .. })
        ));
    }
}
