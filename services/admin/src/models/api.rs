//! Registered endpoint descriptors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Pagination;
use super::admin::contains;

/// `(method, path, category, description)` of one gated route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Api {
    pub id: i64,
    pub method: String,
    pub path: String,
    pub category: String,
    #[sqlx(rename = "description")]
    pub desc: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Api creation and update payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewApi {
    pub method: String,
    pub path: String,
    pub category: String,
    #[serde(default)]
    pub desc: String,
    #[serde(skip)]
    pub creator: String,
}

impl NewApi {
    pub fn new(method: &str, path: &str, category: &str, desc: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            category: category.to_string(),
            desc: desc.to_string(),
            creator: "system".to_string(),
        }
    }
}

/// Api list filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiQuery {
    pub method: Option<String>,
    pub path: Option<String>,
    pub category: Option<String>,
    pub creator: Option<String>,
    #[serde(default)]
    pub page_num: u32,
    #[serde(default)]
    pub page_size: u32,
}

impl ApiQuery {
    pub fn page(&self) -> Pagination {
        Pagination {
            page_num: self.page_num,
            page_size: self.page_size,
        }
    }

    pub fn matches(&self, api: &Api) -> bool {
        contains(&api.method, self.method.as_deref())
            && contains(&api.path, self.path.as_deref())
            && contains(&api.category, self.category.as_deref())
            && contains(&api.creator, self.creator.as_deref())
    }
}

/// Apis grouped under their category
#[derive(Debug, Clone, Serialize)]
pub struct ApiTreeNode {
    pub category: String,
    pub children: Vec<Api>,
}

/// Group by category, categories in first-seen order
pub fn group_by_category(apis: Vec<Api>) -> Vec<ApiTreeNode> {
    let mut tree: Vec<ApiTreeNode> = Vec::new();
    for api in apis {
        match tree.iter_mut().find(|node| node.category == api.category) {
            Some(node) => node.children.push(api),
            None => tree.push(ApiTreeNode {
                category: api.category.clone(),
                children: vec![api],
            }),
        }
    }
    tree
}
