//! Menu model and tree assembly

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Status;

/// Navigation node; `parent_id = 0` marks a root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub icon: Option<String>,
    pub path: String,
    pub redirect: Option<String>,
    pub component: String,
    pub sort: i32,
    #[sqlx(try_from = "i16")]
    pub status: Status,
    pub hidden: bool,
    pub parent_id: i64,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Menu>,
}

/// Menu creation and update payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMenu {
    pub name: String,
    pub title: String,
    pub icon: Option<String>,
    pub path: String,
    pub redirect: Option<String>,
    pub component: String,
    #[serde(default = "default_sort")]
    pub sort: i32,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub parent_id: i64,
    #[serde(skip)]
    pub creator: String,
}

fn default_sort() -> i32 {
    999
}

/// Nest a flat menu list by `parent_id`, siblings ordered by `sort` then id
///
/// Nodes whose parent is not in the list are promoted to roots so a partial
/// grant still renders.
pub fn build_tree(mut menus: Vec<Menu>) -> Vec<Menu> {
    menus.sort_by_key(|menu| (menu.sort, menu.id));
    let present: std::collections::HashSet<i64> = menus.iter().map(|m| m.id).collect();

    let mut by_parent: HashMap<i64, Vec<Menu>> = HashMap::new();
    for menu in menus {
        let parent = if present.contains(&menu.parent_id) {
            menu.parent_id
        } else {
            0
        };
        by_parent.entry(parent).or_default().push(menu);
    }

    fn attach(parent: i64, by_parent: &mut HashMap<i64, Vec<Menu>>) -> Vec<Menu> {
        let mut nodes = by_parent.remove(&parent).unwrap_or_default();
        for node in &mut nodes {
            node.children = attach(node.id, by_parent);
        }
        nodes
    }

    attach(0, &mut by_parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu(id: i64, parent_id: i64, sort: i32) -> Menu {
        let now = Utc::now();
        Menu {
            id,
            name: format!("m{id}"),
            title: format!("Menu {id}"),
            icon: None,
            path: format!("/m{id}"),
            redirect: None,
            component: "Layout".into(),
            sort,
            status: Status::Active,
            hidden: false,
            parent_id,
            creator: "system".into(),
            created_at: now,
            updated_at: now,
            children: vec![],
        }
    }

    #[test]
    fn tree_nests_and_orders_children() {
        let tree = build_tree(vec![menu(3, 1, 2), menu(1, 0, 5), menu(2, 1, 1), menu(4, 0, 1)]);
        let roots: Vec<i64> = tree.iter().map(|m| m.id).collect();
        assert_eq!(roots, vec![4, 1]);
        let children: Vec<i64> = tree[1].children.iter().map(|m| m.id).collect();
        assert_eq!(children, vec![2, 3]);
    }

    #[test]
    fn orphans_become_roots() {
        let tree = build_tree(vec![menu(7, 42, 1)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, 7);
    }
}
