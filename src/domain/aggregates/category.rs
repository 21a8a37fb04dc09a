//! Category tree for the catalog.
//!
//! Categories live in a flat `id -> node` map and reference their parent by
//! id only. Ancestor and descendant queries walk the map, so there are no
//! live parent pointers to keep cyclic ownership in check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::line_item::ValidationError;

#[derive(Clone, Debug, Serialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        parent_id: Option<Uuid>,
    ) -> Result<Self, CategoryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::new("name", "must not be empty").into());
        }
        let slug = name.trim().to_lowercase().replace(' ', "-");
        Ok(Self { id: Uuid::new_v4(), name, slug, description, parent_id, created_at: Utc::now() })
    }
}

#[derive(Debug, Clone, Error)]
pub enum CategoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("category {category_id} not found")]
    NotFound { category_id: Uuid },
    #[error("parent category {parent_id} not found")]
    ParentNotFound { parent_id: Uuid },
    #[error("category {category_id} cannot be its own parent")]
    OwnParent { category_id: Uuid },
    #[error("category {category_id} cannot be parented to its descendant {parent_id}")]
    Cycle { category_id: Uuid, parent_id: Uuid },
}

/// Flat map of all categories.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CategoryTree {
    nodes: HashMap<Uuid, Category>,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the tree from stored rows. Rows are trusted; invariants are
    /// enforced on mutation.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Category>) -> Self {
        Self { nodes: nodes.into_iter().map(|c| (c.id, c)).collect() }
    }

    pub fn get(&self, id: Uuid) -> Option<&Category> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.nodes.values()
    }

    pub fn insert(&mut self, category: Category) -> Result<Uuid, CategoryError> {
        if let Some(parent_id) = category.parent_id {
            if parent_id == category.id {
                return Err(CategoryError::OwnParent { category_id: category.id });
            }
            if !self.nodes.contains_key(&parent_id) {
                return Err(CategoryError::ParentNotFound { parent_id });
            }
        }
        let id = category.id;
        self.nodes.insert(id, category);
        Ok(id)
    }

    /// Re-parents a category. A category may not become its own parent, and
    /// may not be parented to one of its own descendants.
    pub fn set_parent(&mut self, id: Uuid, parent_id: Option<Uuid>) -> Result<(), CategoryError> {
        if !self.nodes.contains_key(&id) {
            return Err(CategoryError::NotFound { category_id: id });
        }
        if let Some(parent_id) = parent_id {
            if parent_id == id {
                return Err(CategoryError::OwnParent { category_id: id });
            }
            if !self.nodes.contains_key(&parent_id) {
                return Err(CategoryError::ParentNotFound { parent_id });
            }
            if self.descendants(id).iter().any(|c| c.id == parent_id) {
                return Err(CategoryError::Cycle { category_id: id, parent_id });
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent_id = parent_id;
        }
        Ok(())
    }

    /// Parent chain from the immediate parent up to the root.
    pub fn ancestors(&self, id: Uuid) -> Vec<&Category> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|c| c.parent_id);
        while let Some(parent_id) = current {
            match self.nodes.get(&parent_id) {
                Some(parent) => {
                    out.push(parent);
                    current = parent.parent_id;
                }
                None => break,
            }
        }
        out
    }

    /// Every category below `id`.
    pub fn descendants(&self, id: Uuid) -> Vec<&Category> {
        let mut out = Vec::new();
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            for child in self.nodes.values().filter(|c| c.parent_id == Some(current)) {
                frontier.push(child.id);
                out.push(child);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (CategoryTree, Uuid, Uuid, Uuid) {
        let mut tree = CategoryTree::new();
        let root = tree.insert(Category::new("Heating", None, None).unwrap()).unwrap();
        let mid = tree
            .insert(Category::new("Furnaces", None, Some(root)).unwrap())
            .unwrap();
        let leaf = tree
            .insert(Category::new("Gas Furnaces", None, Some(mid)).unwrap())
            .unwrap();
        (tree, root, mid, leaf)
    }

    #[test]
    fn slug_is_derived_from_name() {
        let c = Category::new("Heat Pumps", None, None).unwrap();
        assert_eq!(c.slug, "heat-pumps");
    }

    #[test]
    fn ancestors_walk_to_the_root() {
        let (tree, root, mid, leaf) = tree();
        let ancestors: Vec<Uuid> = tree.ancestors(leaf).iter().map(|c| c.id).collect();
        assert_eq!(ancestors, vec![mid, root]);
        assert!(tree.ancestors(root).is_empty());
    }

    #[test]
    fn descendants_cover_the_subtree() {
        let (tree, root, mid, leaf) = tree();
        let mut ids: Vec<Uuid> = tree.descendants(root).iter().map(|c| c.id).collect();
        ids.sort();
        let mut expected = vec![mid, leaf];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn own_parent_is_rejected() {
        let (mut tree, root, _, _) = tree();
        assert!(matches!(
            tree.set_parent(root, Some(root)),
            Err(CategoryError::OwnParent { .. })
        ));
    }

    #[test]
    fn reparenting_to_a_descendant_is_rejected() {
        let (mut tree, root, _, leaf) = tree();
        assert!(matches!(
            tree.set_parent(root, Some(leaf)),
            Err(CategoryError::Cycle { .. })
        ));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut tree = CategoryTree::new();
        let orphan = Category::new("Ducting", None, Some(Uuid::new_v4())).unwrap();
        assert!(matches!(tree.insert(orphan), Err(CategoryError::ParentNotFound { .. })));
    }

    #[test]
    fn reparenting_moves_a_subtree() {
        let (mut tree, root, mid, leaf) = tree();
        tree.set_parent(leaf, Some(root)).unwrap();
        let ancestors: Vec<Uuid> = tree.ancestors(leaf).iter().map(|c| c.id).collect();
        assert_eq!(ancestors, vec![root]);
        assert_eq!(tree.descendants(mid).len(), 0);
    }
}
