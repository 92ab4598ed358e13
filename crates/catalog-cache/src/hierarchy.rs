//! Category hierarchy resolution.
//!
//! Categories arrive as a flat list with parent pointers. The resolver walks
//! those pointers to rebuild a node's ancestry and maps URL segments, slugs
//! and display names back to nodes.

use fnv::FnvHashMap;

use crate::error::{CatalogError, Result};
use crate::query::{normalize_token, FilterSpec};
use crate::types::{CategoryNode, Ref, SUB_CATEGORY_LEVELS};

/// Longest valid chain: a top-level category plus four subcategory levels.
pub const MAX_HIERARCHY_DEPTH: usize = SUB_CATEGORY_LEVELS + 1;

/// A node's ancestors, one slot per level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ancestry {
    pub top_category: Option<Ref>,
    pub level1: Option<Ref>,
    pub level2: Option<Ref>,
    pub level3: Option<Ref>,
    pub level4: Option<Ref>,
}

impl Ancestry {
    fn slot_mut(&mut self, level: usize) -> Option<&mut Option<Ref>> {
        match level {
            0 => Some(&mut self.top_category),
            1 => Some(&mut self.level1),
            2 => Some(&mut self.level2),
            3 => Some(&mut self.level3),
            4 => Some(&mut self.level4),
            _ => None,
        }
    }

    /// Slots from the top-level category down.
    pub fn levels(&self) -> [Option<&Ref>; MAX_HIERARCHY_DEPTH] {
        [
            self.top_category.as_ref(),
            self.level1.as_ref(),
            self.level2.as_ref(),
            self.level3.as_ref(),
            self.level4.as_ref(),
        ]
    }

    /// Display names from the top down, skipping empty slots.
    pub fn names(&self) -> Vec<&str> {
        self.levels()
            .into_iter()
            .flatten()
            .filter_map(|value| value.name.as_deref())
            .collect()
    }

    /// Narrows `spec` to this ancestry, matching every level by id.
    pub fn constrain(&self, mut spec: FilterSpec) -> FilterSpec {
        if let Some(id) = self.top_category.as_ref().and_then(Ref::id) {
            spec.top_category = Some(id.to_string());
        }
        let [_, sub_levels @ ..] = self.levels();
        for (slot, value) in sub_levels.into_iter().enumerate() {
            if let Some(id) = value.and_then(Ref::id) {
                spec.sub_category_levels[slot] = Some(id.to_string());
            }
        }
        spec
    }
}

/// A node with its lookup tokens computed once.
#[derive(Debug, Clone)]
struct IndexedNode {
    node: CategoryNode,
    slug_token: String,
    name_token: String,
}

impl IndexedNode {
    fn matches(&self, raw: &str, normalized: &str) -> bool {
        if self.node.id == raw {
            return true;
        }
        !normalized.is_empty() && (self.slug_token == normalized || self.name_token == normalized)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HierarchyResolver {
    nodes: Vec<IndexedNode>,
    by_id: FnvHashMap<String, usize>,
}

impl HierarchyResolver {
    pub fn new(nodes: impl IntoIterator<Item = CategoryNode>) -> Self {
        let nodes: Vec<IndexedNode> = nodes
            .into_iter()
            .map(|node| IndexedNode {
                slug_token: normalize_token(&node.slug),
                name_token: normalize_token(&node.name),
                node,
            })
            .collect();

        let mut by_id = FnvHashMap::default();
        for (position, indexed) in nodes.iter().enumerate() {
            if by_id.insert(indexed.node.id.clone(), position).is_some() {
                log::warn!("duplicate category id {}; keeping the later node", indexed.node.id);
            }
        }
        Self { nodes, by_id }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CategoryNode> {
        self.by_id.get(id).map(|&position| &self.nodes[position].node)
    }

    /// Rebuilds the ancestry of `node_id` by walking parent pointers.
    ///
    /// Each node fills the slot named by its own `level`, so a chain that
    /// skips a level leaves that slot empty. The walk ends at the top-level
    /// category. A parent pointer naming an unknown node ends it early. A chain
    /// longer than [`MAX_HIERARCHY_DEPTH`], or a parent whose level is not
    /// above its child's, is a cycle or corrupt data and fails with
    /// `StructuralIntegrityError`.
    pub fn resolve_ancestry(&self, node_id: &str) -> Result<Ancestry> {
        let mut current = self
            .get(node_id)
            .ok_or_else(|| CatalogError::CategoryNotFound(node_id.to_string()))?;
        let mut child_level: Option<u8> = None;
        let mut ancestry = Ancestry::default();

        for step in 1.. {
            if step > MAX_HIERARCHY_DEPTH {
                return Err(CatalogError::StructuralIntegrityError(format!(
                    "ancestry of {node_id} exceeds {MAX_HIERARCHY_DEPTH} levels"
                )));
            }
            if let Some(child_level) = child_level.filter(|&child| current.level >= child) {
                return Err(CatalogError::StructuralIntegrityError(format!(
                    "category {} at level {} is the parent of a level {child_level} category in the ancestry of {node_id}",
                    current.id, current.level
                )));
            }
            let slot = ancestry.slot_mut(usize::from(current.level)).ok_or_else(|| {
                CatalogError::StructuralIntegrityError(format!(
                    "category {} sits at level {} in the ancestry of {node_id}",
                    current.id, current.level
                ))
            })?;
            *slot = Some(current.to_ref());
            if current.level == 0 {
                break;
            }
            child_level = Some(current.level);

            let Some(parent_id) = current.parent_id() else {
                break;
            };
            let Some(parent) = self.get(parent_id) else {
                log::warn!(
                    "category {} points at unknown parent {parent_id}; ancestry of {node_id} is partial",
                    current.id
                );
                break;
            };
            current = parent;
        }

        Ok(ancestry)
    }

    /// Finds the node whose id, slug or name matches `token`.
    ///
    /// Slugs and names compare after normalization, ids compare raw. With a
    /// scope, direct children of the scope are searched first; when none
    /// match, or without a scope, the first match among all nodes wins.
    pub fn find_node(&self, token: &str, scope_parent_id: Option<&str>) -> Option<&CategoryNode> {
        let raw = token.trim();
        if raw.is_empty() {
            return None;
        }
        let normalized = normalize_token(raw);

        let scoped = scope_parent_id.and_then(|scope| {
            self.nodes
                .iter()
                .find(|indexed| indexed.node.is_child_of(scope) && indexed.matches(raw, &normalized))
        });
        scoped
            .or_else(|| {
                self.nodes
                    .iter()
                    .find(|indexed| indexed.matches(raw, &normalized))
            })
            .map(|indexed| &indexed.node)
    }

    /// Resolves a deep link such as `computers/gaming-laptops/rtx-4060`.
    ///
    /// Each resolved node scopes the next segment. Resolution stops at the
    /// first segment that matches nothing and returns the nodes found so far.
    pub fn resolve_path<S: AsRef<str>>(&self, segments: &[S]) -> Vec<&CategoryNode> {
        let mut resolved: Vec<&CategoryNode> = Vec::with_capacity(segments.len());
        for segment in segments {
            let scope = resolved.last().map(|node| node.id.as_str());
            match self.find_node(segment.as_ref(), scope) {
                Some(node) => resolved.push(node),
                None => {
                    log::debug!("category path segment {:?} not found", segment.as_ref());
                    break;
                }
            }
        }
        resolved
    }

    /// Direct children of `parent_id`, in input order.
    pub fn children_of(&self, parent_id: &str) -> Vec<&CategoryNode> {
        self.nodes
            .iter()
            .map(|indexed| &indexed.node)
            .filter(|node| node.is_child_of(parent_id))
            .collect()
    }
}
