//! The reference index behind [`Store`](crate::store::Store).
//!
//! Outbound entries map each reference field of an object to its target (or
//! to nothing); inbound entries are the inverse. Unresolved fields are also
//! filed under their lower-cased text so a later add or rename can pick
//! them up.

use crate::id::ObjectHandle;
use slotmap::SecondaryMap;
use std::collections::{BTreeSet, HashMap};

// ---------------------------------------------------------------------------
// Public views
// ---------------------------------------------------------------------------

/// A reference field of one object and what it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutboundRef {
    pub field: usize,
    /// `None` when no object with the field's text can be targeted.
    pub target: Option<ObjectHandle>,
}

/// A reference field pointing at some object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InboundRef {
    pub source: ObjectHandle,
    pub field: usize,
}

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Link {
    Resolved(ObjectHandle),
    /// Lower-cased text the field is waiting on.
    Unresolved(String),
}

#[derive(Debug, Clone)]
struct Edge {
    field: usize,
    link: Link,
}

/// Bidirectional reference index between stored objects.
///
/// `outbound` and `inbound` are kept as mutual inverses; every unresolved
/// outbound edge is also filed under its text in `unresolved`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReferenceGraph {
    /// Edges sorted by field index.
    outbound: SecondaryMap<ObjectHandle, Vec<Edge>>,
    inbound: SecondaryMap<ObjectHandle, BTreeSet<InboundRef>>,
    unresolved: HashMap<String, BTreeSet<InboundRef>>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reference from `source.field`. Any previous edge of that
    /// field is replaced.
    pub fn link(&mut self, source: ObjectHandle, field: usize, target: Option<ObjectHandle>, key: &str) {
        self.unlink(source, field);
        let entry = InboundRef { source, field };
        let link = match target {
            Some(target) => {
                if let Some(set) = self.inbound.entry(target) {
                    set.or_default().insert(entry);
                }
                Link::Resolved(target)
            }
            None => {
                self.unresolved
                    .entry(key.to_string())
                    .or_default()
                    .insert(entry);
                Link::Unresolved(key.to_string())
            }
        };
        if let Some(edges) = self.outbound.entry(source) {
            let edges = edges.or_default();
            let at = edges.partition_point(|e| e.field < field);
            edges.insert(at, Edge { field, link });
        }
    }

    /// Drop the edge of `source.field`, if any. Returns its old target.
    pub fn unlink(&mut self, source: ObjectHandle, field: usize) -> Option<Option<ObjectHandle>> {
        let edges = self.outbound.get_mut(source)?;
        let at = edges.iter().position(|e| e.field == field)?;
        let edge = edges.remove(at);
        let entry = InboundRef { source, field };
        match edge.link {
            Link::Resolved(target) => {
                if let Some(set) = self.inbound.get_mut(target) {
                    set.remove(&entry);
                }
                Some(Some(target))
            }
            Link::Unresolved(key) => {
                self.drop_unresolved(&key, &entry);
                Some(None)
            }
        }
    }

    /// Drop every outbound edge of `source`.
    pub fn unlink_all(&mut self, source: ObjectHandle) {
        let fields: Vec<usize> = self
            .outbound
            .get(source)
            .map(|edges| edges.iter().map(|e| e.field).collect())
            .unwrap_or_default();
        for field in fields {
            self.unlink(source, field);
        }
    }

    /// Forget a removed object. Its outbound edges must already be unlinked;
    /// its inbound edges are returned for the caller to re-resolve.
    pub fn remove_object(&mut self, handle: ObjectHandle) -> BTreeSet<InboundRef> {
        self.unlink_all(handle);
        self.outbound.remove(handle);
        let inbound = self.inbound.remove(handle).unwrap_or_default();
        for entry in &inbound {
            if let Some(edges) = self.outbound.get_mut(entry.source) {
                edges.retain(|e| e.field != entry.field);
            }
        }
        inbound
    }

    /// Remove every resolved edge into `target`, returning their sources.
    pub fn detach_inbound(&mut self, target: ObjectHandle) -> BTreeSet<InboundRef> {
        let inbound = self
            .inbound
            .get_mut(target)
            .map(std::mem::take)
            .unwrap_or_default();
        for entry in &inbound {
            if let Some(edges) = self.outbound.get_mut(entry.source) {
                edges.retain(|e| e.field != entry.field);
            }
        }
        inbound
    }

    /// Remove and return every edge waiting on `key`.
    pub fn take_unresolved(&mut self, key: &str) -> BTreeSet<InboundRef> {
        let waiting = self.unresolved.remove(key).unwrap_or_default();
        for entry in &waiting {
            if let Some(edges) = self.outbound.get_mut(entry.source) {
                edges.retain(|e| e.field != entry.field);
            }
        }
        waiting
    }

    fn drop_unresolved(&mut self, key: &str, entry: &InboundRef) {
        if let Some(set) = self.unresolved.get_mut(key) {
            set.remove(entry);
            if set.is_empty() {
                self.unresolved.remove(key);
            }
        }
    }

    pub fn target(&self, source: ObjectHandle, field: usize) -> Option<ObjectHandle> {
        self.outbound
            .get(source)?
            .iter()
            .find(|e| e.field == field)
            .and_then(|e| match e.link {
                Link::Resolved(target) => Some(target),
                Link::Unresolved(_) => None,
            })
    }

    pub fn outbound(&self, source: ObjectHandle) -> Vec<OutboundRef> {
        self.outbound
            .get(source)
            .map(|edges| {
                edges
                    .iter()
                    .map(|e| OutboundRef {
                        field: e.field,
                        target: match e.link {
                            Link::Resolved(target) => Some(target),
                            Link::Unresolved(_) => None,
                        },
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn inbound(&self, target: ObjectHandle) -> impl Iterator<Item = InboundRef> + '_ {
        self.inbound.get(target).into_iter().flatten().copied()
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.values().map(BTreeSet::len).sum()
    }

    /// Lower-cased text an unresolved edge is filed under.
    pub fn unresolved_key(&self, source: ObjectHandle, field: usize) -> Option<&str> {
        self.outbound
            .get(source)?
            .iter()
            .find(|e| e.field == field)
            .and_then(|e| match &e.link {
                Link::Unresolved(key) => Some(key.as_str()),
                Link::Resolved(_) => None,
            })
    }

    /// Check that outbound, inbound and the unresolved index agree.
    pub fn audit(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (source, edges) in &self.outbound {
            if edges.windows(2).any(|w| w[0].field >= w[1].field) {
                problems.push(format!("{source:?}: outbound edges not strictly ordered"));
            }
            for edge in edges {
                let entry = InboundRef {
                    source,
                    field: edge.field,
                };
                let mirrored = match &edge.link {
                    Link::Resolved(target) => self
                        .inbound
                        .get(*target)
                        .is_some_and(|set| set.contains(&entry)),
                    Link::Unresolved(key) => self
                        .unresolved
                        .get(key)
                        .is_some_and(|set| set.contains(&entry)),
                };
                if !mirrored {
                    problems.push(format!("{source:?}.{}: outbound edge not mirrored", edge.field));
                }
            }
        }
        for (target, set) in &self.inbound {
            for entry in set {
                if self.target(entry.source, entry.field) != Some(target) {
                    problems.push(format!(
                        "{:?}.{}: inbound entry on {target:?} has no outbound edge",
                        entry.source, entry.field
                    ));
                }
            }
        }
        for (key, set) in &self.unresolved {
            if set.is_empty() {
                problems.push(format!("empty unresolved bucket '{key}'"));
            }
            for entry in set {
                if self.unresolved_key(entry.source, entry.field) != Some(key.as_str()) {
                    problems.push(format!(
                        "{:?}.{}: unresolved entry '{key}' has no outbound edge",
                        entry.source, entry.field
                    ));
                }
            }
        }
        problems
    }
}
