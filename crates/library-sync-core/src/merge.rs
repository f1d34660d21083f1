//! Last-writer-wins reconciliation of two versions of the catalog tree.
//!
//! Two nodes sharing a key are combined by [`reconcile`]:
//!
//! 1. the existing node's children are folded into the incoming node's children,
//!    recursing for keys present on both sides;
//! 2. whichever node has the strictly newer `refreshed_at` supplies the scalar
//!    fields (ties keep the existing node). A newer node built from a listing
//!    inherits the detail-only fields it has no value for;
//! 3. the incoming node's merged children are folded once more into the winner's
//!    children, so a child seen only through a stale-stamped parent survives.
//!
//! Nodes present on only one side are kept as they are.

use chrono::{DateTime, Utc};
use library_sync_models::{
    CatalogRoot, EpisodeEntry, LibraryCollection, MovieEntry, SeasonEntry, ShowEntry,
};
use std::collections::{BTreeMap, HashMap};

/// A tree node that can be reconciled against another version of itself.
pub trait Reconcile: Sized {
    type Children: ChildSet;

    fn refreshed_at(&self) -> DateTime<Utc>;
    fn take_children(&mut self) -> Self::Children;
    fn set_children(&mut self, children: Self::Children);

    /// Fill fields this node left empty from the node it replaces.
    fn inherit_detail(&mut self, _previous: &Self) {}
}

/// A keyed collection of child nodes.
pub trait ChildSet: Clone {
    /// Combine two child sets. Keys on both sides are reconciled; keys on one
    /// side only are kept unchanged.
    fn union(existing: Self, incoming: Self) -> Self;
}

/// Identity of a node stored in a `Vec` under its parent.
pub trait MergeKey {
    fn merge_key(&self) -> &str;
}

pub fn reconcile<N>(mut existing: N, mut incoming: N) -> N
where
    N: Reconcile,
{
    let existing_children = existing.take_children();
    let merged = N::Children::union(existing_children.clone(), incoming.take_children());
    existing.set_children(existing_children);
    incoming.set_children(merged.clone());

    let mut result = if incoming.refreshed_at() > existing.refreshed_at() {
        incoming.inherit_detail(&existing);
        incoming
    } else {
        existing
    };

    let own = result.take_children();
    result.set_children(N::Children::union(own, merged));
    result
}

/// Merge a freshly fetched root into the cached one.
pub fn merge_catalog(existing: CatalogRoot, incoming: CatalogRoot) -> CatalogRoot {
    CatalogRoot {
        collections: ChildSet::union(existing.collections, incoming.collections),
    }
}

/// Leaves have no children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoChildren;

impl ChildSet for NoChildren {
    fn union(_existing: Self, _incoming: Self) -> Self {
        NoChildren
    }
}

impl<N> ChildSet for BTreeMap<u32, N>
where
    N: Reconcile + Clone,
{
    fn union(mut existing: Self, incoming: Self) -> Self {
        for (key, node) in incoming {
            let merged = match existing.remove(&key) {
                Some(current) => reconcile(current, node),
                None => node,
            };
            existing.insert(key, merged);
        }
        existing
    }
}

// Existing order is kept; keys first seen in `incoming` are appended in incoming order.
impl<N> ChildSet for Vec<N>
where
    N: Reconcile + MergeKey + Clone,
{
    fn union(existing: Self, incoming: Self) -> Self {
        let mut slots: Vec<Option<N>> = Vec::with_capacity(existing.len() + incoming.len());
        let mut position: HashMap<String, usize> = HashMap::with_capacity(slots.capacity());

        for node in existing {
            position.entry(node.merge_key().to_string()).or_insert(slots.len());
            slots.push(Some(node));
        }

        for node in incoming {
            // Duplicate keys inside a single listing collapse into one node
            match position.get(node.merge_key()) {
                Some(&pos) => {
                    let merged = match slots[pos].take() {
                        Some(current) => reconcile(current, node),
                        None => node,
                    };
                    slots[pos] = Some(merged);
                }
                None => {
                    position.insert(node.merge_key().to_string(), slots.len());
                    slots.push(Some(node));
                }
            }
        }

        slots.into_iter().flatten().collect()
    }
}

impl<A: ChildSet, B: ChildSet> ChildSet for (A, B) {
    fn union(existing: Self, incoming: Self) -> Self {
        (A::union(existing.0, incoming.0), B::union(existing.1, incoming.1))
    }
}

impl Reconcile for LibraryCollection {
    type Children = (Vec<ShowEntry>, Vec<MovieEntry>);

    fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    fn take_children(&mut self) -> Self::Children {
        (std::mem::take(&mut self.shows), std::mem::take(&mut self.movies))
    }

    fn set_children(&mut self, (shows, movies): Self::Children) {
        self.shows = shows;
        self.movies = movies;
    }
}

impl MergeKey for LibraryCollection {
    fn merge_key(&self) -> &str {
        &self.title
    }
}

impl Reconcile for ShowEntry {
    type Children = BTreeMap<u32, SeasonEntry>;

    fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    fn take_children(&mut self) -> Self::Children {
        std::mem::take(&mut self.seasons)
    }

    fn set_children(&mut self, children: Self::Children) {
        self.seasons = children;
    }

    fn inherit_detail(&mut self, previous: &Self) {
        self.ids.merge(&previous.ids);
        keep_if_empty(&mut self.summary, &previous.summary);
        keep_if_empty(&mut self.guid, &previous.guid);
        keep_if_empty(&mut self.content_rating, &previous.content_rating);
        self.year = self.year.or(previous.year);
    }
}

impl MergeKey for ShowEntry {
    fn merge_key(&self) -> &str {
        self.key()
    }
}

impl Reconcile for SeasonEntry {
    type Children = BTreeMap<u32, EpisodeEntry>;

    fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    fn take_children(&mut self) -> Self::Children {
        std::mem::take(&mut self.episodes)
    }

    fn set_children(&mut self, children: Self::Children) {
        self.episodes = children;
    }
}

impl Reconcile for EpisodeEntry {
    type Children = NoChildren;

    fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    fn take_children(&mut self) -> Self::Children {
        NoChildren
    }

    fn set_children(&mut self, _children: Self::Children) {}

    fn inherit_detail(&mut self, previous: &Self) {
        self.ids.merge(&previous.ids);
        keep_if_empty(&mut self.guid, &previous.guid);
        keep_if_empty(&mut self.content_rating, &previous.content_rating);
        self.year = self.year.or(previous.year);
        self.duration_ms = self.duration_ms.or(previous.duration_ms);
    }
}

impl Reconcile for MovieEntry {
    type Children = NoChildren;

    fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    fn take_children(&mut self) -> Self::Children {
        NoChildren
    }

    fn set_children(&mut self, _children: Self::Children) {}

    fn inherit_detail(&mut self, previous: &Self) {
        self.ids.merge(&previous.ids);
        keep_if_empty(&mut self.summary, &previous.summary);
        keep_if_empty(&mut self.guid, &previous.guid);
        keep_if_empty(&mut self.content_rating, &previous.content_rating);
        self.year = self.year.or(previous.year);
    }
}

fn keep_if_empty(field: &mut String, previous: &str) {
    if field.is_empty() && !previous.is_empty() {
        *field = previous.to_string();
    }
}

impl MergeKey for MovieEntry {
    fn merge_key(&self) -> &str {
        &self.rating_key
    }
}
