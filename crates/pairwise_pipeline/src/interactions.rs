//! Read-only index of user/item interactions.
//!
//! The index is built once from a user → items history and then shared
//! (behind an `Arc`) by every sampling draw. Users and each user's observed
//! items are kept in ascending order so that a given seed reproduces the same
//! draws no matter how the caller's map happened to be ordered.

use crate::error::PipelineError;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

pub type UserId = u64;
pub type ItemId = u64;

#[derive(Debug, Clone)]
struct UserInteractions {
    /// Distinct observed items, ascending. Used for uniform positive draws.
    items: Vec<ItemId>,
    /// Same items, for O(1) rejection checks.
    lookup: HashSet<ItemId>,
}

/// Immutable per-user observed-item sets plus the global item universe.
#[derive(Debug, Clone)]
pub struct InteractionIndex {
    users: Vec<UserId>,
    items: Vec<ItemId>,
    observed: BTreeMap<UserId, UserInteractions>,
}

impl InteractionIndex {
    /// Builds the index from a user → interacted items mapping.
    ///
    /// The item universe is the union of every user's items. Duplicate items
    /// in a user's history are collapsed.
    ///
    /// # Errors
    /// `PipelineError::Configuration` if the mapping is empty or any user
    /// has no observed items.
    ///
    /// # Example
    /// ```ignore
    /// let history = HashMap::from([(0, vec![1, 2]), (1, vec![2, 3])]);
    /// let index = InteractionIndex::new(history)?;
    /// assert_eq!(index.items(), &[1, 2, 3]);
    /// ```
    pub fn new<H>(history: H) -> Result<Self>
    where
        H: IntoIterator<Item = (UserId, Vec<ItemId>)>,
    {
        Self::with_item_universe(history, std::iter::empty())
    }

    /// Builds the index with an explicit item universe.
    ///
    /// The universe becomes `extra_items` plus every observed item, so a
    /// catalogue of items nobody interacted with can still supply negatives.
    pub fn with_item_universe<H, I>(history: H, extra_items: I) -> Result<Self>
    where
        H: IntoIterator<Item = (UserId, Vec<ItemId>)>,
        I: IntoIterator<Item = ItemId>,
    {
        let mut observed = BTreeMap::new();
        let mut universe: BTreeSet<ItemId> = extra_items.into_iter().collect();

        for (user, items) in history {
            let distinct: BTreeSet<ItemId> = items.into_iter().collect();
            if distinct.is_empty() {
                return Err(PipelineError::config(format!(
                    "user {} has no observed items and cannot be sampled",
                    user
                ))
                .into());
            }
            universe.extend(distinct.iter().copied());

            let items: Vec<ItemId> = distinct.into_iter().collect();
            let lookup = items.iter().copied().collect();
            // A repeated user id keeps the last history, like a map insert.
            observed.insert(user, UserInteractions { items, lookup });
        }

        if observed.is_empty() {
            return Err(PipelineError::config("interaction history is empty").into());
        }

        let users: Vec<UserId> = observed.keys().copied().collect();
        let items: Vec<ItemId> = universe.into_iter().collect();

        debug!(
            users = users.len(),
            items = items.len(),
            "built interaction index"
        );

        Ok(Self {
            users,
            items,
            observed,
        })
    }

    /// All users, ascending.
    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    /// The item universe, ascending.
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Observed items of `user`, ascending. `None` for an unknown user.
    pub fn observed(&self, user: UserId) -> Option<&[ItemId]> {
        self.observed.get(&user).map(|entry| entry.items.as_slice())
    }

    /// Number of distinct items `user` interacted with (0 for unknown users).
    pub fn observed_count(&self, user: UserId) -> usize {
        self.observed.get(&user).map_or(0, |entry| entry.items.len())
    }

    /// Whether `item` is in the observed set of `user`.
    pub fn contains(&self, user: UserId, item: ItemId) -> bool {
        self.observed
            .get(&user)
            .is_some_and(|entry| entry.lookup.contains(&item))
    }

    /// True when `user` has interacted with every item in the universe, so
    /// no negative item exists for them.
    pub fn is_saturated(&self, user: UserId) -> bool {
        self.observed_count(user) == self.items.len()
    }
}
