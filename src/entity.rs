// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity identifiers, the id allocator, and location metadata.

use std::collections::hash_map;
use std::fmt;

use rustc_hash::FxHashMap;

/// Unique entity identifier.
///
/// Ids start at 1. A freed id is never handed out again by the allocator;
/// only an explicit `spawn_at` can bring it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn new(raw: u64) -> Self {
        debug_assert!(raw >= 1);
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entity location in archetype (archetype_id, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: usize,
    pub archetype_row: usize,
}

/// Entity id -> location map plus the id allocator.
pub struct EntityTable {
    locations: FxHashMap<EntityId, EntityLocation>,
    next_id: u64,
}

impl EntityTable {
    pub fn new() -> Self {
        Self {
            locations: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Hand out the smallest never-assigned id.
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Bump the allocator past an explicitly claimed id.
    pub fn reserve_through(&mut self, id: EntityId) {
        if self.next_id <= id.0 {
            self.next_id = id.0 + 1;
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.locations.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<EntityLocation> {
        self.locations.get(&id).copied()
    }

    pub fn set(&mut self, id: EntityId, location: EntityLocation) {
        self.locations.insert(id, location);
    }

    /// Fix up the row of an entity swapped into a vacated slot.
    pub fn update_row(&mut self, id: EntityId, row: usize) {
        if let Some(location) = self.locations.get_mut(&id) {
            location.archetype_row = row;
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<EntityLocation> {
        self.locations.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Drop every record and reset the allocator.
    pub fn clear(&mut self) {
        self.locations.clear();
        self.next_id = 1;
    }

    pub fn iter(&self) -> EntityTableIter<'_> {
        EntityTableIter {
            inner: self.locations.iter(),
        }
    }
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over `(id, location)` records in the table.
pub struct EntityTableIter<'a> {
    inner: hash_map::Iter<'a, EntityId, EntityLocation>,
}

impl Iterator for EntityTableIter<'_> {
    type Item = (EntityId, EntityLocation);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(&id, &location)| (id, location))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
