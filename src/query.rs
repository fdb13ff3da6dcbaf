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

//! Query planning and cursored, columnar iteration
//!
//! Planning starts from the rarest queried component's archetype list and
//! narrows it to archetypes containing every queried component, so cost is
//! proportional to that list rather than to the global archetype count.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::archetype::ArchetypeIndex;
use crate::component::{Component, ComponentId, ComponentInstance};
use crate::entity::EntityId;

/// One query hit: the entity and its queried component values, in query
/// argument order.
pub type QueryItem = (EntityId, SmallVec<[ComponentInstance; 8]>);

/// Stateful cursor over the archetypes compatible with a query.
///
/// Within an archetype rows are visited in storage order; no order is
/// guaranteed across archetypes. The cursor borrows the world, so the
/// borrow checker rejects mutation while it is live; collect a
/// [`snapshot`](QueryResult::snapshot) first, or defer the mutations.
pub struct QueryResult<'w> {
    index: &'w ArchetypeIndex,
    ids: SmallVec<[ComponentId; 8]>,
    compatible: Vec<usize>,
    archetype_cursor: usize,
    row: usize,
    // Column indices for the queried ids in the current archetype.
    columns: SmallVec<[usize; 8]>,
    columns_cached: bool,
}

impl<'w> QueryResult<'w> {
    pub(crate) fn new(index: &'w ArchetypeIndex, components: &[&Component]) -> Self {
        let ids: SmallVec<[ComponentId; 8]> =
            components.iter().map(|component| component.id()).collect();

        // Seed from the rarest component's archetype list. A component no
        // archetype has ever stored yields an empty list, hence an empty
        // cursor; that is not an error.
        let mut compatible = Vec::new();
        if let Some(candidates) = ids
            .iter()
            .map(|&id| index.containing(id))
            .min_by_key(|list| list.len())
        {
            for &archetype_id in candidates {
                let archetype = index.archetype(archetype_id);
                if ids.iter().all(|&id| archetype.has_column(id)) {
                    compatible.push(archetype_id);
                }
            }
        }

        Self {
            index,
            ids,
            compatible,
            archetype_cursor: 0,
            row: 0,
            columns: SmallVec::new(),
            columns_cached: false,
        }
    }

    /// Exclude every archetype containing any of the given components.
    /// The order of the remaining archetypes is not preserved.
    pub fn without(mut self, components: &[&Component]) -> Self {
        let mut index = 0;
        while index < self.compatible.len() {
            let archetype = self.index.archetype(self.compatible[index]);
            if components
                .iter()
                .any(|component| archetype.has_column(component.id()))
            {
                self.compatible.swap_remove(index);
            } else {
                index += 1;
            }
        }
        self.archetype_cursor = 0;
        self.row = 0;
        self.columns_cached = false;
        self
    }

    /// Drain the cursor into an owned result set detached from the world.
    pub fn snapshot(self) -> QuerySnapshot {
        QuerySnapshot {
            items: self.collect(),
        }
    }

    /// Drain the cursor into an id-indexed table for random access.
    pub fn view(self) -> QueryView {
        QueryView {
            entries: self.collect(),
        }
    }
}

impl Iterator for QueryResult<'_> {
    type Item = QueryItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let &archetype_id = self.compatible.get(self.archetype_cursor)?;
            let archetype = self.index.archetype(archetype_id);

            if !self.columns_cached {
                self.columns.clear();
                for &id in &self.ids {
                    let column = archetype
                        .column_index(id)
                        .expect("compatible archetype is missing a queried column");
                    self.columns.push(column);
                }
                self.columns_cached = true;
            }

            if self.row >= archetype.len() {
                self.archetype_cursor += 1;
                self.row = 0;
                self.columns_cached = false;
                continue;
            }

            let entity = archetype.entities()[self.row];
            let values = self
                .columns
                .iter()
                .map(|&column| archetype.column_by_index(column)[self.row].clone())
                .collect();
            self.row += 1;
            return Some((entity, values));
        }
    }
}

/// Owned query results, isolated from further world mutation.
pub struct QuerySnapshot {
    items: Vec<QueryItem>,
}

impl QuerySnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryItem> {
        self.items.iter()
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = QueryItem;
    type IntoIter = std::vec::IntoIter<QueryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a QueryItem;
    type IntoIter = std::slice::Iter<'a, QueryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Materialized, id-indexed query results supporting random access.
pub struct QueryView {
    entries: FxHashMap<EntityId, SmallVec<[ComponentInstance; 8]>>,
}

impl QueryView {
    /// The queried component values for `entity`, in query argument order.
    pub fn get(&self, entity: EntityId) -> Option<&[ComponentInstance]> {
        self.entries.get(&entity).map(SmallVec::as_slice)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entries.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &[ComponentInstance])> {
        self.entries
            .iter()
            .map(|(&entity, values)| (entity, values.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[test]
    fn test_unknown_component_yields_empty_cursor() {
        let mut world = World::new();
        let a = Component::new("A");
        let never_used = Component::new("NeverUsed");
        world.spawn([a.instance(1i32)]);

        assert_eq!(world.query(&[&never_used]).count(), 0);
        assert_eq!(world.query(&[&a, &never_used]).count(), 0);
    }

    #[test]
    fn test_cursor_spans_archetypes() {
        let mut world = World::new();
        let a = Component::new("A");
        let b = Component::new("B");

        let lone = world.spawn([a.instance(1i32)]);
        let paired = world.spawn([a.instance(2i32), b.instance(3i32)]);

        let mut seen: Vec<EntityId> = world.query(&[&a]).map(|(entity, _)| entity).collect();
        seen.sort();
        assert_eq!(seen, vec![lone, paired]);
    }

    #[test]
    fn test_view_random_access() {
        let mut world = World::new();
        let a = Component::new("A");
        let entity = world.spawn([a.instance(7i32)]);

        let view = world.query(&[&a]).view();
        assert!(view.contains(entity));
        let values = view.get(entity).unwrap();
        assert_eq!(values[0].downcast_ref::<i32>(), Some(&7));
        assert!(view.get(EntityId::new(999)).is_none());
    }
}
