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

//! Archetype storage with row allocation and removal, and the canonical
//! archetype index.

use ahash::AHashMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::component::{ComponentId, ComponentInstance};
use crate::entity::EntityId;

/// Component signature: the sorted set of component ids stored by an
/// archetype.
pub type ArchetypeSignature = SmallVec<[ComponentId; 8]>;

/// Index of the root archetype (empty signature). Always 0.
pub(crate) const ROOT_ARCHETYPE: usize = 0;

/// Archetype: Structure of Arrays storage for the entities whose component
/// set is exactly this archetype's signature.
pub struct Archetype {
    signature: ArchetypeSignature,
    entities: Vec<EntityId>,
    columns: Vec<Vec<ComponentInstance>>,
    column_indices: FxHashMap<ComponentId, usize>,
}

impl Archetype {
    /// Create new archetype. `signature` must be sorted and deduplicated.
    fn new(signature: ArchetypeSignature) -> Self {
        debug_assert!(signature.windows(2).all(|pair| pair[0] < pair[1]));
        let mut column_indices = FxHashMap::default();
        let mut columns = Vec::with_capacity(signature.len());
        for (index, &id) in signature.iter().enumerate() {
            column_indices.insert(id, index);
            columns.push(Vec::new());
        }
        Self {
            signature,
            entities: Vec::new(),
            columns,
            column_indices,
        }
    }

    /// Get signature
    pub fn signature(&self) -> &[ComponentId] {
        &self.signature
    }

    /// Get all entities
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn has_column(&self, id: ComponentId) -> bool {
        self.column_indices.contains_key(&id)
    }

    /// Get column index for a component id
    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        self.column_indices.get(&id).copied()
    }

    /// Component id stored by a column
    pub fn component_id_of(&self, column: usize) -> ComponentId {
        self.signature[column]
    }

    /// Column contents by precomputed index
    pub fn column_by_index(&self, column: usize) -> &[ComponentInstance] {
        &self.columns[column]
    }

    /// Value of one component on one row
    pub fn get(&self, id: ComponentId, row: usize) -> Option<&ComponentInstance> {
        let column = *self.column_indices.get(&id)?;
        self.columns[column].get(row)
    }

    /// Allocate row for entity. Column values must be written separately;
    /// every column must be filled before the archetype is observed again.
    pub(crate) fn allocate_row(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Write one component value, either appending the row slot or
    /// overwriting it in place.
    pub(crate) fn put(&mut self, id: ComponentId, row: usize, instance: ComponentInstance) {
        let column = self.column_indices[&id];
        let column = &mut self.columns[column];
        if row == column.len() {
            column.push(instance);
        } else {
            column[row] = instance;
        }
    }

    /// Remove a row by swap-remove, returning the removed values in column
    /// order and the entity that was swapped into `row`, if any.
    pub(crate) fn swap_remove_row(
        &mut self,
        row: usize,
    ) -> (SmallVec<[ComponentInstance; 8]>, Option<EntityId>) {
        let values = self
            .columns
            .iter_mut()
            .map(|column| column.swap_remove(row))
            .collect();
        self.entities.swap_remove(row);

        // If we swapped someone in, return their entity so the caller can
        // update their location.
        let swapped = if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        };
        (values, swapped)
    }

    #[cfg(debug_assertions)]
    pub(crate) fn assert_coherent(&self) {
        for column in &self.columns {
            debug_assert_eq!(column.len(), self.entities.len());
        }
    }
}

/// Canonical registry of archetypes.
///
/// At most one archetype exists per component set; the sorted signature is
/// the canonical key. Also maintains the append-only `component id ->
/// archetypes containing it` reverse index used by query planning.
pub struct ArchetypeIndex {
    archetypes: Vec<Archetype>,
    by_signature: AHashMap<ArchetypeSignature, usize>,
    by_component: FxHashMap<ComponentId, Vec<usize>>,
}

impl ArchetypeIndex {
    pub fn new() -> Self {
        let mut index = Self {
            archetypes: Vec::with_capacity(64),
            by_signature: AHashMap::with_capacity(64),
            by_component: FxHashMap::default(),
        };

        // Bootstrap the root archetype (entities with no components).
        // It is always at index 0 and simplifies logic elsewhere.
        index.ensure(&[]);
        index
    }

    /// Canonicalize a component set and return its archetype id, creating
    /// the archetype on first sight.
    pub fn ensure(&mut self, ids: &[ComponentId]) -> usize {
        let mut signature: ArchetypeSignature = SmallVec::from_slice(ids);
        signature.sort_unstable();
        signature.dedup();

        if let Some(&id) = self.by_signature.get(&signature) {
            return id;
        }

        let archetype_id = self.archetypes.len();
        debug!(
            archetype = archetype_id,
            components = signature.len(),
            "creating archetype"
        );
        for &component in &signature {
            self.by_component
                .entry(component)
                .or_default()
                .push(archetype_id);
        }
        self.archetypes.push(Archetype::new(signature.clone()));
        self.by_signature.insert(signature, archetype_id);
        archetype_id
    }

    pub fn archetype(&self, id: usize) -> &Archetype {
        &self.archetypes[id]
    }

    pub(crate) fn archetype_mut(&mut self, id: usize) -> &mut Archetype {
        &mut self.archetypes[id]
    }

    /// Mutably borrow two distinct archetypes at once.
    pub(crate) fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
        debug_assert_ne!(a, b);
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Archetypes containing a component, in creation order. Empty for a
    /// component no live entity has ever held.
    pub fn containing(&self, id: ComponentId) -> &[usize] {
        self.by_component.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }
}

impl Default for ArchetypeIndex {
    fn default() -> Self {
        Self::new()
    }
}
