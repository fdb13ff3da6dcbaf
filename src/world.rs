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

//! World: central entity and archetype storage
//!
//! Public mutations become commands; a command is applied at the call site
//! in immediate mode, or queued while deferring and applied in order by
//! [`World::commit_commands`]. Applying a command rewrites the entity
//! table, moves storage between archetypes, and feeds change tracking.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::archetype::{ArchetypeIndex, ArchetypeSignature, ROOT_ARCHETYPE};
use crate::change::{ChangeRecord, ChangeTracker, ChangedIter, ObserverStorage, SharedStorage};
use crate::command::{Command, CommandBuffer};
use crate::component::{Component, ComponentId, ComponentInstance};
use crate::entity::{EntityId, EntityLocation, EntityTable, EntityTableIter};
use crate::error::{EcsError, Result};
use crate::hooks;

/// Central ECS world: an in-memory database of entities and their typed
/// component values, stored columnar per archetype.
pub struct World {
    /// Entity id -> location, plus the id allocator
    entities: EntityTable,

    /// Canonical archetype storage and indexes
    archetypes: ArchetypeIndex,

    /// Deferred mutation queue
    commands: CommandBuffer,

    /// Observer storages for `query_changed`. Shared so hook cleanups can
    /// unregister without a world borrow.
    changed: Arc<Mutex<ChangeTracker>>,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            entities: EntityTable::new(),
            archetypes: ArchetypeIndex::new(),
            commands: CommandBuffer::new(),
            changed: Arc::new(Mutex::new(ChangeTracker::new())),
        }
    }

    // ========== Spawning ==========

    /// Spawn a new entity with the given component instances and return its
    /// id.
    ///
    /// The id is allocated and registered synchronously even while
    /// deferring, so the caller can use it immediately; only the component
    /// insertion is routed through the command buffer.
    pub fn spawn(&mut self, instances: impl IntoIterator<Item = ComponentInstance>) -> EntityId {
        let entity = self.entities.allocate();
        self.spawn_inner(entity, instances.into_iter().collect());
        entity
    }

    /// Spawn a new entity with an explicit id.
    ///
    /// Fails if the id is live. If the id's despawn is pending, the despawn
    /// is executed first and the id is reclaimed.
    pub fn spawn_at(
        &mut self,
        entity: EntityId,
        instances: impl IntoIterator<Item = ComponentInstance>,
    ) -> Result<EntityId> {
        if self.entities.contains(entity) {
            if !self.commands.is_marked_for_deletion(entity) {
                return Err(EcsError::EntityAlreadyExists(entity));
            }
            // The queued despawn runs now so the id can be reused; once the
            // mark is lifted the stale command is skipped at commit.
            self.apply_despawn(entity)?;
        }
        self.commands.unmark_for_deletion(entity);
        self.entities.reserve_through(entity);
        self.spawn_inner(entity, instances.into_iter().collect());
        Ok(entity)
    }

    fn spawn_inner(&mut self, entity: EntityId, instances: SmallVec<[ComponentInstance; 4]>) {
        let row = self
            .archetypes
            .archetype_mut(ROOT_ARCHETYPE)
            .allocate_row(entity);
        self.entities.set(
            entity,
            EntityLocation {
                archetype_id: ROOT_ARCHETYPE,
                archetype_row: row,
            },
        );
        trace!(%entity, components = instances.len(), "spawned");
        if instances.is_empty() {
            return;
        }
        // The entity is live at the root archetype, so the insert cannot
        // fail.
        let _ = self.enqueue(Command::Insert { entity, instances });
    }

    // ========== Mutations ==========

    /// Attach component instances to a live entity, overwriting components
    /// it already has.
    pub fn insert(
        &mut self,
        entity: EntityId,
        instances: impl IntoIterator<Item = ComponentInstance>,
    ) -> Result<()> {
        if !self.entities.contains(entity) {
            return Err(EcsError::NoEntity(entity));
        }
        self.enqueue(Command::Insert {
            entity,
            instances: instances.into_iter().collect(),
        })
    }

    /// Detach components from a live entity.
    ///
    /// Returns the current values of the requested components (`None` for
    /// absent ones) synchronously, even though the removal itself may be
    /// deferred.
    pub fn remove(
        &mut self,
        entity: EntityId,
        components: &[&Component],
    ) -> Result<SmallVec<[Option<ComponentInstance>; 8]>> {
        let location = self
            .entities
            .get(entity)
            .ok_or(EcsError::NoEntity(entity))?;
        let archetype = self.archetypes.archetype(location.archetype_id);
        let values = components
            .iter()
            .map(|component| archetype.get(component.id(), location.archetype_row).cloned())
            .collect();
        self.enqueue(Command::Remove {
            entity,
            components: components.iter().map(|&component| component.clone()).collect(),
        })?;
        Ok(values)
    }

    /// Swap an entity's entire component set for the given instances.
    /// Existence is checked when the command executes.
    pub fn replace(
        &mut self,
        entity: EntityId,
        instances: impl IntoIterator<Item = ComponentInstance>,
    ) -> Result<()> {
        self.enqueue(Command::Replace {
            entity,
            instances: instances.into_iter().collect(),
        })
    }

    /// Remove a live entity from the world.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        if !self.entities.contains(entity) {
            return Err(EcsError::NoEntity(entity));
        }
        self.enqueue(Command::Despawn { entity })
    }

    // ========== Reads ==========

    /// Current value of one component on a live entity (`None` if absent).
    pub fn get(&self, entity: EntityId, component: &Component) -> Result<Option<ComponentInstance>> {
        let location = self
            .entities
            .get(entity)
            .ok_or(EcsError::NoEntity(entity))?;
        Ok(self
            .archetypes
            .archetype(location.archetype_id)
            .get(component.id(), location.archetype_row)
            .cloned())
    }

    /// Current values of several components on a live entity, in argument
    /// order.
    pub fn get_many(
        &self,
        entity: EntityId,
        components: &[&Component],
    ) -> Result<SmallVec<[Option<ComponentInstance>; 8]>> {
        let location = self
            .entities
            .get(entity)
            .ok_or(EcsError::NoEntity(entity))?;
        let archetype = self.archetypes.archetype(location.archetype_id);
        Ok(components
            .iter()
            .map(|component| archetype.get(component.id(), location.archetype_row).cloned())
            .collect())
    }

    /// Check if an entity is alive
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Where an entity currently lives. Diagnostic.
    pub fn entity_location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entities.get(entity)
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub(crate) fn archetype_index(&self) -> &ArchetypeIndex {
        &self.archetypes
    }

    // ========== Queries ==========

    /// Cursor over every live entity holding all of the given components.
    pub fn query<'w>(&'w self, components: &[&Component]) -> crate::query::QueryResult<'w> {
        crate::query::QueryResult::new(&self.archetypes, components)
    }

    /// Draining iterator over the changes to one component since this
    /// caller's previous drain.
    ///
    /// Must run inside a [`CallerContext::scope`](crate::hooks::CallerContext::scope);
    /// the observer storage persists across scopes of the same context. The
    /// first call from a fresh caller sees every entity currently holding
    /// the component as newly added.
    pub fn query_changed(&self, component: &Component) -> Result<ChangedIter> {
        let id = component.id();
        let tracker = Arc::clone(&self.changed);
        let cell = hooks::use_hook_state(u64::from(id.index()), |cell| {
            let tracker = Arc::clone(&tracker);
            let cell = Arc::clone(cell);
            Box::new(move || {
                if let Some(storage) = cell.lock().storage.take() {
                    tracker.lock().unregister(id, &storage);
                }
            })
        })
        .ok_or(EcsError::MissingHookContext)?;

        let mut state = cell.lock();
        let storage = match &state.storage {
            Some(storage) => Arc::clone(storage),
            None => {
                // First observation: register, then seed with the current
                // value on every entity holding the component.
                let storage: SharedStorage = Arc::new(Mutex::new(ObserverStorage::default()));
                self.changed.lock().register(id, Arc::clone(&storage));
                self.seed_observer(id, &storage);
                state.storage = Some(Arc::clone(&storage));
                storage
            }
        };
        Ok(ChangedIter::new(storage))
    }

    fn seed_observer(&self, component: ComponentId, storage: &SharedStorage) {
        let mut records = storage.lock();
        for &archetype_id in self.archetypes.containing(component) {
            let archetype = self.archetypes.archetype(archetype_id);
            for (row, &entity) in archetype.entities().iter().enumerate() {
                let current = archetype.get(component, row).cloned();
                records.insert(
                    entity,
                    ChangeRecord {
                        old: None,
                        new: current,
                    },
                );
            }
        }
    }

    /// Number of observer storages registered for a component. Diagnostic.
    pub fn change_observer_count(&self, component: &Component) -> usize {
        self.changed.lock().observer_count(component.id())
    }

    /// Iterate every live entity as `(id, component id -> instance)`.
    pub fn iter(&self) -> WorldIter<'_> {
        WorldIter {
            world: self,
            entities: self.entities.iter(),
        }
    }

    // ========== Command buffer ==========

    /// Switch to deferring mode: subsequent mutations queue instead of
    /// applying at the call site.
    pub fn start_deferring(&mut self) {
        self.commands.set_deferring(true);
    }

    /// Apply everything queued, then return to immediate mode.
    pub fn stop_deferring(&mut self) -> Result<()> {
        let result = self.commit_commands();
        self.commands.set_deferring(false);
        result
    }

    /// Apply every queued command in enqueue order, then clear the queue.
    ///
    /// An error from a command (e.g. `replace` on a vanished entity)
    /// surfaces here; commands queued after the failing one are dropped
    /// with the queue.
    pub fn commit_commands(&mut self) -> Result<()> {
        let commands = self.commands.drain();
        if commands.is_empty() {
            return Ok(());
        }
        debug!(queued = commands.len(), "committing commands");
        for command in commands {
            if let Command::Despawn { entity } = &command {
                // spawn_at may have reclaimed the id since this was queued;
                // the pending despawn was already executed at that point.
                if !self.commands.is_marked_for_deletion(*entity) {
                    continue;
                }
            }
            self.apply(command)?;
        }
        Ok(())
    }

    pub fn is_deferring(&self) -> bool {
        self.commands.is_deferring()
    }

    /// Number of commands waiting for the next commit. Diagnostic.
    pub fn queued_command_count(&self) -> usize {
        self.commands.len()
    }

    fn enqueue(&mut self, command: Command) -> Result<()> {
        if self.commands.is_deferring() {
            self.commands.push(command);
            Ok(())
        } else {
            self.apply(command)
        }
    }

    /// Clear all entities
    ///
    /// Every subsystem is reset to its initial state: entity table and id
    /// allocator, archetypes (root re-bootstrapped), command queue and
    /// deletion marks, observer storages. Changes made by `clear` are never
    /// reported through `query_changed`.
    pub fn clear(&mut self) {
        debug!(entities = self.entities.len(), "clearing world");
        self.entities.clear();
        self.archetypes = ArchetypeIndex::new();
        self.commands.clear();
        self.changed.lock().clear();
    }

    // ========== Dispatcher ==========

    fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Insert { entity, instances } => self.apply_insert(entity, instances),
            Command::Remove { entity, components } => self.apply_remove(entity, &components),
            Command::Replace { entity, instances } => self.apply_replace(entity, instances),
            Command::Despawn { entity } => self.apply_despawn(entity),
        }
    }

    /// Insert instances one component at a time, materializing intermediate
    /// archetypes as needed. A component the entity already has is
    /// overwritten in place without a transition.
    fn apply_insert(
        &mut self,
        entity: EntityId,
        instances: SmallVec<[ComponentInstance; 4]>,
    ) -> Result<()> {
        let mut location = self
            .entities
            .get(entity)
            .ok_or(EcsError::NoEntity(entity))?;

        for instance in instances {
            let component = instance.component_id();
            let archetype = self.archetypes.archetype(location.archetype_id);
            if archetype.has_column(component) {
                let old = archetype.get(component, location.archetype_row).cloned();
                self.archetypes.archetype_mut(location.archetype_id).put(
                    component,
                    location.archetype_row,
                    instance.clone(),
                );
                self.track_changed(component, entity, old, Some(instance));
            } else {
                let mut ids: ArchetypeSignature = SmallVec::from_slice(archetype.signature());
                ids.push(component);
                let target = self.archetypes.ensure(&ids);
                let row = self.transition(entity, location, target);
                self.archetypes
                    .archetype_mut(target)
                    .put(component, row, instance.clone());
                location = EntityLocation {
                    archetype_id: target,
                    archetype_row: row,
                };
                self.track_changed(component, entity, None, Some(instance));
            }
        }

        #[cfg(debug_assertions)]
        self.archetypes.archetype(location.archetype_id).assert_coherent();
        Ok(())
    }

    fn apply_remove(&mut self, entity: EntityId, components: &[Component]) -> Result<()> {
        let location = self
            .entities
            .get(entity)
            .ok_or(EcsError::NoEntity(entity))?;

        let mut removed: SmallVec<[ComponentId; 8]> = SmallVec::new();
        {
            let archetype = self.archetypes.archetype(location.archetype_id);
            for component in components {
                let id = component.id();
                if archetype.has_column(id) && !removed.contains(&id) {
                    removed.push(id);
                }
            }
        }
        if removed.is_empty() {
            return Ok(());
        }

        for &id in &removed {
            let old = self
                .archetypes
                .archetype(location.archetype_id)
                .get(id, location.archetype_row)
                .cloned();
            self.track_changed(id, entity, old, None);
        }

        let target_ids: ArchetypeSignature = self
            .archetypes
            .archetype(location.archetype_id)
            .signature()
            .iter()
            .copied()
            .filter(|id| !removed.contains(id))
            .collect();
        let target = self.archetypes.ensure(&target_ids);
        self.transition(entity, location, target);

        #[cfg(debug_assertions)]
        self.archetypes.archetype(target).assert_coherent();
        Ok(())
    }

    fn apply_replace(
        &mut self,
        entity: EntityId,
        instances: SmallVec<[ComponentInstance; 4]>,
    ) -> Result<()> {
        let location = self
            .entities
            .get(entity)
            .ok_or(EcsError::NoEntity(entity))?;

        // Later instances of the same component win.
        let mut new_ids: ArchetypeSignature = SmallVec::new();
        let mut by_id: FxHashMap<ComponentId, ComponentInstance> = FxHashMap::default();
        for instance in instances {
            let id = instance.component_id();
            if by_id.insert(id, instance).is_none() {
                new_ids.push(id);
            }
        }

        // Report the whole delta: every component of the new set, then
        // every current component the new set drops.
        for &id in &new_ids {
            let old = self
                .archetypes
                .archetype(location.archetype_id)
                .get(id, location.archetype_row)
                .cloned();
            self.track_changed(id, entity, old, Some(by_id[&id].clone()));
        }
        let dropped: SmallVec<[ComponentId; 8]> = self
            .archetypes
            .archetype(location.archetype_id)
            .signature()
            .iter()
            .copied()
            .filter(|id| !by_id.contains_key(id))
            .collect();
        for &id in &dropped {
            let old = self
                .archetypes
                .archetype(location.archetype_id)
                .get(id, location.archetype_row)
                .cloned();
            self.track_changed(id, entity, old, None);
        }

        let target = self.archetypes.ensure(&new_ids);
        let row = if target == location.archetype_id {
            location.archetype_row
        } else {
            self.transition(entity, location, target)
        };
        let archetype = self.archetypes.archetype_mut(target);
        for (id, instance) in by_id {
            archetype.put(id, row, instance);
        }

        #[cfg(debug_assertions)]
        self.archetypes.archetype(target).assert_coherent();
        Ok(())
    }

    fn apply_despawn(&mut self, entity: EntityId) -> Result<()> {
        let location = self
            .entities
            .get(entity)
            .ok_or(EcsError::NoEntity(entity))?;

        let held: SmallVec<[ComponentId; 8]> = SmallVec::from_slice(
            self.archetypes
                .archetype(location.archetype_id)
                .signature(),
        );
        for &id in &held {
            let old = self
                .archetypes
                .archetype(location.archetype_id)
                .get(id, location.archetype_row)
                .cloned();
            self.track_changed(id, entity, old, None);
        }

        let (_values, swapped) = self
            .archetypes
            .archetype_mut(location.archetype_id)
            .swap_remove_row(location.archetype_row);
        if let Some(swapped) = swapped {
            self.entities.update_row(swapped, location.archetype_row);
        }
        self.entities.remove(entity);
        trace!(%entity, "despawned");

        #[cfg(debug_assertions)]
        self.archetypes.archetype(location.archetype_id).assert_coherent();
        Ok(())
    }

    /// Move one entity's row into `target`, carrying the shared columns.
    ///
    /// The source row is swap-removed; if another entity is swapped into
    /// the vacated slot its record is fixed up, so the move is O(columns)
    /// regardless of row position.
    fn transition(&mut self, entity: EntityId, location: EntityLocation, target_id: usize) -> usize {
        debug_assert_ne!(location.archetype_id, target_id);
        let (source, target) = self.archetypes.pair_mut(location.archetype_id, target_id);

        let row = target.allocate_row(entity);
        let (values, swapped) = source.swap_remove_row(location.archetype_row);
        for (column, value) in values.into_iter().enumerate() {
            let component = source.component_id_of(column);
            if target.has_column(component) {
                target.put(component, row, value);
            }
        }

        if let Some(swapped) = swapped {
            self.entities.update_row(swapped, location.archetype_row);
        }
        self.entities.set(
            entity,
            EntityLocation {
                archetype_id: target_id,
                archetype_row: row,
            },
        );
        row
    }

    fn track_changed(
        &self,
        component: ComponentId,
        entity: EntityId,
        old: Option<ComponentInstance>,
        new: Option<ComponentInstance>,
    ) {
        self.changed.lock().track(component, entity, old, new);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over every live entity and its full component map.
pub struct WorldIter<'w> {
    world: &'w World,
    entities: EntityTableIter<'w>,
}

impl Iterator for WorldIter<'_> {
    type Item = (EntityId, FxHashMap<ComponentId, ComponentInstance>);

    fn next(&mut self) -> Option<Self::Item> {
        let (entity, location) = self.entities.next()?;
        let archetype = self.world.archetypes.archetype(location.archetype_id);
        let components = archetype
            .signature()
            .iter()
            .filter_map(|&id| {
                archetype
                    .get(id, location.archetype_row)
                    .map(|instance| (id, instance.clone()))
            })
            .collect();
        Some((entity, components))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entities.size_hint()
    }
}

impl<'w> IntoIterator for &'w World {
    type Item = (EntityId, FxHashMap<ComponentId, ComponentInstance>);
    type IntoIter = WorldIter<'w>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
