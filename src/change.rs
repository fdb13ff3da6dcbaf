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

//! Change tracking: per-component observer storages fed by the command
//! dispatcher and drained by `World::query_changed`.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::component::{ComponentId, ComponentInstance};
use crate::entity::EntityId;

/// Immutable before/after pair describing one component mutation on one
/// entity, collapsed between drains. `old` is the value the observer saw at
/// its last drain (`None` if the component was absent), `new` the current
/// value (`None` once removed).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub old: Option<ComponentInstance>,
    pub new: Option<ComponentInstance>,
}

/// One observer's pending records, keyed by entity.
pub(crate) type ObserverStorage = FxHashMap<EntityId, ChangeRecord>;

/// Storage shared between the world's registry and a caller's hook cell.
pub(crate) type SharedStorage = Arc<Mutex<ObserverStorage>>;

/// Registry of observer storages per component type.
#[derive(Default)]
pub(crate) struct ChangeTracker {
    storages: FxHashMap<ComponentId, Vec<SharedStorage>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: ComponentId, storage: SharedStorage) {
        self.storages.entry(component).or_default().push(storage);
    }

    /// Detach one observer; the component's entry is dropped entirely when
    /// its observer list becomes empty.
    pub fn unregister(&mut self, component: ComponentId, storage: &SharedStorage) {
        if let Some(observers) = self.storages.get_mut(&component) {
            observers.retain(|candidate| !Arc::ptr_eq(candidate, storage));
            if observers.is_empty() {
                self.storages.remove(&component);
            }
        }
    }

    pub fn observer_count(&self, component: ComponentId) -> usize {
        self.storages.get(&component).map_or(0, Vec::len)
    }

    /// Record one component transition for every observer of `component`.
    ///
    /// A merge preserves the `old` seen at the observer's last drain, so a
    /// run of intermediate values collapses into a single before/after pair.
    pub fn track(
        &self,
        component: ComponentId,
        entity: EntityId,
        old: Option<ComponentInstance>,
        new: Option<ComponentInstance>,
    ) {
        let Some(observers) = self.storages.get(&component) else {
            return;
        };
        if old == new {
            return;
        }
        for storage in observers {
            let mut records = storage.lock();
            records
                .entry(entity)
                .and_modify(|record| record.new = new.clone())
                .or_insert_with(|| ChangeRecord {
                    old: old.clone(),
                    new: new.clone(),
                });
        }
    }

    /// Detach every storage without emitting records.
    pub fn clear(&mut self) {
        self.storages.clear();
    }
}

/// Draining iterator over one observer's pending records.
///
/// Each step pops one `(entity, record)` entry; entries recorded after the
/// iterator was created are still drained by it. Order is unspecified.
#[derive(Debug)]
pub struct ChangedIter {
    storage: SharedStorage,
}

impl ChangedIter {
    pub(crate) fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

impl Iterator for ChangedIter {
    type Item = (EntityId, ChangeRecord);

    fn next(&mut self) -> Option<Self::Item> {
        let mut records = self.storage.lock();
        let entity = *records.keys().next()?;
        let record = records.remove(&entity)?;
        Some((entity, record))
    }
}
