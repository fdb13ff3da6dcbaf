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

//! Command buffer for deferred world mutations

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::trace;

use crate::component::{Component, ComponentInstance};
use crate::entity::EntityId;

/// Deferred command for world mutations
#[derive(Debug, Clone)]
pub enum Command {
    /// Attach or overwrite components
    Insert {
        entity: EntityId,
        instances: SmallVec<[ComponentInstance; 4]>,
    },

    /// Detach components
    Remove {
        entity: EntityId,
        components: SmallVec<[Component; 4]>,
    },

    /// Swap the entity's entire component set
    Replace {
        entity: EntityId,
        instances: SmallVec<[ComponentInstance; 4]>,
    },

    /// Remove the entity from the world
    Despawn { entity: EntityId },
}

impl Command {
    /// The entity this command addresses.
    pub fn entity(&self) -> EntityId {
        match self {
            Command::Insert { entity, .. }
            | Command::Remove { entity, .. }
            | Command::Replace { entity, .. }
            | Command::Despawn { entity } => *entity,
        }
    }
}

/// FIFO queue of deferred mutations.
///
/// In immediate mode commands are applied at the call site; while deferring
/// they are queued here and applied in enqueue order by
/// `World::commit_commands`.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    marked_for_deletion: FxHashSet<EntityId>,
    deferring: bool,
}

impl CommandBuffer {
    /// Create new command buffer
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_deferring(&self) -> bool {
        self.deferring
    }

    pub(crate) fn set_deferring(&mut self, deferring: bool) {
        self.deferring = deferring;
    }

    /// Queue a command, applying the despawn elision rule: once an entity's
    /// despawn is pending, every further command addressing it is dropped.
    /// Returns whether the command was actually queued.
    pub(crate) fn push(&mut self, command: Command) -> bool {
        let entity = command.entity();
        if self.marked_for_deletion.contains(&entity) {
            trace!(%entity, "command elided; entity is pending deletion");
            return false;
        }
        if matches!(command, Command::Despawn { .. }) {
            self.marked_for_deletion.insert(entity);
        }
        self.commands.push(command);
        true
    }

    pub(crate) fn is_marked_for_deletion(&self, entity: EntityId) -> bool {
        self.marked_for_deletion.contains(&entity)
    }

    /// Lift the deletion mark when `spawn_at` reclaims the id.
    pub(crate) fn unmark_for_deletion(&mut self, entity: EntityId) {
        self.marked_for_deletion.remove(&entity);
    }

    /// Take the queued commands, leaving the buffer empty. Deletion marks
    /// are kept; they are lifted per-id by `spawn_at` or dropped by `clear`.
    pub(crate) fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Get length
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Clear queue and deletion marks
    pub(crate) fn clear(&mut self) {
        self.commands.clear();
        self.marked_for_deletion.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_despawn_marks_entity() {
        let mut buffer = CommandBuffer::new();
        let entity = EntityId::new(1);

        assert!(buffer.push(Command::Despawn { entity }));
        assert!(buffer.is_marked_for_deletion(entity));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_commands_after_despawn_are_elided() {
        let mut buffer = CommandBuffer::new();
        let entity = EntityId::new(1);
        let component = crate::component::Component::new("A");

        buffer.push(Command::Despawn { entity });
        assert!(!buffer.push(Command::Insert {
            entity,
            instances: SmallVec::from_iter([component.instance(1i32)]),
        }));
        assert!(!buffer.push(Command::Despawn { entity }));
        assert_eq!(buffer.len(), 1);

        // Another entity is unaffected.
        let other = EntityId::new(2);
        assert!(buffer.push(Command::Remove {
            entity: other,
            components: SmallVec::from_iter([component]),
        }));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_drain_keeps_marks() {
        let mut buffer = CommandBuffer::new();
        let entity = EntityId::new(1);

        buffer.push(Command::Despawn { entity });
        let drained = buffer.drain();
        assert_eq!(drained.len(), 1);
        assert!(buffer.is_empty());
        assert!(buffer.is_marked_for_deletion(entity));

        buffer.unmark_for_deletion(entity);
        assert!(!buffer.is_marked_for_deletion(entity));
    }
}
