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

//! Weft ECS - archetype-based entity storage
//!
//! An in-memory database of integer-identified entities with typed
//! component values, stored columnar per archetype. Mutations can be
//! deferred through a command buffer so queries run against a consistent
//! world between commits, and per-component change records feed stateful
//! observers via `query_changed`.

pub mod archetype;
pub mod change;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod query;
pub mod world;

// Re-exports for convenience
pub use archetype::Archetype;
pub use change::{ChangeRecord, ChangedIter};
pub use command::{Command, CommandBuffer};
pub use component::{Component, ComponentId, ComponentInstance};
pub use entity::{EntityId, EntityLocation};
pub use error::{EcsError, Result};
pub use hooks::CallerContext;
pub use query::{QueryItem, QueryResult, QuerySnapshot, QueryView};
pub use world::World;
