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

//! Error types

use thiserror::Error;

use crate::entity::EntityId;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    /// Operation targeted an id that is not present in the entity table.
    #[error("entity {0} does not exist in this world")]
    NoEntity(EntityId),

    /// `spawn_at` was given an id that is already live.
    #[error("entity {0} already exists; despawn it or use replace instead")]
    EntityAlreadyExists(EntityId),

    /// `query_changed` was called outside a caller context.
    #[error("query_changed must be called from within a caller context")]
    MissingHookContext,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
