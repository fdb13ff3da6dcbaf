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

//! Component descriptors and type-erased instances
//!
//! A `Component` is a handle to a registered component type; a
//! `ComponentInstance` is one value of that type, attachable to an entity.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Stable integer identity assigned to a component type at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Raw integer value
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Id 0 is never handed out so a zeroed id is always invalid.
static NEXT_COMPONENT_ID: AtomicU32 = AtomicU32::new(1);

struct ComponentInfo {
    id: ComponentId,
    name: Cow<'static, str>,
}

/// Handle describing one kind of data that can be attached to entities.
///
/// Handles are cheap to clone; every clone refers to the same registered
/// type and carries the same [`ComponentId`].
#[derive(Clone)]
pub struct Component {
    info: Arc<ComponentInfo>,
}

impl Component {
    /// Register a new component type and return its handle.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        let id = NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            info: Arc::new(ComponentInfo {
                id: ComponentId(id),
                name: name.into(),
            }),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Create an instance of this component holding `value`.
    pub fn instance<T: Send + Sync + 'static>(&self, value: T) -> ComponentInstance {
        ComponentInstance {
            component: self.clone(),
            value: Arc::new(value),
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.info.id == other.info.id
    }
}

impl Eq for Component {}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({}#{})", self.info.name, self.info.id)
    }
}

/// A value of some component type, associated with (at most) one entity.
///
/// Instances are immutable once created and cheap to clone; clones share
/// the payload. Equality is payload identity, so storing the same instance
/// twice is invisible to change tracking.
#[derive(Clone)]
pub struct ComponentInstance {
    component: Component,
    value: Arc<dyn Any + Send + Sync>,
}

impl ComponentInstance {
    /// The component type this instance belongs to.
    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn component_id(&self) -> ComponentId {
        self.component.id()
    }

    /// Borrow the payload as `T`, if that is what it holds.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.value.is::<T>()
    }
}

impl PartialEq for ComponentInstance {
    fn eq(&self, other: &Self) -> bool {
        self.component_id() == other.component_id() && Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}(..)", self.component.name(), self.component.id())
    }
}
