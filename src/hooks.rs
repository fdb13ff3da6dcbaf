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

//! Per-caller hook state, consumed by `World::query_changed`.
//!
//! The world keeps no identity for a caller. A scheduler (or a test) wraps
//! each system invocation in [`CallerContext::scope`]; within the scope the
//! world fetches the caller's persistent state cell through the
//! thread-local context stack. Dropping the context runs each cell's
//! cleanup, which detaches its observer storage from the world.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::change::SharedStorage;

/// Cleanup callback invoked when a caller context is discarded.
pub(crate) type HookCleanup = Box<dyn FnOnce() + Send>;

/// Mutable state cell owned by the hook runtime, persistent across calls
/// from the same caller.
pub(crate) type HookCell = Arc<Mutex<HookState>>;

pub(crate) struct HookState {
    pub(crate) storage: Option<SharedStorage>,
}

struct HookEntry {
    cell: HookCell,
    cleanup: Option<HookCleanup>,
}

#[derive(Default)]
struct CallerState {
    cells: FxHashMap<u64, HookEntry>,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<Mutex<CallerState>>>> =
        const { RefCell::new(Vec::new()) };
}

/// One caller's hook storage.
///
/// Keep the context alive for as long as the caller may run again; its
/// cells (and the observer storages behind them) accumulate between
/// scopes. Dropping it ends the caller's lifecycle and runs the cleanups.
#[derive(Default)]
pub struct CallerContext {
    state: Arc<Mutex<CallerState>>,
}

impl CallerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this context current for hook-state lookups on this
    /// thread. Scopes nest; the innermost context wins.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(self.state.clone()));
        let _guard = StackGuard;
        f()
    }
}

impl Drop for CallerContext {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        for (_, mut entry) in state.cells.drain() {
            if let Some(cleanup) = entry.cleanup.take() {
                cleanup();
            }
        }
    }
}

struct StackGuard;

impl Drop for StackGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Fetch or create the persistent state cell for the active caller.
///
/// `make_cleanup` is invoked only when the cell is first created; the
/// returned callback runs when the caller's context is dropped. Returns
/// `None` when no context is active on this thread.
pub(crate) fn use_hook_state<F>(key: u64, make_cleanup: F) -> Option<HookCell>
where
    F: FnOnce(&HookCell) -> HookCleanup,
{
    let caller = CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())?;
    let mut state = caller.lock();
    let entry = state.cells.entry(key).or_insert_with(|| {
        let cell: HookCell = Arc::new(Mutex::new(HookState { storage: None }));
        let cleanup = make_cleanup(&cell);
        HookEntry {
            cell,
            cleanup: Some(cleanup),
        }
    });
    Some(entry.cell.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_no_context_returns_none() {
        assert!(use_hook_state(1, |_| Box::new(|| {})).is_none());
    }

    #[test]
    fn test_cell_persists_across_scopes() {
        let context = CallerContext::new();
        let first = context.scope(|| use_hook_state(7, |_| Box::new(|| {})).unwrap());
        let second = context.scope(|| use_hook_state(7, |_| Box::new(|| {})).unwrap());
        assert!(Arc::ptr_eq(&first, &second));

        let other = context.scope(|| use_hook_state(8, |_| Box::new(|| {})).unwrap());
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_cleanup_runs_on_drop() {
        static CLEANED: AtomicUsize = AtomicUsize::new(0);

        let context = CallerContext::new();
        context.scope(|| {
            use_hook_state(1, |_| {
                Box::new(|| {
                    CLEANED.fetch_add(1, Ordering::Relaxed);
                })
            })
        });
        // Re-entering must not register a second cleanup.
        context.scope(|| use_hook_state(1, |_| Box::new(|| panic!("duplicate cleanup"))));

        assert_eq!(CLEANED.load(Ordering::Relaxed), 0);
        drop(context);
        assert_eq!(CLEANED.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_contexts_are_isolated() {
        let first = CallerContext::new();
        let second = CallerContext::new();
        let a = first.scope(|| use_hook_state(1, |_| Box::new(|| {})).unwrap());
        let b = second.scope(|| use_hook_state(1, |_| Box::new(|| {})).unwrap());
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
