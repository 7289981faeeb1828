//! Runtime table of mounted tagged elements.
//!
//! Entries are created when an instrumented element mounts and removed when
//! it unmounts. The registry lives on the single-threaded UI scheduler, so it
//! is shared through `Rc<RefCell<_>>` and never needs locking.
//!
//! Ids are derived from `(filename, span)`, so every mounted instance of one
//! source construct (list items rendered from the same JSX, for example)
//! shares an id. Each registration hands back its own [`MountId`]; an entry
//! stays until every live mount of its id has been released, and releasing
//! the same mount twice does nothing.

use crate::span::{SourceSpan, SpanId, TaggedElement};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("span registry has been disposed")]
    Disposed,
}

/// Token for one registration of a span id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountId {
    id: SpanId,
    seq: u64,
}

impl MountId {
    pub fn span_id(&self) -> &SpanId {
        &self.id
    }
}

#[derive(Debug)]
struct Entry {
    element: TaggedElement,
    mounts: HashSet<u64>,
}

#[derive(Debug, Default)]
pub struct SpanRegistry {
    entries: HashMap<SpanId, Entry>,
    next_seq: u64,
    disposed: bool,
}

impl SpanRegistry {
    /// Create an empty registry for one running application instance.
    pub fn init() -> RegistryHandle {
        RegistryHandle(Rc::new(RefCell::new(SpanRegistry::default())))
    }

    pub fn register(
        &mut self,
        id: SpanId,
        filename: impl Into<String>,
        span: SourceSpan,
    ) -> Result<MountId, RegistryError> {
        if self.disposed {
            return Err(RegistryError::Disposed);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let element = TaggedElement {
            id: id.clone(),
            filename: filename.into(),
            span,
        };
        let entry = self.entries.entry(id.clone()).or_insert_with(|| Entry {
            element: element.clone(),
            mounts: HashSet::new(),
        });
        entry.element = element;
        entry.mounts.insert(seq);
        Ok(MountId { id, seq })
    }

    /// Release one mount. Unknown or already released mounts are ignored.
    pub fn unregister(&mut self, mount: &MountId) {
        let Some(entry) = self.entries.get_mut(&mount.id) else {
            return;
        };
        if entry.mounts.remove(&mount.seq) && entry.mounts.is_empty() {
            self.entries.remove(&mount.id);
        }
    }

    pub fn lookup(&self, id: &SpanId) -> Option<&TaggedElement> {
        self.entries.get(id).map(|e| &e.element)
    }

    /// Number of distinct ids currently mounted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tear down: drop every entry and refuse further registrations.
    pub fn dispose(&mut self) {
        self.entries.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Shared handle to a [`SpanRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryHandle(Rc<RefCell<SpanRegistry>>);

impl RegistryHandle {
    pub fn register(
        &self,
        id: SpanId,
        filename: impl Into<String>,
        span: SourceSpan,
    ) -> Result<MountId, RegistryError> {
        self.0.borrow_mut().register(id, filename, span)
    }

    pub fn unregister(&self, mount: &MountId) {
        self.0.borrow_mut().unregister(mount);
    }

    pub fn lookup(&self, id: &SpanId) -> Option<TaggedElement> {
        self.0.borrow().lookup(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn dispose(&self) {
        self.0.borrow_mut().dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.0.borrow().is_disposed()
    }

    /// Register `element` for as long as the returned guard lives.
    ///
    /// The guard unregisters on drop, whichever way the owning node goes
    /// away.
    pub fn mount(&self, element: &TaggedElement) -> Result<MountGuard, RegistryError> {
        let mount = self.register(element.id.clone(), element.filename.clone(), element.span)?;
        Ok(MountGuard {
            registry: Rc::downgrade(&self.0),
            mount,
        })
    }
}

/// Scoped registration of one mounted element.
#[derive(Debug)]
#[must_use = "dropping the guard unregisters the element immediately"]
pub struct MountGuard {
    registry: Weak<RefCell<SpanRegistry>>,
    mount: MountId,
}

impl MountGuard {
    pub fn id(&self) -> &SpanId {
        self.mount.span_id()
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        // A guard dropped while the registry is borrowed (unwinding out of a
        // registry callback) cannot unregister
        let released = match registry.try_borrow_mut() {
            Ok(mut registry) => {
                registry.unregister(&self.mount);
                true
            }
            Err(_) => false,
        };
        if !released {
            tracing::warn!(id = %self.mount.id, "registry busy; mount entry leaked");
        }
    }
}
