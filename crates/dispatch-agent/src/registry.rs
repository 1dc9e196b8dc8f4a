//! Capability store for agents and tools.
//!
//! Descriptors live in an arena kept in registration order, indexed by ID.
//! Usage counters are atomics on each entry, so concurrent outcome updates
//! only need a shared lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dispatch_models::{CapabilityDescriptor, CapabilityKind};
use tracing::{debug, info};

use crate::error::RegistryError;

type Result<T> = std::result::Result<T, RegistryError>;

struct Entry {
    descriptor: CapabilityDescriptor,
    usage_count: AtomicU64,
    success_count: AtomicU64,
}

impl Entry {
    fn new(descriptor: CapabilityDescriptor) -> Self {
        Self {
            usage_count: AtomicU64::new(descriptor.usage_count),
            success_count: AtomicU64::new(descriptor.success_count),
            descriptor,
        }
    }

    fn snapshot(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            usage_count: self.usage_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            ..self.descriptor.clone()
        }
    }
}

#[derive(Default)]
struct Arena {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Arena {
    fn from_descriptors(descriptors: Vec<CapabilityDescriptor>) -> Result<Self> {
        let mut arena = Self::default();
        for descriptor in descriptors {
            arena.insert(descriptor, false)?;
        }
        Ok(arena)
    }

    fn insert(&mut self, descriptor: CapabilityDescriptor, overwrite: bool) -> Result<()> {
        match self.index.get(&descriptor.id) {
            Some(&slot) if overwrite => {
                self.entries[slot] = Entry::new(descriptor);
                Ok(())
            }
            Some(_) => Err(RegistryError::Duplicate(descriptor.id)),
            None => {
                self.index.insert(descriptor.id.clone(), self.entries.len());
                self.entries.push(Entry::new(descriptor));
                Ok(())
            }
        }
    }
}

/// Store of capability descriptors, shared across a routing pass.
#[derive(Default)]
pub struct CapabilityRegistry {
    arena: RwLock<Arena>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from descriptors, failing on duplicate IDs.
    pub fn from_descriptors(descriptors: Vec<CapabilityDescriptor>) -> Result<Self> {
        Ok(Self {
            arena: RwLock::new(Arena::from_descriptors(descriptors)?),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Arena>> {
        self.arena
            .read()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Arena>> {
        self.arena
            .write()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    }

    /// Register a new capability.
    pub fn register(&self, descriptor: CapabilityDescriptor) -> Result<()> {
        let id = descriptor.id.clone();
        self.write()?.insert(descriptor, false)?;
        debug!(capability_id = %id, "capability registered");
        Ok(())
    }

    /// Register a capability, replacing any existing one with the same ID.
    ///
    /// A replaced capability keeps its registration position.
    pub fn register_or_replace(&self, descriptor: CapabilityDescriptor) -> Result<()> {
        self.write()?.insert(descriptor, true)
    }

    /// Swap the whole descriptor set, e.g. after reconfiguration.
    pub fn replace_all(&self, descriptors: Vec<CapabilityDescriptor>) -> Result<()> {
        let fresh = Arena::from_descriptors(descriptors)?;
        let count = fresh.entries.len();
        *self.write()? = fresh;
        info!(count, "capability set replaced");
        Ok(())
    }

    /// Snapshot of one descriptor.
    pub fn get(&self, id: &str) -> Result<CapabilityDescriptor> {
        let arena = self.read()?;
        arena
            .index
            .get(id)
            .map(|&slot| arena.entries[slot].snapshot())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.read()?.index.contains_key(id))
    }

    /// Descriptors of one kind, in registration order.
    pub fn list(&self, kind: CapabilityKind) -> Result<Vec<CapabilityDescriptor>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .filter(|e| e.descriptor.kind == kind)
            .map(Entry::snapshot)
            .collect())
    }

    /// All descriptors, in registration order.
    pub fn list_all(&self) -> Result<Vec<CapabilityDescriptor>> {
        Ok(self.read()?.entries.iter().map(Entry::snapshot).collect())
    }

    /// Count one invocation of `id`.
    pub fn record_outcome(&self, id: &str, success: bool) -> Result<()> {
        let arena = self.read()?;
        let slot = *arena
            .index
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        let entry = &arena.entries[slot];
        entry.usage_count.fetch_add(1, Ordering::Relaxed);
        if success {
            entry.success_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().map(|a| a.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
