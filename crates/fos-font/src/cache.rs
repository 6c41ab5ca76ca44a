//! Instance cache
//!
//! Instances referenced by at least one caller handle are active. When the
//! last handle is released the instance moves to the head of the warm list,
//! which keeps a bounded number of unreferenced instances open. Entries
//! pushed past the bound are closed.

use std::collections::VecDeque;

use crate::catalog::FaceId;
use crate::descriptor::FontDescriptor;
use crate::instance::{FontHandle, FontInstance, InstanceId};
use crate::mapping::MappingPool;

/// Default number of warm instances kept open
pub const DEFAULT_WARM_POOL_SIZE: usize = 10;

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub active: usize,
    pub warm: usize,
    pub warm_bound: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Active and warm instances
#[derive(Debug)]
pub struct InstanceCache {
    active: Vec<FontInstance>,
    /// Most recently released first
    warm: VecDeque<FontInstance>,
    warm_bound: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Default for InstanceCache {
    fn default() -> Self {
        Self::new(DEFAULT_WARM_POOL_SIZE)
    }
}

impl InstanceCache {
    pub fn new(warm_bound: usize) -> Self {
        Self {
            active: Vec::new(),
            warm: VecDeque::with_capacity(warm_bound),
            warm_bound,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn is_match(instance: &FontInstance, desc: &FontDescriptor, hash: u64) -> bool {
        instance.hash() == hash
            && instance.descriptor().matches(desc)
            && (desc.can_use_bitmap || instance.is_scalable())
    }

    /// Find a cached instance for `desc` and attach `handle` to it.
    ///
    /// Active instances are searched first, then warm ones; a warm hit is
    /// promoted back to active.
    pub fn lookup(&mut self, desc: &FontDescriptor, handle: FontHandle) -> Option<InstanceId> {
        let hash = desc.hash_value();

        if let Some(instance) = self.active.iter_mut().find(|i| Self::is_match(i, desc, hash)) {
            instance.attach(handle);
            self.hits += 1;
            tracing::trace!("Cache hit (active) {:?}", instance.id());
            return Some(instance.id());
        }

        if let Some(pos) = self.warm.iter().position(|i| Self::is_match(i, desc, hash)) {
            let mut instance = self.warm.remove(pos)?;
            instance.attach(handle);
            let id = instance.id();
            self.active.push(instance);
            self.hits += 1;
            tracing::trace!("Cache hit (warm) {:?}", id);
            return Some(id);
        }

        self.misses += 1;
        None
    }

    /// Add a freshly opened instance as active with one handle
    pub fn insert(&mut self, mut instance: FontInstance, handle: FontHandle) -> InstanceId {
        instance.attach(handle);
        let id = instance.id();
        self.active.push(instance);
        id
    }

    /// Detach `handle` from an active instance. The instance turns warm when
    /// its last handle goes. Returns false if the handle was not attached.
    pub fn release(&mut self, id: InstanceId, handle: FontHandle, pool: &mut MappingPool) -> bool {
        let Some(pos) = self.active.iter().position(|i| i.id() == id) else {
            tracing::debug!("Release of {:?}: not active", id);
            return false;
        };
        if !self.active[pos].detach(handle) {
            tracing::debug!("Release of {:?}: {:?} not attached", id, handle);
            return false;
        }

        if !self.active[pos].is_active() {
            let instance = self.active.remove(pos);
            tracing::trace!("{:?} is now warm", id);
            self.warm.push_front(instance);
            self.trim(pool);
        }
        true
    }

    fn trim(&mut self, pool: &mut MappingPool) {
        while self.warm.len() > self.warm_bound {
            let Some(instance) = self.warm.pop_back() else {
                break;
            };
            tracing::debug!("Evicting warm instance {:?}", instance.id());
            instance.close(pool);
            self.evictions += 1;
        }
    }

    /// Close warm instances of faces that left the catalog
    pub fn evict_faces(&mut self, faces: &[FaceId], pool: &mut MappingPool) -> usize {
        let mut evicted = 0;
        let mut kept = VecDeque::with_capacity(self.warm.len());
        for instance in self.warm.drain(..) {
            if faces.contains(&instance.face()) {
                instance.close(pool);
                evicted += 1;
            } else {
                kept.push_back(instance);
            }
        }
        self.warm = kept;
        self.evictions += evicted as u64;
        evicted
    }

    /// Close every instance, active or warm
    pub fn close_all(&mut self, pool: &mut MappingPool) {
        for instance in self.active.drain(..).chain(self.warm.drain(..)) {
            instance.close(pool);
        }
    }

    pub fn get(&self, id: InstanceId) -> Option<&FontInstance> {
        self.active.iter().chain(self.warm.iter()).find(|i| i.id() == id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut FontInstance> {
        self.active.iter_mut().chain(self.warm.iter_mut()).find(|i| i.id() == id)
    }

    pub fn is_active(&self, id: InstanceId) -> bool {
        self.active.iter().any(|i| i.id() == id)
    }

    pub fn is_warm(&self, id: InstanceId) -> bool {
        self.warm.iter().any(|i| i.id() == id)
    }

    /// Warm instances, most recently released first
    pub fn warm_ids(&self) -> Vec<InstanceId> {
        self.warm.iter().map(|i| i.id()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn warm_count(&self) -> usize {
        self.warm.len()
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            active: self.active.len(),
            warm: self.warm.len(),
            warm_bound: self.warm_bound,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            hit_rate: if lookups > 0 { self.hits as f64 / lookups as f64 } else { 0.0 },
        }
    }
}
