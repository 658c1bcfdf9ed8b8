//! Fixed-capacity store of agreements
//!
//! Each slot carries the generation of its current occupant. Generations
//! come from one counter seeded randomly per manager, so a handle kept past
//! its agreement's destruction never names the slot's next occupant.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::agreement::SecAgreement;
use crate::errors::{SecAgreeError, SecAgreeResult};
use crate::types::SecAgreeHandle;

#[derive(Debug, Default)]
struct Slots {
    entries: Vec<Option<Arc<SecAgreement>>>,
    free: Vec<u32>,
    next_generation: u64,
    live: usize,
}

impl Slots {
    fn take_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1).max(1);
        generation
    }
}

#[derive(Debug)]
pub(crate) struct AgreementArena {
    slots: RwLock<Slots>,
    capacity: usize,
}

impl AgreementArena {
    pub(crate) fn new(capacity: usize) -> Self {
        let seed = u64::from(rand::random::<u32>()) + 1;
        Self {
            slots: RwLock::new(Slots {
                next_generation: seed,
                ..Default::default()
            }),
            capacity,
        }
    }

    /// Allocate a slot and store the agreement `build` makes for it
    pub(crate) fn insert(
        &self,
        build: impl FnOnce(SecAgreeHandle) -> SecAgreement,
    ) -> SecAgreeResult<Arc<SecAgreement>> {
        let mut slots = self.slots.write();
        if slots.live >= self.capacity {
            return Err(SecAgreeError::out_of_resources(format!(
                "all {} security-agreements are in use",
                self.capacity
            )));
        }
        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(slots.entries.len()).map_err(|_| {
                    SecAgreeError::out_of_resources("security-agreement index space exhausted")
                })?;
                slots.entries.push(None);
                index
            }
        };
        let handle = SecAgreeHandle::new(index, slots.take_generation());
        let agreement = Arc::new(build(handle));
        slots.entries[index as usize] = Some(agreement.clone());
        slots.live += 1;
        Ok(agreement)
    }

    pub(crate) fn get(&self, handle: SecAgreeHandle) -> Option<Arc<SecAgreement>> {
        let slots = self.slots.read();
        slots
            .entries
            .get(handle.index as usize)?
            .as_ref()
            .filter(|a| a.handle() == handle)
            .cloned()
    }

    /// Free the slot of `handle`; a stale handle removes nothing
    pub(crate) fn remove(&self, handle: SecAgreeHandle) -> Option<Arc<SecAgreement>> {
        let mut slots = self.slots.write();
        let entry = slots.entries.get_mut(handle.index as usize)?;
        if !entry.as_ref().is_some_and(|a| a.handle() == handle) {
            return None;
        }
        let removed = entry.take();
        slots.free.push(handle.index);
        slots.live -= 1;
        removed
    }

    pub(crate) fn all(&self) -> Vec<Arc<SecAgreement>> {
        self.slots.read().entries.iter().flatten().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.read().live
    }
}
