// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Populate-once memo keyed by device name.
///
/// The map lock is only held while fetching the per-device slot; the
/// initializer runs under that slot's `OnceLock`, so concurrent callers for
/// the same device wait for a single computation while other devices
/// proceed.
#[derive(Debug)]
pub struct DeviceCache<T> {
    slots: Mutex<HashMap<String, Arc<OnceLock<T>>>>,
}

impl<T> Default for DeviceCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> DeviceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_init<F: FnOnce() -> T>(&self, device: &str, init: F) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(device.to_string()).or_default())
        };
        slot.get_or_init(init).clone()
    }

    pub fn get(&self, device: &str) -> Option<T> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(device)?.get().cloned()
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
