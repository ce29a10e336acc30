// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Inspector table and coalesced parameter-override storage.
//!
//! The table is a dense vector indexed by handle; handles are never reused
//! within one analyzer lifetime, so a closed inspector stays in its slot in
//! the `Halted` state until teardown. Pending overrides live in an
//! analyzer-owned slot vector; each entry points at its slot, which is what
//! coalesces repeated set-operations into a single in-flight request.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use radscan_core::msg::InspectorHandle;
use radscan_dsp::TunerChannelId;

use crate::inspector::{Inspector, InspectorState};

/// Coalesced pending parameter change for one inspector. At most one per
/// inspector is in flight; setters overwrite fields in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverridableRequest {
    pub freq_hz: Option<f64>,
    pub bw_hz: Option<f64>,
}

/// Shared per-inspector record. The boxed inspector itself is fed by
/// exactly one scheduler worker at a time under its own mutex; the state
/// field is read by the scheduler without taking the table lock.
pub struct InspectorEntry {
    pub handle: InspectorHandle,
    pub class: &'static str,
    state: AtomicU8,
    pub channel: Mutex<Option<TunerChannelId>>,
    pub channel_samp_rate: f64,
    pub inner: Mutex<Box<dyn Inspector>>,
}

impl InspectorEntry {
    pub fn new(
        handle: InspectorHandle,
        class: &'static str,
        channel_samp_rate: f64,
        inner: Box<dyn Inspector>,
    ) -> Self {
        Self {
            handle,
            class,
            state: AtomicU8::new(InspectorState::Init as u8),
            channel: Mutex::new(None),
            channel_samp_rate,
            inner: Mutex::new(inner),
        }
    }

    pub fn state(&self) -> InspectorState {
        InspectorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: InspectorState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

struct TableSlot {
    entry: Arc<InspectorEntry>,
    override_slot: Option<usize>,
}

/// Guarded by the analyzer's inspector-list mutex.
#[derive(Default)]
pub struct InspectorTable {
    slots: Vec<TableSlot>,
    overrides: Vec<Option<OverridableRequest>>,
}

impl InspectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append an entry; its handle is the new table index.
    pub fn insert(&mut self, entry: Arc<InspectorEntry>) -> InspectorHandle {
        let handle = self.slots.len();
        debug_assert_eq!(entry.handle, handle);
        self.slots.push(TableSlot {
            entry,
            override_slot: None,
        });
        handle
    }

    pub fn next_handle(&self) -> InspectorHandle {
        self.slots.len()
    }

    pub fn get(&self, handle: InspectorHandle) -> Option<&Arc<InspectorEntry>> {
        self.slots.get(handle).map(|s| &s.entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<InspectorEntry>> {
        self.slots.iter().map(|s| &s.entry)
    }

    /// Number of pending override requests (test hook).
    pub fn pending_overrides(&self) -> usize {
        self.overrides.iter().filter(|o| o.is_some()).count()
    }

    fn override_slot_for(&mut self, handle: InspectorHandle) -> Option<usize> {
        let slot = self.slots.get_mut(handle)?;
        if let Some(idx) = slot.override_slot {
            return Some(idx);
        }
        let idx = match self.overrides.iter().position(|o| o.is_none()) {
            Some(free) => {
                self.overrides[free] = Some(OverridableRequest::default());
                free
            }
            None => {
                self.overrides.push(Some(OverridableRequest::default()));
                self.overrides.len() - 1
            }
        };
        slot.override_slot = Some(idx);
        Some(idx)
    }

    /// Detach every pending override together with its entry. Slots are
    /// freed; the requests become the caller's to apply.
    pub fn drain_overrides(&mut self) -> Vec<(Arc<InspectorEntry>, OverridableRequest)> {
        let mut out = Vec::new();
        for slot in &mut self.slots {
            if let Some(idx) = slot.override_slot.take() {
                if let Some(req) = self.overrides[idx].take() {
                    out.push((slot.entry.clone(), req));
                }
            }
        }
        out
    }
}

/// Write access to one inspector's pending override. Holds the
/// inspector-list mutex for its whole lifetime; dropping the guard is the
/// release operation.
pub struct OverridableGuard<'a> {
    guard: MutexGuard<'a, InspectorTable>,
    idx: usize,
}

impl std::ops::Deref for OverridableGuard<'_> {
    type Target = OverridableRequest;

    fn deref(&self) -> &OverridableRequest {
        self.guard.overrides[self.idx].as_ref().expect("live slot")
    }
}

impl std::ops::DerefMut for OverridableGuard<'_> {
    fn deref_mut(&mut self) -> &mut OverridableRequest {
        self.guard.overrides[self.idx].as_mut().expect("live slot")
    }
}

/// Look up `handle`, require it to be RUNNING, and expose its pending
/// override (allocating one if absent). Returns `None`, with no side
/// effects, for an out-of-range handle or a non-running inspector.
pub fn acquire_overridable(
    table: &Mutex<InspectorTable>,
    handle: InspectorHandle,
) -> Option<OverridableGuard<'_>> {
    let mut guard = table.lock().expect("inspector list mutex");
    let entry = guard.get(handle)?;
    if entry.state() != InspectorState::Running {
        return None;
    }
    let idx = guard.override_slot_for(handle)?;
    Some(OverridableGuard { guard, idx })
}
