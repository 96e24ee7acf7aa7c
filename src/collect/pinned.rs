//! Registry of pinned objects.
//!
//! Pinning publishes an object's address to the collector so its bytes are
//! not moved while the pin is held. Entries live in a fixed arena of slots
//! linked through indices; pinning pops a free slot and pushes it onto the
//! pin list without allocating, so it is safe on allocation-sensitive paths.
//! Dropping a [`PinHandle`] merely closes its slot; the slot is unlinked and
//! recycled by the collector's walk at the start of the next cycle.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use crate::util::address::Address;
use crate::util::address::ObjectReference;

const NIL: u32 = u32::MAX;

struct PinSlot {
    /// Raw address of the pinned object; zero while the slot is free.
    object: AtomicUsize,
    /// Index of the next slot on the pin list, or [`NIL`].
    next: AtomicU32,
    /// Cleared when the owning [`PinHandle`] is dropped.
    open: AtomicBool,
}

/// The pin arena. `head` is the lock-free list of active pins; free slot
/// indices are kept on a mutex-guarded stack because only pin creation
/// touches it, never the hot cycle path.
pub struct PinnedObjects {
    slots: Box<[PinSlot]>,
    head: AtomicU32,
    free: Mutex<Vec<u32>>,
}

impl PinnedObjects {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity < NIL as usize, "pin arena capacity out of range");
        let slots = (0..capacity)
            .map(|_| PinSlot {
                object: AtomicUsize::new(0),
                next: AtomicU32::new(NIL),
                open: AtomicBool::new(false),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        // Popping from the back hands out low indices last; order is not
        // meaningful, the stack just has to hold every index once.
        let free = (0..capacity as u32).rev().collect();
        PinnedObjects {
            slots,
            head: AtomicU32::new(NIL),
            free: Mutex::new(free),
        }
    }

    /// Pin `obj`. Returns `None` when the arena is full. No allocation
    /// happens on success or failure.
    pub fn pin(&self, obj: ObjectReference) -> Option<PinHandle<'_>> {
        let index = self.free.lock().unwrap().pop()?;
        let slot = &self.slots[index as usize];
        slot.object
            .store(obj.to_raw_address().as_usize(), Ordering::Relaxed);
        slot.open.store(true, Ordering::Release);
        self.push(index);
        Some(PinHandle {
            registry: self,
            index,
        })
    }

    fn push(&self, index: u32) {
        let slot = &self.slots[index as usize];
        loop {
            let head = self.head.load(Ordering::Acquire);
            slot.next.store(head, Ordering::Relaxed);
            if self
                .head
                .compare_exchange(head, index, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Claim the pin list, visit every open pin, and rebuild the list from
    /// the open entries while recycling closed ones. Runs inside the cycle
    /// body with mutators parked. Re-pushing reverses the list, so pins are
    /// visited in alternating order across consecutive cycles; no caller
    /// depends on the order.
    pub fn claim_and_visit(&self, visit: &mut dyn FnMut(ObjectReference)) {
        let mut index = self.head.swap(NIL, Ordering::AcqRel);
        while index != NIL {
            let slot = &self.slots[index as usize];
            let next = slot.next.load(Ordering::Relaxed);
            if slot.open.load(Ordering::Acquire) {
                let raw = slot.object.load(Ordering::Relaxed);
                if let Some(obj) =
                    ObjectReference::from_raw_address(Address::from_usize(raw))
                {
                    visit(obj);
                }
                self.push(index);
            } else {
                slot.object.store(0, Ordering::Relaxed);
                self.free.lock().unwrap().push(index);
            }
            index = next;
        }
    }

    #[cfg(test)]
    fn active_count(&self) -> usize {
        let mut count = 0;
        let mut index = self.head.load(Ordering::Acquire);
        while index != NIL {
            count += 1;
            index = self.slots[index as usize].next.load(Ordering::Relaxed);
        }
        count
    }
}

/// Keeps one object pinned for as long as the handle lives.
pub struct PinHandle<'a> {
    registry: &'a PinnedObjects,
    index: u32,
}

impl PinHandle<'_> {
    pub fn object(&self) -> ObjectReference {
        let raw = self.registry.slots[self.index as usize]
            .object
            .load(Ordering::Relaxed);
        ObjectReference::from_raw_address(Address::from_usize(raw))
            .expect("open pin slot holds a null object")
    }
}

impl Drop for PinHandle<'_> {
    fn drop(&mut self) {
        self.registry.slots[self.index as usize]
            .open
            .store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(raw: usize) -> ObjectReference {
        ObjectReference::from_raw_address(Address::from_usize(raw)).unwrap()
    }

    fn visited(pins: &PinnedObjects) -> Vec<ObjectReference> {
        let mut seen = Vec::new();
        pins.claim_and_visit(&mut |o| seen.push(o));
        seen
    }

    #[test]
    fn open_pins_are_visited() {
        let pins = PinnedObjects::with_capacity(8);
        let _a = pins.pin(obj(0x1000)).unwrap();
        let _b = pins.pin(obj(0x2000)).unwrap();
        let seen = visited(&pins);
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&obj(0x1000)));
        assert!(seen.contains(&obj(0x2000)));
        // Both pins are still registered for the next cycle.
        assert_eq!(pins.active_count(), 2);
    }

    #[test]
    fn visit_order_reverses_each_cycle() {
        let pins = PinnedObjects::with_capacity(8);
        let _a = pins.pin(obj(0x1000)).unwrap();
        let _b = pins.pin(obj(0x2000)).unwrap();
        let first = visited(&pins);
        let second = visited(&pins);
        assert_eq!(first, vec![obj(0x2000), obj(0x1000)]);
        assert_eq!(second, vec![obj(0x1000), obj(0x2000)]);
    }

    #[test]
    fn closed_pins_are_recycled() {
        let pins = PinnedObjects::with_capacity(1);
        let handle = pins.pin(obj(0x1000)).unwrap();
        assert!(pins.pin(obj(0x2000)).is_none());
        drop(handle);
        // The slot is still on the pin list until a cycle walks it.
        assert!(pins.pin(obj(0x2000)).is_none());
        assert!(visited(&pins).is_empty());
        let reused = pins.pin(obj(0x2000)).unwrap();
        assert_eq!(reused.object(), obj(0x2000));
    }

    #[test]
    fn capacity_exhaustion_returns_none() {
        let pins = PinnedObjects::with_capacity(2);
        let _a = pins.pin(obj(0x1000)).unwrap();
        let _b = pins.pin(obj(0x2000)).unwrap();
        assert!(pins.pin(obj(0x3000)).is_none());
    }
}
