use crate::util::address::{Address, ByteSize, ObjectReference};

/// The heap as the collection engine sees it: two generations, each with a
/// from-half (live, being scanned) and a to-half (destination of copies),
/// plus the object-graph accessors the tracer needs.
///
/// The engine enforces one invariant over this contract: the to-half of every
/// generation is empty immediately before and immediately after a cycle.
/// Everything else — chunk splitting, header bit layout, card marking — is
/// the heap's business.
pub trait Heap: 'static + Send + Sync {
    type Young: YoungGeneration;
    type Old: OldGeneration;

    fn young(&self) -> &Self::Young;
    fn old(&self) -> &Self::Old;

    /// Flush thread-local allocation buffers into the global space lists, so
    /// the cycle sees every allocated chunk. Called at the start of the
    /// cycle body, with all mutators parked.
    fn flush_thread_local_allocation(&self);

    /// Read the reference stored at `slot`. `None` for a null slot.
    fn read_slot(&self, slot: Address) -> Option<ObjectReference>;

    /// Store `value` into `slot`.
    fn write_slot(&self, slot: Address, value: ObjectReference);

    /// Whether `obj` lives in a from-half collected by the current cycle
    /// (i.e. the object is white and must be copied to survive).
    fn needs_promotion(&self, obj: ObjectReference) -> bool;

    /// The forwarded address of `obj`, if it was already copied this cycle.
    fn forwarding_of(&self, obj: ObjectReference) -> Option<ObjectReference>;

    /// Copy `obj` into its destination space, install a forwarding
    /// reference, and leave the copy grey (its own slots not yet visited).
    /// Must only be called for objects that [`needs_promotion`] and carry no
    /// forwarding yet.
    ///
    /// [`needs_promotion`]: Heap::needs_promotion
    fn promote(&self, obj: ObjectReference) -> ObjectReference;

    /// Enumerate the reference slots of `obj`.
    fn walk_slots(&self, obj: ObjectReference, f: &mut dyn FnMut(Address));

    /// Whether `obj` lives in runtime-managed (image) memory, outside both
    /// generations. Such objects never move and are never collected.
    fn is_runtime_managed(&self, obj: ObjectReference) -> bool;
}

/// Operations common to both generations.
pub trait Generation: 'static + Send + Sync {
    /// Bytes reserved by the generation's chunks (but maybe not occupied).
    fn used_chunk_bytes(&self) -> ByteSize;

    /// Bytes occupied by objects. More expensive to gather than chunk bytes;
    /// only consulted when detailed accounting is enabled.
    fn used_object_bytes(&self) -> ByteSize;

    /// Whether the generation's to-half holds no chunks.
    fn to_space_is_empty(&self) -> bool;

    /// Snapshot the generation's space state so that objects promoted from
    /// now on can be recognized as grey by [`scan_grey_objects`].
    ///
    /// [`scan_grey_objects`]: Generation::scan_grey_objects
    fn prepare_for_promotion(&self);

    /// Visit every object that became grey since the last call, and return
    /// whether any object was visited. Visiting may grey further objects in
    /// either generation; the caller iterates to a fixpoint.
    fn scan_grey_objects(&self, visit: &mut dyn FnMut(ObjectReference)) -> bool;

    /// Return unused chunk capacity to the chunk allocator.
    fn release_unused(&self);

    /// Exchange the from/to roles of the generation's halves.
    fn swap_spaces(&self);
}

pub trait YoungGeneration: Generation {
    /// Bytes held by the age-cohort survivor areas. Counted against the heap
    /// budget together with the old generation after a cycle.
    fn survivor_chunk_bytes(&self) -> ByteSize;
}

pub trait OldGeneration: Generation {
    /// Move the entire from-half into the to-half without per-object
    /// copying. Used by incremental passes: the moved objects are reached
    /// via dirty card marks rather than being treated as white.
    fn empty_from_into_to(&self);

    /// Visit every object on a dirty card (an old-generation location the
    /// mutator wrote since the last cycle). Cleans the cards as it goes.
    fn walk_dirty_objects(&self, visit: &mut dyn FnMut(ObjectReference));

    /// Move the chunk containing `obj` wholesale from its from-half into
    /// this generation's to-half, leaving every object in the chunk at its
    /// old address and grey. Used for pinned objects, whose bytes must not
    /// move; chunk-mates are implicitly promoted as a side effect.
    fn promote_object_chunk(&self, obj: ObjectReference);
}
