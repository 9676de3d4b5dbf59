//! The control-block subsystem.
//!
//! A control block is one heap allocation holding the live reference count
//! for one managed value together with the knowledge of how to destroy it.
//! Dispatch to the variant-specific destruction policy goes through a plain
//! function pointer stored in the shared [`Header`], so a handle whose static
//! type differs from the managed value's concrete type (after projection to a
//! trait object, say) still runs the concrete destructor.

use base::cell::Cell;
use base::ptr::NonNull;

use base::prelude::v1::*;

/// The part of a control block every variant starts with.
///
/// Both block variants are `#[repr(C)]` with the header as their first field,
/// so a `*mut Header` is also a pointer to the whole block and `destroy` can
/// cast it back to the concrete variant.
pub(crate) struct Header {
    strong: Cell<usize>,
    destroy: unsafe fn(*mut Header),
}

impl Header {
    fn new(destroy: unsafe fn(*mut Header)) -> Header {
        Header { strong: Cell::new(1), destroy }
    }

    pub(crate) fn count(&self) -> usize {
        self.strong.get()
    }

    /// Record one more handle sharing this block.
    #[inline]
    pub(crate) fn increment(&self) {
        let strong = self.strong.get();

        // A live block always has a positive count. Panic instead of letting
        // the counter wrap, which would cause a premature destruction.
        if strong == 0 || strong == usize::MAX {
            panic!("reference count overflow");
        }
        self.strong.set(strong + 1);
    }

    /// Record that a handle stopped sharing this block. When the last
    /// reference goes away, the variant-specific destructor runs: it destroys
    /// the managed value and frees the block allocation itself.
    ///
    /// Safety: `block` must point to a live block, and the caller gives up
    /// its reference, so it must not touch the block afterwards.
    pub(crate) unsafe fn release(block: NonNull<Header>) {
        let strong = block.as_ref().strong.get();
        if strong == 1 {
            (block.as_ref().destroy)(block.as_ptr());
        } else {
            block.as_ref().strong.set(strong - 1);
        }
    }
}

/// Block variant wrapping a separately allocated value.
///
/// `target` may be `None`: a handle constructed from a null raw pointer still
/// holds a live, counted block with nothing to destroy behind it.
#[repr(C)]
struct AdoptedBlock<T: ?Sized> {
    header: Header,
    target: Option<NonNull<T>>,
}

/// Block variant holding the value inline, so block and value share a single
/// allocation.
#[repr(C)]
struct InlineBlock<T> {
    header: Header,
    value: T,
}

unsafe fn destroy_adopted<T: ?Sized>(block: *mut Header) {
    let block = Box::from_raw(block as *mut AdoptedBlock<T>);
    if let Some(target) = block.target {
        // Dropped under the type it was adopted as, which is what makes
        // destruction through a converted handle run the right destructor.
        drop(Box::from_raw(target.as_ptr()));
    }
}

unsafe fn destroy_inline<T>(block: *mut Header) {
    // Dropping the box destroys the value in place and frees block and value
    // storage together; there is no separate deallocation for the value.
    drop(Box::from_raw(block as *mut InlineBlock<T>));
}

/// Allocate a block adopting `target`, with the count already at 1.
///
/// This is the only allocation performed; the value behind `target` (if any)
/// is never copied or moved.
pub(crate) fn adopting<T: ?Sized>(target: Option<NonNull<T>>) -> NonNull<Header> {
    let block = Box::into_raw(Box::new(AdoptedBlock {
        header: Header::new(destroy_adopted::<T>),
        target,
    }));
    unsafe { NonNull::new_unchecked(block as *mut Header) }
}

/// Allocate a block holding `value` inline, with the count already at 1.
///
/// Returns the block and the address of the value inside it. Performs exactly
/// one heap allocation.
pub(crate) fn inline<T>(value: T) -> (NonNull<Header>, NonNull<T>) {
    let block = Box::into_raw(Box::new(InlineBlock {
        header: Header::new(destroy_inline::<T>),
        value,
    }));
    unsafe {
        let target = NonNull::new_unchecked(&mut (*block).value as *mut T);
        (NonNull::new_unchecked(block as *mut Header), target)
    }
}
