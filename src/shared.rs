use base::cmp::Ordering;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::{PhantomData, Unpin};
use base::mem;
use base::ops::Deref;
use base::ptr::{self, NonNull};

use base::prelude::v1::*;

use crate::block::{self, Header};
use crate::ReferenceCounted;

/// A single-threaded reference-counted pointer that may be null, adopt
/// existing allocations, and observe a different address than it owns.
///
/// The handle keeps two independent fields: the address it dereferences to
/// (`target`) and the control block it shares ownership through (`block`).
/// Copying the handle bumps the block's count; the managed value is destroyed
/// exactly when the count reaches zero. [`Shared::project`] exploits the
/// decoupling of the two fields to hand out handles to sub-objects that keep
/// the whole containing value alive.
pub struct Shared<T: ?Sized> {
    target: Option<NonNull<T>>,
    block: Option<NonNull<Header>>,
    phantom: PhantomData<T>,
}

impl<T: ?Sized> Shared<T> {
    fn from_parts(target: Option<NonNull<T>>, block: Option<NonNull<Header>>) -> Shared<T> {
        Shared { target, block, phantom: PhantomData }
    }

    /// Creates a handle that owns and observes nothing.
    ///
    /// Performs no heap allocation. `Shared::default()` is the same handle.
    pub fn null() -> Shared<T> {
        Shared::from_parts(None, None)
    }

    /// Returns a reference to the managed value, or `None` for a null handle.
    pub fn get(this: &Shared<T>) -> Option<&T> {
        match this.target {
            Some(target) => Some(unsafe { &*target.as_ptr() }),
            None => None,
        }
    }

    /// Returns a mutable reference to the managed value if `this` is the only
    /// handle sharing its control block, and observes a value at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::Shared;
    ///
    /// let mut pair = Shared::new((3, 4));
    /// *Shared::get_mut(&mut pair).unwrap() = (5, 6);
    /// assert_eq!(*pair, (5, 6));
    ///
    /// let other = pair.clone();
    /// assert!(Shared::get_mut(&mut pair).is_none());
    /// # drop(other);
    /// ```
    pub fn get_mut(this: &mut Shared<T>) -> Option<&mut T> {
        if Shared::use_count(this) != 1 {
            return None;
        }
        match this.target {
            Some(target) => Some(unsafe { &mut *target.as_ptr() }),
            None => None,
        }
    }

    /// The number of handles sharing this handle's control block, or 0 for a
    /// handle constructed null.
    ///
    /// A handle adopting a null pointer holds a live block, so its count is
    /// positive even though [`Shared::is_null`] is true.
    pub fn use_count(this: &Shared<T>) -> usize {
        match this.block {
            Some(block) => unsafe { block.as_ref() }.count(),
            None => 0,
        }
    }

    /// Whether the handle observes no value. Dereferencing a null handle
    /// panics.
    pub fn is_null(this: &Shared<T>) -> bool {
        this.target.is_none()
    }

    /// Whether two handles observe the same address.
    ///
    /// Handles that share one allocation may still observe different
    /// addresses after [`Shared::project`].
    pub fn ptr_eq(this: &Shared<T>, other: &Shared<T>) -> bool {
        this.target == other.target
    }

    /// Creates a handle observing a sub-object of `this`'s managed value
    /// while sharing `this`'s ownership.
    ///
    /// The containing value stays alive until the projected handle (and every
    /// other handle on the same block) is gone. The same operation converts a
    /// handle to a trait-object view of its value; destruction still runs the
    /// concrete type's destructor.
    ///
    /// The payload type must be `'static`: the projected handle carries no
    /// lifetime of its own, so a projection may only expose what the managed
    /// value owns (or the program statically owns), never something the value
    /// merely borrows. [`Shared::alias`] is the unsafe fallback for borrowed
    /// payloads.
    ///
    /// Projecting a null handle yields a null handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::Shared;
    ///
    /// let pair = Shared::new((3, 4.5));
    /// let second = Shared::project(&pair, |p| &p.1);
    /// drop(pair);
    ///
    /// // `second` keeps the whole pair alive.
    /// assert_eq!(*second, 4.5);
    /// assert_eq!(Shared::use_count(&second), 1);
    /// ```
    ///
    /// A projection out of a borrow the payload holds is rejected; accepting
    /// it would let the handle outlive the referent:
    ///
    /// ```compile_fail
    /// use shared_handle::Shared;
    ///
    /// struct Wrapper<'a> {
    ///     inner: &'a i32,
    /// }
    ///
    /// let outlived;
    /// {
    ///     let value = Box::new(41);
    ///     let wrapper = Shared::new(Wrapper { inner: &value });
    ///     outlived = Shared::project(&wrapper, |w| w.inner);
    /// }
    /// assert_eq!(*outlived, 41);
    /// ```
    pub fn project<U: ?Sized, F>(this: &Shared<T>, f: F) -> Shared<U>
    where
        T: 'static,
        F: FnOnce(&T) -> &U,
    {
        let target = match this.target {
            Some(target) => Some(NonNull::from(f(unsafe { &*target.as_ptr() }))),
            None => None,
        };
        if let Some(block) = this.block {
            unsafe { block.as_ref() }.increment();
        }
        Shared::from_parts(target, this.block)
    }

    /// Creates a handle observing `target` while sharing `this`'s ownership.
    ///
    /// This is the raw-pointer form of [`Shared::project`], for addresses
    /// that cannot be produced by borrowing from the managed value directly,
    /// and for payload types that borrow and so cannot be projected.
    ///
    /// Aliasing a handle that owns no block yields a null handle, whatever
    /// `target` is: a handle never observes an address without sharing
    /// ownership of something.
    ///
    /// # Safety
    ///
    /// `target` must be null, or valid for reads (and aligned, and not
    /// mutated) for the entire lifetime of the returned handle and of every
    /// handle cloned or projected from it. Sharing `this`'s block is what
    /// normally guarantees that, by keeping the managed value, and anything
    /// it owns, alive.
    pub unsafe fn alias<U: ?Sized>(this: &Shared<T>, target: *const U) -> Shared<U> {
        let block = match this.block {
            Some(block) => block,
            None => return Shared::null(),
        };
        block.as_ref().increment();
        Shared::from_parts(NonNull::new(target as *mut U), Some(block))
    }

    /// Releases this handle's ownership and leaves it null.
    ///
    /// If it was the last handle on its block, the managed value is destroyed.
    pub fn reset(this: &mut Shared<T>) {
        *this = Shared::null();
    }

    /// Moves the handle out, leaving `this` null.
    ///
    /// The count is untouched: ownership transfers to the returned handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::Shared;
    ///
    /// let mut a = Shared::new(1);
    /// let b = Shared::take(&mut a);
    /// assert!(Shared::is_null(&a));
    /// assert_eq!(Shared::use_count(&a), 0);
    /// assert_eq!(*b, 1);
    /// ```
    pub fn take(this: &mut Shared<T>) -> Shared<T> {
        mem::replace(this, Shared::null())
    }

    /// Exchanges the state of two handles.
    ///
    /// A pure field swap: no allocation, no destruction, and no count changes
    /// happen, for any combination of null and non-null operands.
    pub fn swap(this: &mut Shared<T>, other: &mut Shared<T>) {
        mem::swap(this, other);
    }

    /// Creates a handle taking ownership of the allocation behind `target`.
    ///
    /// Allocates one control block. A null `target` is allowed and still
    /// allocates a live block: the resulting handle has `use_count() == 1`
    /// but observes nothing.
    ///
    /// For a pointer in hand as a `Box`, prefer `Shared::from(boxed)`.
    ///
    /// # Safety
    ///
    /// `target` must be null or come from [`Box::into_raw`], and the caller
    /// must not use it afterwards; the handle now owns it.
    pub unsafe fn adopt(target: *mut T) -> Shared<T> {
        let target = NonNull::new(target);
        Shared::from_parts(target, Some(block::adopting(target)))
    }

    /// Releases current ownership, then adopts `target` as in
    /// [`Shared::adopt`].
    ///
    /// # Safety
    ///
    /// Same contract as [`Shared::adopt`]. `target` must not be the pointer
    /// this handle already owns.
    pub unsafe fn reset_adopt(this: &mut Shared<T>, target: *mut T) {
        *this = Shared::adopt(target);
    }
}

impl<T> Shared<T> {
    /// Creates a handle owning `value`, with the value stored inline in the
    /// control block.
    ///
    /// Performs exactly one heap allocation, covering count and value
    /// together; this is what distinguishes it from the adopting
    /// constructors, which allocate a block next to the existing value
    /// allocation.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::Shared;
    ///
    /// let five = Shared::new(5);
    /// let also_five = five.clone();
    ///
    /// assert_eq!(*five, 5);
    /// assert_eq!(Shared::use_count(&also_five), 2);
    /// ```
    pub fn new(value: T) -> Shared<T> {
        let (block, target) = block::inline(value);
        Shared::from_parts(Some(target), Some(block))
    }

    /// Returns the observed address, or the null pointer for a null handle.
    pub fn as_ptr(this: &Shared<T>) -> *const T {
        match this.target {
            Some(target) => target.as_ptr(),
            None => ptr::null(),
        }
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    /// Makes a clone of the handle.
    ///
    /// The new handle shares the same allocation, increasing the reference
    /// count; the managed value is not copied.
    #[inline]
    fn clone(&self) -> Shared<T> {
        if let Some(block) = self.block {
            unsafe { block.as_ref() }.increment();
        }
        Shared::from_parts(self.target, self.block)
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    /// Drops the handle, decrementing the reference count.
    ///
    /// The managed value is destroyed when the last handle on its block goes
    /// away.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::cell::Cell;
    /// use shared_handle::Shared;
    ///
    /// struct Canary<'a>(&'a Cell<bool>);
    ///
    /// impl Drop for Canary<'_> {
    ///     fn drop(&mut self) {
    ///         self.0.set(true);
    ///     }
    /// }
    ///
    /// let dropped = Cell::new(false);
    /// let a = Shared::new(Canary(&dropped));
    /// let b = a.clone();
    ///
    /// drop(a);
    /// assert!(!dropped.get());
    /// drop(b);
    /// assert!(dropped.get());
    /// ```
    #[inline]
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe {
                Header::release(block);
            }
        }
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// Dereferences to the managed value.
    ///
    /// # Panics
    ///
    /// Panics if the handle is null; check [`Shared::is_null`] or use
    /// [`Shared::get`] when that can happen.
    #[inline]
    fn deref(&self) -> &T {
        match Shared::get(self) {
            Some(value) => value,
            None => panic!("dereferenced a null shared handle"),
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    /// Creates a null handle, equivalent to [`Shared::null`].
    fn default() -> Shared<T> {
        Shared::null()
    }
}

impl<T> From<T> for Shared<T> {
    /// Moves `value` into a new single-allocation handle, as [`Shared::new`].
    fn from(value: T) -> Shared<T> {
        Shared::new(value)
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    /// Adopts the boxed allocation without copying or moving the value.
    ///
    /// Allocates one control block next to the existing box. The block
    /// remembers the adopted type, so adopting a `Box<dyn Trait>` destroys
    /// the concrete value correctly.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::Shared;
    ///
    /// let text: Shared<str> = Shared::from(Box::<str>::from("aba"));
    /// assert_eq!(&*text, "aba");
    /// ```
    fn from(boxed: Box<T>) -> Shared<T> {
        let target = NonNull::new(Box::into_raw(boxed));
        Shared::from_parts(target, Some(block::adopting(target)))
    }
}

impl<T: ?Sized> ReferenceCounted for Shared<T> {
    fn reference_count(this: &Self) -> usize {
        Shared::use_count(this)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Shared::get(self) {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("(null)"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            // Format the address through a thin pointer: `{:p}` on a fat raw
            // pointer would print its metadata alongside the address.
            Some(target) => fmt::Pointer::fmt(&target.as_ptr().cast::<u8>(), f),
            // No null `*const T` exists for unsized `T`; format the null
            // address through a thin pointer instead.
            None => fmt::Pointer::fmt(&ptr::null::<u8>(), f),
        }
    }
}

impl<T: ?Sized + PartialEq> PartialEq for Shared<T> {
    /// Equality for two handles.
    ///
    /// Handles compare by their observed values, with null handles comparing
    /// like `None`: two null handles are equal, and a null handle is never
    /// equal to a non-null one. Addresses are not compared; see
    /// [`Shared::ptr_eq`] for that.
    #[inline]
    fn eq(&self, other: &Shared<T>) -> bool {
        Shared::get(self).eq(&Shared::get(other))
    }
}

impl<T: ?Sized + Eq> Eq for Shared<T> {}

impl<T: ?Sized + PartialOrd> PartialOrd for Shared<T> {
    /// Partial ordering of two handles by their observed values, a null
    /// handle ordering before any non-null one.
    fn partial_cmp(&self, other: &Shared<T>) -> Option<Ordering> {
        Shared::get(self).partial_cmp(&Shared::get(other))
    }
}

impl<T: ?Sized + Ord> Ord for Shared<T> {
    /// Ordering of two handles by their observed values, a null handle
    /// ordering before any non-null one.
    fn cmp(&self, other: &Shared<T>) -> Ordering {
        Shared::get(self).cmp(&Shared::get(other))
    }
}

impl<T: ?Sized + Hash> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Shared::get(self).hash(state)
    }
}

impl<T: ?Sized> Unpin for Shared<T> {}
