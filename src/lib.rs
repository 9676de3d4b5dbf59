#![no_std]
#![allow(unused_unsafe)]
//! A single-threaded, shared-ownership smart pointer.
//!
//! [`Shared<T>`] is a reference-counted handle to a heap-allocated value: the
//! value is destroyed exactly when the last handle referencing it goes away.
//! Unlike `std::rc::Rc`, a `Shared` may be null, may *adopt* an allocation
//! that already exists ([`Shared::adopt`], [`From<Box<T>>`]), and decouples
//! the address it observes from the allocation it owns, so a handle can point
//! at a sub-object while keeping the whole containing value alive
//! ([`Shared::project`]).
//!
//! Reference counting is plain non-atomic arithmetic; `Shared` is neither
//! `Send` nor `Sync`.
extern crate maybe_std as base;

/// A smart pointer that keeps track of how many pointers refer to the same
/// allocation and exposes this information in its API.
pub trait ReferenceCounted: Clone {
    /// Get the number of owning pointers referring to the same allocation,
    /// or 0 for a pointer that owns nothing.
    fn reference_count(this: &Self) -> usize;
}

mod block;

mod shared;
pub use shared::*;
