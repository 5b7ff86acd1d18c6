//! Primitives for keeping parsed debug files next to their bytes.
//!
//! Parsers in `prodtrace` borrow from the buffer they parse, but a debug-info provider has to own
//! its buffer for the duration of a translation run. [`SelfCell`] stores both the owner and the
//! borrowing value, and [`AsSelf`] shortens the borrowed lifetime to that of the cell on access.

use std::ops::Deref;

pub use stable_deref_trait::StableDeref;

/// Safe downcasting of dependent lifetime bounds on structs.
///
/// Implementors return `self` with the lifetime parameter replaced by `'slf`. For types that are
/// covariant in their lifetime this is a plain reborrow.
///
/// ```
/// use prodtrace_common::AsSelf;
///
/// struct Borrowed<'a>(&'a [u8]);
///
/// impl<'slf> AsSelf<'slf> for Borrowed<'_> {
///     type Ref = Borrowed<'slf>;
///
///     fn as_self(&'slf self) -> &'slf Self::Ref {
///         self
///     }
/// }
/// ```
pub trait AsSelf<'slf> {
    /// The `Self` type with `'slf` lifetimes, returned by `as_self`.
    type Ref: ?Sized;

    /// Returns a reference to `self` with downcasted lifetime.
    fn as_self(&'slf self) -> &'slf Self::Ref;
}

/// A container carrying a derived object alongside its owner.
///
/// The owner must dereference to a stable address (see [`StableDeref`]), such as a
/// [`ByteView`](crate::ByteView). The derived value is created from a raw pointer to the owner's
/// target and is only ever handed out with the lifetime of the cell.
///
/// ```
/// use prodtrace_common::{AsSelf, ByteView, SelfCell};
///
/// struct Header<'a>(&'a [u8]);
///
/// impl<'slf> AsSelf<'slf> for Header<'_> {
///     type Ref = Header<'slf>;
///
///     fn as_self(&'slf self) -> &'slf Self::Ref {
///         self
///     }
/// }
///
/// let view = ByteView::from_vec(b"BSJB....".to_vec());
/// let cell = SelfCell::new(view, |data| Header(unsafe { &(&(*data))[..4] }));
/// assert_eq!(cell.get().0, b"BSJB");
/// ```
#[derive(Clone, Debug)]
pub struct SelfCell<O, D>
where
    O: StableDeref,
{
    owner: O,
    derived: D,
}

impl<'slf, O, T> SelfCell<O, T>
where
    O: StableDeref + 'slf,
    T: AsSelf<'slf>,
{
    /// Creates a new `SelfCell`.
    ///
    /// The callback receives a pointer to the owner's data. It is valid for as long as the cell
    /// lives, and the derived value must not leak it elsewhere.
    #[inline]
    pub fn new<F>(owner: O, derive: F) -> Self
    where
        F: FnOnce(*const <O as Deref>::Target) -> T,
    {
        let derived = derive(owner.deref() as *const _);
        SelfCell { owner, derived }
    }

    /// Creates a new `SelfCell` which may fail to construct.
    #[inline]
    pub fn try_new<E, F>(owner: O, derive: F) -> Result<Self, E>
    where
        F: FnOnce(*const <O as Deref>::Target) -> Result<T, E>,
    {
        let derived = derive(owner.deref() as *const _)?;
        Ok(SelfCell { owner, derived })
    }

    /// Returns a reference to the owner of this cell.
    #[inline(always)]
    pub fn owner(&self) -> &O {
        &self.owner
    }

    /// Returns a safe reference to the derived object in this cell.
    #[inline(always)]
    pub fn get(&'slf self) -> &'slf <T as AsSelf<'slf>>::Ref {
        self.derived.as_self()
    }
}
