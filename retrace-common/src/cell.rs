//! Primitives for dealing with self-referential data.
//!
//! Debug sessions need to keep parsed structures (which borrow from raw file
//! data) right next to the memory mapping that owns this data. Rust has no
//! native support for such self-referential types. The [`AsSelf`] trait works
//! around this by coercing the lifetime of a dependent object to the lifetime
//! of its owner at the time of the borrow, and [`SelfCell`] stores both parts
//! together.
//!
//! [`SelfCell`]: struct.SelfCell.html
//! [`AsSelf`]: trait.AsSelf.html

use std::ops::Deref;

pub use stable_deref_trait::StableDeref;

/// Safe downcasting of dependent lifetime bounds on structs.
///
/// This trait is similar to `AsRef`, except that it allows to capture the
/// lifetime of the own instance at the time of the borrow and force it onto
/// the type's lifetime bounds. To implement, define `Ref` as the type with
/// all dependent lifetimes set to `'slf`, then return `self` in `as_self`.
///
/// ```rust
/// use retrace_common::AsSelf;
///
/// struct Foo<'a>(&'a str);
///
/// impl<'slf> AsSelf<'slf> for Foo<'_> {
///     type Ref = Foo<'slf>;
///
///     fn as_self(&'slf self) -> &Self::Ref {
///         self
///     }
/// }
/// ```
///
/// **Note** that if the type uses interior mutability (anything built on top
/// of `UnsafeCell`), the implicit coercion will not compile since the
/// lifetime is invariant. If the type never writes back borrowed data of the
/// lower lifetime, the implementation can use an unsafe transmute instead.
pub trait AsSelf<'slf> {
    /// The `Self` type with `'slf` lifetimes, returned by `as_self`.
    type Ref: ?Sized;

    /// Returns a reference to `self` with downcasted lifetime.
    fn as_self(&'slf self) -> &Self::Ref;
}

impl AsSelf<'_> for u8 {
    type Ref = u8;

    fn as_self(&self) -> &Self::Ref {
        self
    }
}

impl AsSelf<'_> for str {
    type Ref = str;

    fn as_self(&self) -> &Self::Ref {
        self
    }
}

impl<'slf, T> AsSelf<'slf> for [T]
where
    T: AsSelf<'slf>,
    T::Ref: Sized,
{
    type Ref = [T::Ref];

    fn as_self(&'slf self) -> &Self::Ref {
        unsafe { &*(self as *const [T] as *const [T::Ref]) }
    }
}

impl<'slf, T> AsSelf<'slf> for &'slf T
where
    T: AsSelf<'slf> + ?Sized,
{
    type Ref = T::Ref;

    fn as_self(&'slf self) -> &Self::Ref {
        (*self).as_self()
    }
}

impl<'slf, T> AsSelf<'slf> for Vec<T>
where
    T: AsSelf<'slf>,
    T::Ref: Sized,
{
    type Ref = [T::Ref];

    fn as_self(&'slf self) -> &Self::Ref {
        (**self).as_self()
    }
}

impl<'slf, T> AsSelf<'slf> for Box<T>
where
    T: AsSelf<'slf>,
{
    type Ref = T::Ref;

    fn as_self(&'slf self) -> &Self::Ref {
        (**self).as_self()
    }
}

impl<'slf, T> AsSelf<'slf> for std::sync::Arc<T>
where
    T: AsSelf<'slf>,
{
    type Ref = T::Ref;

    fn as_self(&'slf self) -> &Self::Ref {
        (**self).as_self()
    }
}

/// A container carrying a derived object alongside its owner.
///
/// **Warning**: This is an inherently unsafe type that builds on top of
/// [`StableDeref`] and [`AsSelf`] to establish somewhat safe memory
/// semantics. Always try to avoid self-references by storing data in an outer
/// scope first.
///
/// The owner must implement [`StableDeref`], which guarantees that the data
/// pointed to never moves over the lifetime of this object. The derived
/// object must implement [`AsSelf`], which guarantees that borrows never
/// outlive the owner. The constructor callbacks receive a raw pointer to the
/// owned data; dereferencing it is intentionally unsafe and a borrow of it
/// must not leave the callback.
///
/// ## Example
///
/// ```rust
/// use retrace_common::{AsSelf, SelfCell};
///
/// struct Foo<'a>(&'a str);
///
/// impl<'slf> AsSelf<'slf> for Foo<'_> {
///     type Ref = Foo<'slf>;
///
///     fn as_self(&'slf self) -> &Self::Ref {
///         self
///     }
/// }
///
/// let owner = String::from("hello world");
/// let cell = SelfCell::new(owner, |s| Foo(unsafe { &*s }));
/// assert_eq!(cell.get().0, "hello world");
/// ```
///
/// [`StableDeref`]: trait.StableDeref.html
/// [`AsSelf`]: trait.AsSelf.html
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
    #[inline]
    pub fn new<F>(owner: O, derive: F) -> Self
    where
        F: FnOnce(*const <O as Deref>::Target) -> T,
    {
        let derived = derive(owner.deref() as *const _);
        SelfCell { owner, derived }
    }

    /// Creates a new `SelfCell` which may fail to construct.
    ///
    /// # Example
    ///
    /// ```
    /// use retrace_common::SelfCell;
    ///
    /// # fn main() -> Result<(), std::str::Utf8Error> {
    /// let owner = Vec::from("hello world");
    /// let cell = SelfCell::try_new(owner, |s| unsafe { std::str::from_utf8(&*s) })?;
    /// # Ok(())
    /// # }
    /// ```
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

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[derive(Debug, PartialEq)]
    struct Trimmed<'a>(&'a str);

    impl<'slf> AsSelf<'slf> for Trimmed<'_> {
        type Ref = Trimmed<'slf>;

        fn as_self(&'slf self) -> &Self::Ref {
            self
        }
    }

    #[test]
    fn test_new() {
        let cell = SelfCell::new(String::from("  hello  "), |s| {
            Trimmed(unsafe { &*s }.trim())
        });
        assert_eq!(cell.get().0, "hello");
    }

    #[test]
    fn test_try_new() {
        let result: Result<_, std::num::ParseIntError> =
            SelfCell::try_new(String::from("42"), |s| {
                unsafe { &*s }.parse::<usize>()?;
                Ok(Trimmed(unsafe { &*s }))
            });
        result.expect("parsing should not fail");
    }
}
