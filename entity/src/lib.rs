//! Array-based data structures using densely numbered entity references as
//! mapping keys.
//!
//! This crate defines a number of data structures based on densely numbered
//! entity references:
//!
//! - [`PrimaryMap`](struct.PrimaryMap.html) is used to keep track of a vector
//!   of entities, assigning a unique entity reference to each.
//! - [`SecondaryMap`](struct.SecondaryMap.html) associates secondary
//!   information with entities without participating in their allocation.
//! - [`PackedOption`](packed_option/struct.PackedOption.html) is an
//!   `Option<T>` that does not grow the representation of `T`, for types
//!   with a reserved value.
//!
//! # Entity references
//!
//! A unique reference to an entity is represented as a small integer wrapped
//! in a newtype, so the type system can keep different entity spaces apart.
//! The `entity_impl!` macro provides the boilerplate for such a newtype.

#![deny(missing_docs)]

/// A type wrapping a small integer index should implement `EntityRef` so it
/// can be used as the key of an `EntityMap` or `SparseMap`.
pub trait EntityRef: Copy + Eq {
    /// Create a new entity reference from a small integer.
    /// This should crash if the requested index is not representable.
    fn new(_: usize) -> Self;

    /// Get the index that was used to create this entity reference.
    fn index(self) -> usize;
}

/// Macro which provides the common implementation of a 32-bit entity
/// reference: `EntityRef`, `ReservedValue`, a `from_u32`/`as_u32` pair, and
/// a `Display` impl using the given prefix.
#[macro_export]
macro_rules! entity_impl {
    // Basic traits.
    ($entity:ident) => {
        impl $crate::EntityRef for $entity {
            #[inline]
            fn new(index: usize) -> Self {
                debug_assert!(index < ($crate::__core::u32::MAX as usize));
                $entity(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $crate::packed_option::ReservedValue for $entity {
            #[inline]
            fn reserved_value() -> $entity {
                $entity($crate::__core::u32::MAX)
            }

            #[inline]
            fn is_reserved_value(&self) -> bool {
                self.0 == $crate::__core::u32::MAX
            }
        }

        impl $entity {
            /// Create a new instance from a `u32`.
            #[allow(dead_code)]
            #[inline]
            pub fn from_u32(x: u32) -> Self {
                debug_assert!(x < $crate::__core::u32::MAX);
                $entity(x)
            }

            /// Return the underlying index value as a `u32`.
            #[allow(dead_code)]
            #[inline]
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }
    };

    // Include a `Display` implementation using the given prefix.
    ($entity:ident, $display_prefix:expr) => {
        $crate::entity_impl!($entity);

        impl $crate::__core::fmt::Display for $entity {
            fn fmt(
                &self,
                f: &mut $crate::__core::fmt::Formatter,
            ) -> $crate::__core::fmt::Result {
                write!(f, concat!($display_prefix, "{}"), self.0)
            }
        }

        impl $crate::__core::fmt::Debug for $entity {
            fn fmt(
                &self,
                f: &mut $crate::__core::fmt::Formatter,
            ) -> $crate::__core::fmt::Result {
                (self as &dyn $crate::__core::fmt::Display).fmt(f)
            }
        }
    };
}

// Reexported `core` so the macro above works without requiring the user to
// import it.
#[doc(hidden)]
pub use core as __core;

pub mod packed_option;

mod iter;
mod keys;
mod map;
mod primary;

pub use self::iter::{Iter, IterMut};
pub use self::keys::Keys;
pub use self::map::SecondaryMap;
pub use self::primary::PrimaryMap;
