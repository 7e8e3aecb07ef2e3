#![allow(unused_macros)]

/// Helper macro for declaring arena handles
///
/// Every IR entity (values, instructions, blocks, functions, declarations) lives in an
/// arena and is referenced through a small `Copy` handle. The macro generates the newtype,
/// its constructor and index accessor, and a `Debug`/`Display` implementation using the
/// given prefix.
///
/// ```rust, ignore
///  entity_id!(
///      /// Handle of a basic block.
///      BlockId, "bb"
///  );
///  assert_eq!(BlockId::new(3).to_string(), "bb3");
/// ```
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            /// Creates a handle from a raw arena index.
            #[must_use]
            #[inline]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Returns the raw arena index of this handle.
            #[must_use]
            #[inline]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}
