//! Instruction operands
//!
//! Every table an instruction can point into gets its own index type so a
//! string index can never be handed to an instruction expecting a data blob.

use serde::{Deserialize, Serialize};

macro_rules! pool_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Create a new index
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Get index value
            #[inline]
            pub const fn index(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(index: u32) -> Self {
                Self(index)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

pool_index! {
    /// Index into the interned string table
    StringIndex
}

pool_index! {
    /// Index into the resolved url table
    UrlIndex
}

pool_index! {
    /// Index into the byte-array table (custom parser data, descriptors, payloads)
    DataIndex
}

pool_index! {
    /// Start offset of a run in the packed integer table
    IntDataIndex
}

pool_index! {
    /// Start offset of a run in the packed float table
    FloatDataIndex
}

pool_index! {
    /// Index into the artifact's type-reference table
    TypeIndex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        let idx = StringIndex::new(7);
        assert_eq!(idx.index(), 7);
        assert_eq!(DataIndex::from(3), DataIndex(3));
        assert_eq!(TypeIndex(12).to_string(), "12");
    }
}
