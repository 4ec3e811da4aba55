/// Declare a transparent, copyable id newtype around an integer.
///
/// The generated type derives ordering, hashing and transparent serde, and
/// converts to and from its raw representation.
#[macro_export]
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            #[inline]
            pub fn raw(self) -> $inner {
                self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(val: $inner) -> Self {
                Self(val)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(val: $name) -> Self {
                val.0
            }
        }
    };
}

id_type!(
    /// Namenode-assigned identifier of one block.
    BlockId,
    u64
);
id_type!(
    /// Write lease granted by the namenode to the holder of an open-for-write file.
    LeaseId,
    u64
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_block_id_conversions() {
        let id: BlockId = 1073741825u64.into();
        assert_eq!(id.raw(), 1073741825);
        let raw: u64 = id.into();
        assert_eq!(raw, 1073741825);
        assert_eq!(format!("{:?}", id), "BlockId(1073741825)");
        assert_eq!(format!("{}", id), "1073741825");
    }

    #[test]
    fn test_lease_id_ord_hash() {
        assert!(LeaseId(1) < LeaseId(2));
        let set: HashSet<_> = [LeaseId(1), LeaseId(2), LeaseId(1)].into();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_block_id_serde() {
        let json = serde_json::to_string(&BlockId(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: BlockId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, BlockId(42));
    }
}
