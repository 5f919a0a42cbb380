use serde::{Deserialize, Serialize};

/// Declares an integer-backed identifier newtype.
///
/// All identifiers in the stock service are database-assigned `BIGINT`s, so
/// they share the same shape: transparent serde, `Display`, and lossless
/// conversion to and from `i64`.
macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from its raw value.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }

            /// Returns true if the identifier is a valid database key (> 0).
            pub const fn is_valid(&self) -> bool {
                self.0 > 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

integer_id!(
    /// Identifier of a product (owned by the catalogue service).
    ProductId
);

integer_id!(
    /// Identifier of a warehouse.
    WarehouseId
);

integer_id!(
    /// Identifier of an order (owned by the order service).
    OrderId
);

integer_id!(
    /// Identifier of the group (shop) a warehouse belongs to.
    GroupId
);
