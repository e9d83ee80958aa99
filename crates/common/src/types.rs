use serde::{Deserialize, Serialize};

/// Declares a numeric identifier newtype.
///
/// Identifiers are assigned by the store (or by external systems for
/// borrowers, investors and employees). Zero is reserved as "unset",
/// matching the default of an omitted JSON field.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
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

            /// Returns true if no identifier has been assigned.
            pub const fn is_unset(&self) -> bool {
                self.0 <= 0
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

numeric_id!(
    /// Identity of a loan, generated by the loan store on insert.
    LoanId
);

numeric_id!(
    /// Reference to the borrower who requested a loan.
    BorrowerId
);

numeric_id!(
    /// Reference to an investor funding a loan.
    InvestorId
);

numeric_id!(
    /// Reference to the employee who signed an approval or disbursement.
    EmployeeId
);
