use serde::{Deserialize, Serialize};

/// Declares a string-backed identifier newtype.
///
/// Wrapping the raw string keeps material ids, location ids and the like
/// from being mixed up at call sites.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or only whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Plant (site) code that scopes locations and movement numbering.
    Plant
);

string_id!(
    /// Material identifier as known to the catalog.
    MaterialId
);

string_id!(
    /// Warehouse location identifier as known to the catalog.
    LocationId
);

string_id!(
    /// Identifier of the user or system that requested a movement.
    ActorId
);

/// Batch identifier grouping a specific intake of material.
///
/// A missing lot is represented by the [`Lot::UNLOTTED`] sentinel so that a
/// balance key is always total and never contains a null.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lot(String);

impl Lot {
    /// Sentinel stored for stock that carries no lot.
    pub const UNLOTTED: &'static str = "UNLOTTED";

    /// Creates a lot from a string. Blank input maps to the unlotted sentinel.
    pub fn new(lot: impl Into<String>) -> Self {
        let lot = lot.into();
        let trimmed = lot.trim();
        if trimmed.is_empty() {
            Self::unlotted()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Returns the unlotted sentinel.
    pub fn unlotted() -> Self {
        Self(Self::UNLOTTED.to_string())
    }

    /// Maps an optional caller-supplied lot to a total lot value.
    pub fn from_option(lot: Option<impl Into<String>>) -> Self {
        lot.map(Self::new).unwrap_or_else(Self::unlotted)
    }

    /// Returns true if this is the unlotted sentinel.
    pub fn is_unlotted(&self) -> bool {
        self.0 == Self::UNLOTTED
    }

    /// Returns the lot as a string slice (the sentinel for unlotted stock).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lot, or `None` for unlotted stock.
    pub fn as_option(&self) -> Option<&str> {
        if self.is_unlotted() {
            None
        } else {
            Some(&self.0)
        }
    }
}

impl Default for Lot {
    fn default() -> Self {
        Self::unlotted()
    }
}

impl std::fmt::Display for Lot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Lot {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Option<String>> for Lot {
    fn from(lot: Option<String>) -> Self {
        Self::from_option(lot)
    }
}
