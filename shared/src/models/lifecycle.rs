//! Status enums and the lifecycle state machines built on them

use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Declare a closed set of string-valued codes.
///
/// Every variant gets a snake_case wire name used for JSON, for the
/// database enum type and for `as_str` / `FromStr`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $db_type:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
        #[cfg_attr(feature = "sqlx", sqlx(type_name = $db_type))]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                #[cfg_attr(feature = "sqlx", sqlx(rename = $wire))]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err($crate::error::DomainError::validation(
                        $db_type,
                        format!("unknown value '{}'", other),
                    )),
                }
            }
        }
    };
}

/// A status field with an explicit adjacency of legal transitions
pub trait Lifecycle: Copy + PartialEq + fmt::Display + 'static {
    /// Entity name used in error messages ("stock adjustment", "sale", ...)
    const ENTITY: &'static str;

    /// States reachable in one step from `self`
    fn successors(&self) -> &'static [Self];

    fn can_transition_to(&self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Move to `next`, or fail naming the attempted `action`
    fn transition(&self, next: Self, action: &str) -> DomainResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invalid_transition(Self::ENTITY, self, action))
        }
    }

    fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}
