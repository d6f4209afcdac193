use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Fresh store-style id (UUIDv7, so ids sort by creation time).
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(StyleId);
string_id!(VariantId);
string_id!(UserId);

/// The store's literal `createdBy` marker for built-in styles.
pub const SYSTEM_CREATOR: &str = "system";

/// Who created a style or variant. Serialized as the store's plain string
/// (`"system"` or the owning user id).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CreatedBy {
    System,
    User(UserId),
}

impl CreatedBy {
    pub fn parse(value: &str) -> Self {
        if value == SYSTEM_CREATOR {
            Self::System
        } else {
            Self::User(UserId::new(value))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::System => SYSTEM_CREATOR,
            Self::User(user_id) => user_id.as_str(),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    pub fn is_user(&self, user_id: &UserId) -> bool {
        matches!(self, Self::User(owner) if owner == user_id)
    }
}

impl From<String> for CreatedBy {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<CreatedBy> for String {
    fn from(value: CreatedBy) -> Self {
        value.as_str().to_string()
    }
}

impl From<&UserId> for CreatedBy {
    fn from(user_id: &UserId) -> Self {
        Self::User(user_id.clone())
    }
}

impl fmt::Debug for CreatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CreatedBy({})", self.as_str())
    }
}

impl fmt::Display for CreatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_by_parses_system_marker() {
        assert_eq!(CreatedBy::parse("system"), CreatedBy::System);
        assert_eq!(
            CreatedBy::parse("u-42"),
            CreatedBy::User(UserId::new("u-42"))
        );
        assert_eq!(String::from(CreatedBy::System), "system");
    }

    #[test]
    fn created_by_serializes_as_plain_string() {
        let bytes = rmp_serde::to_vec(&CreatedBy::User(UserId::new("alice"))).unwrap();
        let as_string: String = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(as_string, "alice");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = StyleId::generate();
        let b = StyleId::generate();
        assert_ne!(a, b);
    }
}
