use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Scope represents a bitmask of capabilities granted to an agent credential.
/// On the wire it reads and writes as a list of scope strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scope(u32);

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_strings().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let strs = Vec::<String>::deserialize(deserializer)?;
        Scope::parse_many(&strs).ok_or_else(|| D::Error::custom("unknown scope in list"))
    }
}

impl Scope {
    pub const DOCUMENTS_READ: Scope = Scope(1 << 0); // 1
    pub const DOCUMENTS_WRITE: Scope = Scope(1 << 1); // 2
    pub const VERSIONS_READ: Scope = Scope(1 << 2); // 4
    pub const SEARCH_READ: Scope = Scope(1 << 3); // 8
    pub const AUDIT_READ: Scope = Scope(1 << 4); // 16

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if this scope bitmask contains the required scope.
    #[must_use]
    pub const fn has(self, required: Scope) -> bool {
        self.0 & required.0 == required.0
    }

    /// Combines two scope bitmasks.
    #[must_use]
    pub const fn union(self, other: Scope) -> Scope {
        Scope(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Converts a scope string to its bitmask value.
    pub fn parse(s: &str) -> Option<Scope> {
        match s {
            "documents:read" => Some(Self::DOCUMENTS_READ),
            "documents:write" => Some(Self::DOCUMENTS_WRITE),
            "versions:read" => Some(Self::VERSIONS_READ),
            "search:read" => Some(Self::SEARCH_READ),
            "audit:read" => Some(Self::AUDIT_READ),
            _ => None,
        }
    }

    /// Converts a slice of scope strings to a combined bitmask.
    pub fn parse_many<S: AsRef<str>>(strs: &[S]) -> Option<Scope> {
        let mut result = Scope::default();
        for s in strs {
            result = result.union(Self::parse(s.as_ref())?);
        }
        Some(result)
    }

    /// Returns a slice of scope strings for this bitmask.
    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        let mut scopes = Vec::new();
        if self.has(Self::DOCUMENTS_READ) {
            scopes.push("documents:read");
        }
        if self.has(Self::DOCUMENTS_WRITE) {
            scopes.push("documents:write");
        }
        if self.has(Self::VERSIONS_READ) {
            scopes.push("versions:read");
        }
        if self.has(Self::SEARCH_READ) {
            scopes.push("search:read");
        }
        if self.has(Self::AUDIT_READ) {
            scopes.push("audit:read");
        }
        scopes
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(", "))
    }
}

impl From<u32> for Scope {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<Scope> for u32 {
    fn from(s: Scope) -> Self {
        s.0
    }
}

impl From<i64> for Scope {
    fn from(bits: i64) -> Self {
        Self(bits as u32)
    }
}

impl From<Scope> for i64 {
    fn from(s: Scope) -> Self {
        s.0 as i64
    }
}
