//! Enumerations shared between the client and the remote service.
//!
//! Severity and status travel as small integers on the wire; roles travel
//! as their names.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a wire value does not map to a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value: {value}")]
pub struct InvalidEnumValue {
    /// Name of the enumeration being parsed.
    pub kind: &'static str,
    /// Offending value.
    pub value: String,
}

/// How badly a bug affects its reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Severity {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl TryFrom<u8> for Severity {
    type Error = InvalidEnumValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(InvalidEnumValue {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity as Self
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Severity {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "low" => Ok(Self::Low),
            "2" | "medium" => Ok(Self::Medium),
            "3" | "high" => Ok(Self::High),
            _ => Err(InvalidEnumValue {
                kind: "severity",
                value: s.to_owned(),
            }),
        }
    }
}

/// Lifecycle state of a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BugStatus {
    Open = 1,
    InProgress = 2,
    Resolved = 3,
    Closed = 4,
}

impl BugStatus {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }
}

impl TryFrom<u8> for BugStatus {
    type Error = InvalidEnumValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Open),
            2 => Ok(Self::InProgress),
            3 => Ok(Self::Resolved),
            4 => Ok(Self::Closed),
            other => Err(InvalidEnumValue {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl From<BugStatus> for u8 {
    fn from(status: BugStatus) -> Self {
        status as Self
    }
}

impl fmt::Display for BugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for BugStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "1" | "open" => Ok(Self::Open),
            "2" | "inprogress" => Ok(Self::InProgress),
            "3" | "resolved" => Ok(Self::Resolved),
            "4" | "closed" => Ok(Self::Closed),
            _ => Err(InvalidEnumValue {
                kind: "status",
                value: s.to_owned(),
            }),
        }
    }
}

/// Account role as reported by the remote service.
///
/// Roles the client does not know about are preserved verbatim so a
/// persisted user survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Reports bugs and tracks their own reports.
    User,
    /// Picks up, works on and resolves bugs.
    Developer,
    /// Any other role name.
    Other(String),
}

impl Role {
    /// Role name as used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "User",
            Self::Developer => "Developer",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        match name.as_str() {
            "User" => Self::User,
            "Developer" => Self::Developer,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::from(name.to_owned())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
