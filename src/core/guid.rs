//! Node identity and path hashing.
//!
//! Every node carries two identifiers. The *structural* GUID is assigned when
//! the node is authored and is only unique inside the template that defines
//! it. The *path* GUID is derived once an instance graph has been assembled:
//! it hashes the chain of structural GUIDs from the root down to the node, so
//! the same structural position always produces the same identity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A 128-bit node identifier.
///
/// The nil GUID is used as the owner of root state machines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeGuid(Uuid);

impl NodeGuid {
    /// The nil GUID.
    pub const NIL: NodeGuid = NodeGuid(Uuid::nil());

    /// Generate a fresh random structural GUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// A GUID is valid when it is not nil.
    pub fn is_valid(&self) -> bool {
        !self.0.is_nil()
    }

    /// Hash an unhashed path string into a GUID.
    ///
    /// Uses the MD5 name-based UUID so the result is stable across runs and
    /// platforms.
    ///
    /// # Example
    ///
    /// ```rust
    /// use statewright::core::NodeGuid;
    ///
    /// let a = NodeGuid::from_path("root/child");
    /// let b = NodeGuid::from_path("root/child");
    /// assert_eq!(a, b);
    /// assert_ne!(a, NodeGuid::from_path("root/child_1"));
    /// ```
    pub fn from_path(path: &str) -> Self {
        Self(Uuid::new_v3(&Uuid::NAMESPACE_OID, path.as_bytes()))
    }
}

impl fmt::Display for NodeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for NodeGuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for NodeGuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Join an ordered root-to-node chain of structural GUIDs into a path string.
pub fn guid_path<'a, I>(chain: I) -> String
where
    I: IntoIterator<Item = &'a NodeGuid>,
{
    chain
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// Tracks how often each path string has been produced during one assembly.
///
/// Duplicate paths only appear when inherited graphs are merged. The second
/// occurrence of a path gets `_1` appended before hashing, the third `_2` and
/// so on, so duplicates are disambiguated in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct PathRegistry {
    occurrences: HashMap<String, usize>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the (possibly suffixed) path string for a chain and record it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use statewright::core::{NodeGuid, PathRegistry};
    ///
    /// let root = NodeGuid::new();
    /// let node = NodeGuid::new();
    /// let mut paths = PathRegistry::new();
    ///
    /// let first = paths.build_path([&root, &node]);
    /// let second = paths.build_path([&root, &node]);
    ///
    /// assert_eq!(first, format!("{}/{}", root, node));
    /// assert_eq!(second, format!("{}/{}_1", root, node));
    /// ```
    pub fn build_path<'a, I>(&mut self, chain: I) -> String
    where
        I: IntoIterator<Item = &'a NodeGuid>,
    {
        let mut path = guid_path(chain);
        let seen = self.occurrences.entry(path.clone()).or_insert(0);
        *seen += 1;
        if *seen > 1 {
            path.push_str(&format!("_{}", *seen - 1));
        }
        path
    }

    /// Compute the path GUID for a chain, recording the occurrence.
    pub fn path_guid<'a, I>(&mut self, chain: I) -> NodeGuid
    where
        I: IntoIterator<Item = &'a NodeGuid>,
    {
        NodeGuid::from_path(&self.build_path(chain))
    }

    /// Number of times an unsuffixed path has been seen.
    pub fn occurrences(&self, path: &str) -> usize {
        self.occurrences.get(path).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.occurrences.clear();
    }
}
