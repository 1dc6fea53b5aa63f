use std::fmt;
use std::sync::Arc;

use nanoid::nanoid;

use crate::constants::VERSION_TOKEN_LEN;
use crate::Resource;
use crate::ResourceType;
use crate::Snapshot;

/// Opaque identifier of one state of a resource type within a node's
/// snapshot.
///
/// Tokens are only ever compared for equality. There is deliberately no
/// ordering: tokens produced by different allocators (or different processes)
/// must not be assumed to be monotonic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(Arc<str>);

impl VersionToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionToken {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for VersionToken {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// Produces version tokens for snapshot construction.
///
/// A type whose resources are identical to the previous snapshot keeps its
/// previous token, so that installing the new snapshot does not wake watches
/// for that type. Any change yields a freshly generated random token.
#[derive(Debug, Clone, Default)]
pub struct VersionAllocator {
    prefix: Option<String>,
}

impl VersionAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens carry `prefix` followed by a dash, which makes tokens of
    /// different producers easy to tell apart in logs.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Generates a token that has not been handed out before.
    pub fn allocate(&self) -> VersionToken {
        let id = nanoid!(VERSION_TOKEN_LEN);
        match &self.prefix {
            Some(prefix) => VersionToken::from(format!("{prefix}-{id}")),
            None => VersionToken::from(id),
        }
    }

    /// Picks the token for `resources` of `resource_type`, reusing the
    /// previous snapshot's token when the contents did not change.
    pub fn assign(
        &self,
        resource_type: ResourceType,
        resources: &[Resource],
        previous: Option<&Snapshot>,
    ) -> VersionToken {
        if let Some(prev) = previous {
            if let Some(version) = prev.version(resource_type) {
                if prev.resources(resource_type) == resources {
                    return version.clone();
                }
            }
        }
        self.allocate()
    }
}
