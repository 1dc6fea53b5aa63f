use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::Resource;
use crate::ResourceType;
use crate::SnapshotInvariantViolation;
use crate::VersionAllocator;
use crate::VersionToken;

/// Resources of one type together with the version they were published at.
#[derive(Debug, Clone)]
struct ResourceSet {
    version: VersionToken,
    items: Arc<[Resource]>,
}

/// Immutable, versioned bundle of resources for one node.
///
/// Updating a node means building a new `Snapshot` and installing it with
/// [`SnapshotCache::set_snapshot`](crate::SnapshotCache::set_snapshot); an
/// installed snapshot is never mutated. Resource lists are shared, so cloning
/// a snapshot (or handing out its resources) never copies blobs.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    sets: BTreeMap<ResourceType, ResourceSet>,
}

impl Snapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Creates a snapshot covering all four types with one shared version.
    pub fn new(
        version: impl Into<VersionToken>,
        endpoints: Vec<Resource>,
        clusters: Vec<Resource>,
        routes: Vec<Resource>,
        listeners: Vec<Resource>,
    ) -> Self {
        let version = version.into();
        Self::builder()
            .resources(ResourceType::Endpoint, endpoints)
            .resources(ResourceType::Cluster, clusters)
            .resources(ResourceType::Route, routes)
            .resources(ResourceType::Listener, listeners)
            .version_all(version)
            .build()
    }

    /// Version of `resource_type`, or `None` if the snapshot does not carry
    /// that type.
    pub fn version(
        &self,
        resource_type: ResourceType,
    ) -> Option<&VersionToken> {
        self.sets.get(&resource_type).map(|s| &s.version)
    }

    /// Resources of `resource_type` in insertion order. Empty when the type is
    /// absent.
    pub fn resources(
        &self,
        resource_type: ResourceType,
    ) -> &[Resource] {
        self.sets.get(&resource_type).map(|s| &s.items[..]).unwrap_or(&[])
    }

    pub(crate) fn shared_resources(
        &self,
        resource_type: ResourceType,
    ) -> Arc<[Resource]> {
        self.sets
            .get(&resource_type)
            .map(|s| s.items.clone())
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn contains(
        &self,
        resource_type: ResourceType,
    ) -> bool {
        self.sets.contains_key(&resource_type)
    }

    /// Types carried by this snapshot, in dependency order.
    pub fn resource_types(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.sets.keys().copied()
    }

    /// Checks that every blob sits in the list of its own type, has a name,
    /// and that names are unique per type.
    pub fn validate(&self) -> Result<(), SnapshotInvariantViolation> {
        for (resource_type, set) in &self.sets {
            let mut seen = HashSet::with_capacity(set.items.len());
            for resource in set.items.iter() {
                resource_type.validate(resource)?;
                if !seen.insert(resource.name()) {
                    return Err(SnapshotInvariantViolation::DuplicateResource {
                        resource_type: *resource_type,
                        name: resource.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Assembles a [`Snapshot`], assigning version tokens to types that were not
/// given one explicitly.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    resources: BTreeMap<ResourceType, Vec<Resource>>,
    versions: BTreeMap<ResourceType, VersionToken>,
    version_all: Option<VersionToken>,
}

impl SnapshotBuilder {
    /// Sets the resources of one type, replacing earlier calls for that type.
    pub fn resources(
        mut self,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Self {
        self.resources.insert(resource_type, resources);
        self
    }

    /// Pins the version of one type. A type pinned without a
    /// [`resources`](Self::resources) call is published with no resources.
    pub fn version(
        mut self,
        resource_type: ResourceType,
        version: impl Into<VersionToken>,
    ) -> Self {
        self.versions.insert(resource_type, version.into());
        self
    }

    /// Pins the version of every type that has no explicit version.
    pub fn version_all(
        mut self,
        version: impl Into<VersionToken>,
    ) -> Self {
        self.version_all = Some(version.into());
        self
    }

    /// Builds with fresh tokens for every unpinned type.
    pub fn build(self) -> Snapshot {
        self.build_with(&VersionAllocator::default(), None)
    }

    /// Builds with `allocator`; unpinned types whose resources equal those in
    /// `previous` keep the previous token.
    pub fn build_with(
        self,
        allocator: &VersionAllocator,
        previous: Option<&Snapshot>,
    ) -> Snapshot {
        let SnapshotBuilder {
            mut resources,
            mut versions,
            version_all,
        } = self;
        for resource_type in versions.keys() {
            resources.entry(*resource_type).or_default();
        }

        let sets = resources
            .into_iter()
            .map(|(resource_type, items)| {
                let version = versions
                    .remove(&resource_type)
                    .or_else(|| version_all.clone())
                    .unwrap_or_else(|| allocator.assign(resource_type, &items, previous));
                (
                    resource_type,
                    ResourceSet {
                        version,
                        items: Arc::from(items),
                    },
                )
            })
            .collect();

        Snapshot { sets }
    }
}
