//! Reference-counted registry of storage containers.
//!
//! At most one [`SlotStorageContainer`] exists per (mesh, mapper) pair. The
//! first [`attach`](ContainerRegistry::attach) creates it, every attach hands
//! out a distinct [`ContainerHandle`], and the last
//! [`detach`](ContainerRegistry::detach) drops it. The registry is an
//! ordinary value owned by the caller and passed where it is needed.

use hashbrown::{HashMap, HashSet};

use crate::data::mapper::{DofRemap, EntityDofMapper, MapperId};
use crate::data::storage::{ContainerId, SlotStorageContainer};
use crate::dof_error::DofError;
use crate::topology::index_source::MeshId;

/// Identity pair a container is registered under.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerKey {
    /// Mesh identity.
    pub mesh: MeshId,
    /// Mapper identity.
    pub mapper: MapperId,
}

impl std::fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.mesh, self.mapper)
    }
}

/// One attachment to a registered container.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    key: ContainerKey,
    container: ContainerId,
    attachment: u64,
}

impl ContainerHandle {
    /// Key of the container this handle is attached to.
    #[inline]
    pub fn key(&self) -> ContainerKey {
        self.key
    }
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{} on {}", self.container, self.attachment, self.key)
    }
}

#[derive(Debug)]
struct Entry<V> {
    container: SlotStorageContainer<V>,
    attachments: HashSet<u64>,
}

/// Get-or-create, last-release-destroys registry of storage containers.
#[derive(Debug)]
pub struct ContainerRegistry<V = f64> {
    entries: HashMap<ContainerKey, Entry<V>>,
    next_attachment: u64,
}

impl<V> Default for ContainerRegistry<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_attachment: 0,
        }
    }
}

impl<V: Clone + Default> ContainerRegistry<V> {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live containers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no container is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attach to the container of `(mesh, mapper)`, creating it if absent.
    ///
    /// A freshly created container holds no slots and is sized for the
    /// mapper's current DOF count.
    pub fn attach(&mut self, mesh: MeshId, mapper: &EntityDofMapper) -> ContainerHandle {
        debug_assert_eq!(mesh, mapper.mesh_id(), "{} attached under a foreign mesh", mapper.id());
        let key = ContainerKey {
            mesh,
            mapper: mapper.id(),
        };
        let entry = self.entries.entry(key).or_insert_with(|| {
            let container = SlotStorageContainer::new(mapper);
            log::debug!(
                "created {} for {key} with {} dofs per slot",
                container.id(),
                container.region_len()
            );
            Entry {
                container,
                attachments: HashSet::new(),
            }
        });
        let attachment = self.next_attachment;
        self.next_attachment += 1;
        entry.attachments.insert(attachment);
        log::debug!("attach {key}: {} references", entry.attachments.len());
        ContainerHandle {
            key,
            container: entry.container.id(),
            attachment,
        }
    }

    fn entry_of(&self, handle: &ContainerHandle) -> Result<&Entry<V>, DofError> {
        match self.entries.get(&handle.key) {
            Some(e)
                if e.container.id() == handle.container
                    && e.attachments.contains(&handle.attachment) =>
            {
                Ok(e)
            }
            _ => Err(DofError::UnknownHandle(handle.to_string())),
        }
    }

    /// Release one attachment; the container is dropped with the last one.
    ///
    /// # Errors
    /// Returns `Err(UnknownHandle)` for a handle that is not attached,
    /// including one that was already detached.
    pub fn detach(&mut self, handle: ContainerHandle) -> Result<(), DofError> {
        self.entry_of(&handle)?;
        let Some(entry) = self.entries.get_mut(&handle.key) else {
            return Err(DofError::UnknownHandle(handle.to_string()));
        };
        entry.attachments.remove(&handle.attachment);
        let remaining = entry.attachments.len();
        log::debug!("detach {}: {remaining} references", handle.key);
        if remaining == 0 {
            self.entries.remove(&handle.key);
            log::debug!("dropped {} for {}", handle.container, handle.key);
        }
        Ok(())
    }

    /// Number of attachments to the container of `key` (0 if absent).
    pub fn ref_count(&self, key: &ContainerKey) -> usize {
        self.entries.get(key).map_or(0, |e| e.attachments.len())
    }

    /// The container `handle` is attached to.
    pub fn container(&self, handle: &ContainerHandle) -> Result<&SlotStorageContainer<V>, DofError> {
        Ok(&self.entry_of(handle)?.container)
    }

    /// The container `handle` is attached to, mutably.
    pub fn container_mut(
        &mut self,
        handle: &ContainerHandle,
    ) -> Result<&mut SlotStorageContainer<V>, DofError> {
        self.entry_of(handle)?;
        self.entries
            .get_mut(&handle.key)
            .map(|e| &mut e.container)
            .ok_or_else(|| DofError::UnknownHandle(handle.to_string()))
    }

    /// Replay `remap` into every container registered for `mapper`.
    ///
    /// Returns the number of containers updated.
    pub fn apply_remap(&mut self, mapper: MapperId, remap: &DofRemap) -> Result<usize, DofError> {
        if remap.mapper() != mapper {
            return Err(DofError::MapperMismatch {
                expected: mapper.to_string(),
                found: remap.mapper().to_string(),
            });
        }
        let mut updated = 0;
        for (key, entry) in self.entries.iter_mut().filter(|(k, _)| k.mapper == mapper) {
            if entry.container.live_slots() == 0 {
                log::warn!("remap applied to {key}, which holds no live slots");
            }
            entry.container.apply_remap(remap)?;
            updated += 1;
        }
        Ok(updated)
    }
}
