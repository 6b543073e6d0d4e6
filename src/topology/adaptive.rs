//! In-memory adaptive index set with explicit two-phase compaction.
//!
//! Entities are keyed by a caller-chosen persistent key `K`. New entities are
//! appended to the end of their codimension's index range; removed entities
//! leave vacant indices ("holes") until [`AdaptiveIndexSet::compress`]
//! renumbers the survivors densely.
//!
//! # Phases
//!
//! ```text
//!  Stable ──insert/remove──▶ Stable (dirty) ──compress──▶ Compacted
//!    ▲                                                      │
//!    └──────────────────── finish_compaction ◀──────────────┘
//! ```
//!
//! While `Compacted`, the `(old, new)` pairs of every relocated index are
//! readable through [`EntityIndexSource::old_index`]/`new_index`. Dependents
//! (mappers, storage containers) drain that information before
//! `finish_compaction` discards it; mutation is refused until then.

use std::fmt::Debug;
use std::hash::Hash;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofError;

/// How compression closes the holes left by removed entities.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompactionPolicy {
    /// Survivors shift down; relative order is preserved. Every shifted
    /// entity is reported as a hole.
    #[default]
    OrderPreserving,
    /// Survivors beyond the new size are moved into vacant low indices;
    /// only those moves are reported.
    FillFromTail,
}

/// Adaptation phase of an [`AdaptiveIndexSet`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdaptPhase {
    /// Indices are stable; entities may be inserted and removed.
    Stable,
    /// A compression happened; hole pairs are readable, mutation is refused.
    Compacted,
}

impl AdaptPhase {
    fn name(self) -> &'static str {
        match self {
            AdaptPhase::Stable => "Stable",
            AdaptPhase::Compacted => "Compacted",
        }
    }
}

#[derive(Clone, Debug)]
struct CodimTable<K> {
    /// Index → key; `None` marks a hole.
    slots: Vec<Option<K>>,
    index_of: HashMap<K, usize>,
    /// `(old, new)` pairs from the last compression, ascending in `new`.
    holes: Vec<(usize, usize)>,
    vacant: usize,
}

impl<K> Default for CodimTable<K> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index_of: HashMap::new(),
            holes: Vec::new(),
            vacant: 0,
        }
    }
}

impl<K: Copy + Eq + Hash> CodimTable<K> {
    fn compress(&mut self, policy: CompactionPolicy) {
        self.holes.clear();
        match policy {
            CompactionPolicy::OrderPreserving => {
                let mut next = 0usize;
                let mut dense = Vec::with_capacity(self.slots.len() - self.vacant);
                for (old, slot) in self.slots.iter().enumerate() {
                    if let Some(key) = *slot {
                        if old != next {
                            self.holes.push((old, next));
                            self.index_of.insert(key, next);
                        }
                        dense.push(Some(key));
                        next += 1;
                    }
                }
                self.slots = dense;
            }
            CompactionPolicy::FillFromTail => {
                let live = self.slots.len() - self.vacant;
                let free: Vec<usize> = (0..live).filter(|&i| self.slots[i].is_none()).collect();
                let movers: Vec<usize> = (live..self.slots.len())
                    .filter(|&i| self.slots[i].is_some())
                    .collect();
                debug_assert_eq!(free.len(), movers.len());
                for (&new, &old) in free.iter().zip(&movers) {
                    if let Some(key) = self.slots[old].take() {
                        self.slots[new] = Some(key);
                        self.index_of.insert(key, new);
                        self.holes.push((old, new));
                    }
                }
                self.slots.truncate(live);
            }
        }
        self.vacant = 0;
    }
}

/// Dense per-codimension index set over persistent entity keys.
#[derive(Clone, Debug)]
pub struct AdaptiveIndexSet<K> {
    tables: Vec<CodimTable<K>>,
    policy: CompactionPolicy,
    phase: AdaptPhase,
    sequence: u64,
    dirty: bool,
}

impl<K: Copy + Eq + Hash + Debug> AdaptiveIndexSet<K> {
    /// Empty index set for a mesh of dimension `dimension`.
    pub fn new(dimension: usize, policy: CompactionPolicy) -> Self {
        Self {
            tables: (0..=dimension).map(|_| CodimTable::default()).collect(),
            policy,
            phase: AdaptPhase::Stable,
            sequence: 0,
            dirty: false,
        }
    }

    /// Mesh dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.tables.len() - 1
    }

    /// Compaction policy fixed at construction.
    #[inline]
    pub fn policy(&self) -> CompactionPolicy {
        self.policy
    }

    /// Current adaptation phase.
    #[inline]
    pub fn phase(&self) -> AdaptPhase {
        self.phase
    }

    /// Adaptation generation; bumped by every compression that changed indices.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn table_mut(&mut self, codim: usize, operation: &'static str) -> Result<&mut CodimTable<K>, DofError> {
        if self.phase != AdaptPhase::Stable {
            return Err(DofError::AdaptationPhase {
                phase: self.phase.name(),
                operation,
            });
        }
        let dimension = self.dimension();
        self.tables
            .get_mut(codim)
            .ok_or(DofError::CodimOutOfRange { codim, dimension })
    }

    /// Register a new entity; it receives the next index past the current end.
    pub fn insert(&mut self, codim: usize, key: K) -> Result<usize, DofError> {
        let table = self.table_mut(codim, "insert")?;
        if table.index_of.contains_key(&key) {
            return Err(DofError::DuplicateEntity {
                codim,
                key: format!("{key:?}"),
            });
        }
        let index = table.slots.len();
        table.slots.push(Some(key));
        table.index_of.insert(key, index);
        self.dirty = true;
        Ok(index)
    }

    /// Unregister an entity, leaving a hole at its index. Returns that index.
    pub fn remove(&mut self, codim: usize, key: K) -> Result<usize, DofError> {
        let table = self.table_mut(codim, "remove")?;
        let index = table.index_of.remove(&key).ok_or_else(|| DofError::UnknownEntity {
            codim,
            key: format!("{key:?}"),
        })?;
        table.slots[index] = None;
        table.vacant += 1;
        self.dirty = true;
        Ok(index)
    }

    /// Current index of `key`, if registered.
    #[inline]
    pub fn index(&self, codim: usize, key: &K) -> Option<usize> {
        self.tables.get(codim)?.index_of.get(key).copied()
    }

    /// Whether `key` is registered in `codim`.
    #[inline]
    pub fn contains(&self, codim: usize, key: &K) -> bool {
        self.index(codim, key).is_some()
    }

    /// Live keys of `codim` in index order.
    pub fn keys(&self, codim: usize) -> impl Iterator<Item = K> + '_ {
        self.tables
            .get(codim)
            .into_iter()
            .flat_map(|t| t.slots.iter().flatten().copied())
    }

    /// Size of the index range of `codim`, holes included.
    #[inline]
    pub fn size(&self, codim: usize) -> usize {
        self.tables.get(codim).map_or(0, |t| t.slots.len())
    }

    /// Whether removals left holes that compression has not closed.
    pub fn needs_compress(&self) -> bool {
        self.tables.iter().any(|t| t.vacant > 0)
    }

    /// Close all holes and record the relocated indices.
    ///
    /// Returns `Ok(false)` without changing the generation when nothing was
    /// inserted or removed since the last compression.
    pub fn compress(&mut self) -> Result<bool, DofError> {
        if self.phase != AdaptPhase::Stable {
            return Err(DofError::AdaptationPhase {
                phase: self.phase.name(),
                operation: "compress",
            });
        }
        if !self.dirty {
            return Ok(false);
        }
        let policy = self.policy;
        for table in &mut self.tables {
            table.compress(policy);
        }
        self.sequence += 1;
        self.dirty = false;
        self.phase = AdaptPhase::Compacted;
        log::debug!(
            "index set compressed to sequence {} ({:?}): sizes {:?}, holes {:?}",
            self.sequence,
            policy,
            self.tables.iter().map(|t| t.slots.len()).collect::<Vec<_>>(),
            self.tables.iter().map(|t| t.holes.len()).collect::<Vec<_>>(),
        );
        crate::debug_invariants!(self.validate_invariants(), "AdaptiveIndexSet::compress");
        Ok(true)
    }

    /// Discard hole information and return to the `Stable` phase.
    ///
    /// Every mapper and container depending on this index set must have
    /// consumed the holes before this is called.
    pub fn finish_compaction(&mut self) {
        for table in &mut self.tables {
            table.holes.clear();
        }
        self.phase = AdaptPhase::Stable;
    }

    /// Number of hole pairs recorded for `codim`.
    #[inline]
    pub fn number_of_holes(&self, codim: usize) -> usize {
        self.tables.get(codim).map_or(0, |t| t.holes.len())
    }

    /// `(old, new)` pair of hole `hole` in `codim`.
    ///
    /// # Panics
    /// Panics if `hole >= number_of_holes(codim)`.
    pub fn hole(&self, hole: usize, codim: usize) -> (usize, usize) {
        self.tables[codim].holes[hole]
    }
}

impl<K: Copy + Eq + Hash + Debug> DebugInvariants for AdaptiveIndexSet<K> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "AdaptiveIndexSet");
    }

    fn validate_invariants(&self) -> Result<(), DofError> {
        for (codim, table) in self.tables.iter().enumerate() {
            let vacant = table.slots.iter().filter(|s| s.is_none()).count();
            if vacant != table.vacant || table.index_of.len() + vacant != table.slots.len() {
                return Err(DofError::InvalidLayout(format!(
                    "codim {codim}: {} keys, {} slots, {vacant} vacant (tracked {})",
                    table.index_of.len(),
                    table.slots.len(),
                    table.vacant
                )));
            }
            for (key, &idx) in &table.index_of {
                if table.slots.get(idx).copied().flatten() != Some(*key) {
                    return Err(DofError::UnknownEntity {
                        codim,
                        key: format!("{key:?}"),
                    });
                }
            }
        }
        Ok(())
    }
}
