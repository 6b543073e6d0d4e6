//! Thin façade over the collective exchanges the ownership protocol needs.
//!
//! The protocol is phrased in terms of a data handle ([`CommDataHandle`])
//! that the transport drives: for every entity on the [`Interface`] with a
//! neighbour, the handle gathers a few items into a [`MessageBuffer`]; on the
//! receiving side the same entity's items are scattered back into the handle.
//!
//! Every operation here is a **blocking collective**: all ranks of the group
//! must call it in the same logical phase, or it never returns. There are no
//! timeouts and no retries; the transport is assumed never to drop or reorder
//! messages inside one collective call.
//!
//! Transports:
//! - [`SerialChannel`]: a single rank, no neighbours.
//! - [`ThreadChannel`]: ranks are threads of one process sharing a [`ThreadWorld`].
//! - `MpiChannel` (feature `mpi-support`): ranks are MPI processes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::algs::wire::{WireCount, WireF64, WireRank};
use crate::dof_error::DofError;
use crate::topology::index_source::MeshEntity;

/// Byte buffer items are gathered into and scattered out of.
#[derive(Clone, Debug, Default)]
pub struct MessageBuffer {
    data: BytesMut,
}

impl MessageBuffer {
    /// Empty buffer for gathering.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer over received bytes, ready for scattering.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
        }
    }

    /// Append one plain-old-data item.
    pub fn write<T: Pod>(&mut self, value: T) {
        self.data.put_slice(bytemuck::bytes_of(&value));
    }

    /// Consume one plain-old-data item from the front.
    pub fn read<T: Pod>(&mut self) -> Result<T, DofError> {
        let needed = std::mem::size_of::<T>();
        if self.data.remaining() < needed {
            return Err(DofError::BufferUnderrun {
                needed,
                remaining: self.data.remaining(),
            });
        }
        let value = bytemuck::pod_read_unaligned(&self.data[..needed]);
        self.data.advance(needed);
        Ok(value)
    }

    /// Append a rank.
    pub fn write_rank(&mut self, rank: usize) {
        self.write(WireRank::new(rank));
    }

    /// Consume a rank.
    pub fn read_rank(&mut self) -> Result<usize, DofError> {
        self.read::<WireRank>().map(|r| r.get())
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    /// Whether every byte has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Freeze the gathered bytes for sending.
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }
}

/// Per-entity gather/scatter callbacks driven by a transport.
pub trait CommDataHandle<E> {
    /// Whether entities of `codim` (in a mesh of dimension `dim`) take part.
    fn contains(&self, dim: usize, codim: usize) -> bool;

    /// Number of items [`gather`](Self::gather) writes for `entity`.
    fn size(&self, entity: &E) -> usize;

    /// Write `size(entity)` items for `entity`.
    fn gather(&self, buffer: &mut MessageBuffer, entity: &E);

    /// Read the `count` items a neighbour gathered for its copy of `entity`.
    fn scatter(&mut self, buffer: &mut MessageBuffer, entity: &E, count: usize)
    -> Result<(), DofError>;
}

/// Group-wide operations that do not involve mesh entities.
pub trait Collective {
    /// Rank of this process in the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Sum `value` over all ranks. Every rank receives the same result.
    fn sum(&self, value: f64) -> f64;
}

/// A collective channel that can run a [`CommDataHandle`] over the shared
/// entities of a mesh.
pub trait CommunicationChannel<E: MeshEntity>: Collective {
    /// Gather on every interface entity, exchange with all neighbours, and
    /// scatter what was received.
    fn exchange<H: CommDataHandle<E>>(&self, handle: &mut H) -> Result<(), DofError>;
}

/// Shared entities per neighbouring rank.
///
/// Both sides of a link must list the shared entities in the same order;
/// the exchange pairs items purely by position.
#[derive(Clone, Debug)]
pub struct Interface<E> {
    dimension: usize,
    links: BTreeMap<usize, Vec<E>>,
}

impl<E> Interface<E> {
    /// Interface with no neighbours for a mesh of dimension `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            links: BTreeMap::new(),
        }
    }

    /// Set the shared entities with `peer`, replacing any previous link.
    pub fn insert_link(&mut self, peer: usize, entities: Vec<E>) {
        self.links.insert(peer, entities);
    }

    /// Mesh dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Neighbouring ranks in ascending order.
    pub fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        self.links.keys().copied()
    }

    /// Shared entities with `peer` (empty if not a neighbour).
    pub fn link(&self, peer: usize) -> &[E] {
        self.links.get(&peer).map_or(&[][..], |v| &v[..])
    }

    /// Whether there are no neighbours.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

fn pack<E, H>(dimension: usize, entities: &[E], handle: &H) -> MessageBuffer
where
    E: MeshEntity,
    H: CommDataHandle<E>,
{
    let mut buffer = MessageBuffer::new();
    for entity in entities {
        if !handle.contains(dimension, entity.codim()) {
            continue;
        }
        buffer.write(WireCount::new(handle.size(entity)));
        handle.gather(&mut buffer, entity);
    }
    buffer
}

fn unpack<E, H>(
    peer: usize,
    dimension: usize,
    entities: &[E],
    handle: &mut H,
    mut buffer: MessageBuffer,
) -> Result<(), DofError>
where
    E: MeshEntity,
    H: CommDataHandle<E>,
{
    let annotate = |e: DofError| DofError::CommError {
        neighbor: peer,
        reason: e.to_string(),
    };
    for entity in entities {
        if !handle.contains(dimension, entity.codim()) {
            continue;
        }
        let count = buffer.read::<WireCount>().map_err(annotate)?.get();
        handle
            .scatter(&mut buffer, entity, count)
            .map_err(annotate)?;
    }
    if !buffer.is_empty() {
        log::warn!(
            "exchange with rank {peer}: {} trailing bytes ignored",
            buffer.remaining()
        );
    }
    Ok(())
}

/// Single-process channel: no neighbours, sums are the identity.
#[derive(Clone, Debug, Default)]
pub struct SerialChannel;

impl Collective for SerialChannel {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn sum(&self, value: f64) -> f64 {
        value
    }
}

impl<E: MeshEntity> CommunicationChannel<E> for SerialChannel {
    fn exchange<H: CommDataHandle<E>>(&self, _handle: &mut H) -> Result<(), DofError> {
        Ok(())
    }
}

// --- Threads-only transport ---
type Key = (usize, usize, u64); // (src, dst, tag)

/// Mailboxes shared by the ranks of a threads-only group.
#[derive(Debug)]
pub struct ThreadWorld {
    size: usize,
    mailbox: DashMap<Key, Bytes>,
    signal: Mutex<()>,
    arrived: Condvar,
}

impl ThreadWorld {
    /// A group of `size` ranks.
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            mailbox: DashMap::new(),
            signal: Mutex::new(()),
            arrived: Condvar::new(),
        })
    }

    /// Number of ranks in the group.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Channel for `rank`, exchanging over `interface`.
    ///
    /// # Panics
    /// Panics if `rank` is not a rank of this group.
    pub fn channel<E>(self: &Arc<Self>, rank: usize, interface: Interface<E>) -> ThreadChannel<E> {
        assert!(rank < self.size, "rank {rank} outside group of {}", self.size);
        ThreadChannel {
            world: Arc::clone(self),
            rank,
            interface,
            next_tag: AtomicU64::new(0),
        }
    }

    fn post(&self, src: usize, dst: usize, tag: u64, bytes: Bytes) {
        let _guard = self.signal.lock();
        let previous = self.mailbox.insert((src, dst, tag), bytes);
        debug_assert!(previous.is_none(), "duplicate message {src}->{dst} tag {tag}");
        self.arrived.notify_all();
    }

    /// Blocks until the message arrives; a peer that never posts blocks forever.
    fn take(&self, src: usize, dst: usize, tag: u64) -> Bytes {
        let key = (src, dst, tag);
        let mut guard = self.signal.lock();
        loop {
            if let Some((_, bytes)) = self.mailbox.remove(&key) {
                return bytes;
            }
            self.arrived.wait(&mut guard);
        }
    }
}

/// One rank's endpoint of a [`ThreadWorld`].
#[derive(Debug)]
pub struct ThreadChannel<E> {
    world: Arc<ThreadWorld>,
    rank: usize,
    interface: Interface<E>,
    next_tag: AtomicU64,
}

impl<E> ThreadChannel<E> {
    /// Collective calls happen in the same order on every rank, so the
    /// per-rank counters agree.
    fn next_tag(&self) -> u64 {
        self.next_tag.fetch_add(1, Ordering::Relaxed)
    }

    /// The interface this channel exchanges over.
    pub fn interface(&self) -> &Interface<E> {
        &self.interface
    }
}

impl<E> Collective for ThreadChannel<E> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.size
    }

    fn sum(&self, value: f64) -> f64 {
        let tag = self.next_tag();
        let mut mine = MessageBuffer::new();
        mine.write(WireF64::new(value));
        let mine = mine.freeze();
        for peer in (0..self.world.size).filter(|&p| p != self.rank) {
            self.world.post(self.rank, peer, tag, mine.clone());
        }
        // Accumulate in rank order so every rank rounds identically.
        let mut total = 0.0;
        for src in 0..self.world.size {
            if src == self.rank {
                total += value;
            } else {
                let bytes = self.world.take(src, self.rank, tag);
                let contribution = MessageBuffer::from_bytes(&bytes)
                    .read::<WireF64>()
                    .map(|w| w.get())
                    .unwrap_or_else(|e| {
                        panic!("malformed sum contribution from rank {src} (tag {tag}): {e}")
                    });
                total += contribution;
            }
        }
        total
    }
}

impl<E: MeshEntity> CommunicationChannel<E> for ThreadChannel<E> {
    fn exchange<H: CommDataHandle<E>>(&self, handle: &mut H) -> Result<(), DofError> {
        let tag = self.next_tag();
        let dimension = self.interface.dimension();
        for peer in self.interface.peers() {
            let buffer = pack(dimension, self.interface.link(peer), handle);
            self.world.post(self.rank, peer, tag, buffer.freeze());
        }
        for peer in self.interface.peers() {
            let bytes = self.world.take(peer, self.rank, tag);
            unpack(
                peer,
                dimension,
                self.interface.link(peer),
                handle,
                MessageBuffer::from_bytes(&bytes),
            )?;
        }
        Ok(())
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::atomic::AtomicI32;

    /// Channel whose ranks are the processes of an MPI communicator.
    pub struct MpiChannel<E> {
        world: SimpleCommunicator,
        interface: Interface<E>,
        next_tag: AtomicI32,
    }

    impl<E> MpiChannel<E> {
        pub fn new(world: SimpleCommunicator, interface: Interface<E>) -> Self {
            Self {
                world,
                interface,
                next_tag: AtomicI32::new(42),
            }
        }

        fn next_tag(&self) -> i32 {
            self.next_tag.fetch_add(1, Ordering::Relaxed)
        }
    }

    impl<E> Collective for MpiChannel<E> {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn sum(&self, value: f64) -> f64 {
            let mut total = 0.0f64;
            self.world
                .all_reduce_into(&value, &mut total, SystemOperation::sum());
            total
        }
    }

    impl<E: MeshEntity> CommunicationChannel<E> for MpiChannel<E> {
        fn exchange<H: CommDataHandle<E>>(&self, handle: &mut H) -> Result<(), DofError> {
            let tag = self.next_tag();
            let dimension = self.interface.dimension();
            let outgoing: Vec<(usize, Bytes)> = self
                .interface
                .peers()
                .map(|peer| (peer, pack(dimension, self.interface.link(peer), handle).freeze()))
                .collect();
            let incoming: Vec<(usize, Vec<u8>)> = mpi::request::scope(|scope| {
                let requests: Vec<_> = outgoing
                    .iter()
                    .map(|(peer, bytes)| {
                        self.world
                            .process_at_rank(*peer as i32)
                            .immediate_send_with_tag(scope, &bytes[..], tag)
                    })
                    .collect();
                let received = outgoing
                    .iter()
                    .map(|(peer, _)| {
                        let (msg, _status) = self
                            .world
                            .process_at_rank(*peer as i32)
                            .receive_vec_with_tag::<u8>(tag);
                        (*peer, msg)
                    })
                    .collect();
                for request in requests {
                    request.wait();
                }
                received
            });
            for (peer, bytes) in incoming {
                unpack(
                    peer,
                    dimension,
                    self.interface.link(peer),
                    handle,
                    MessageBuffer::from_bytes(&bytes),
                )?;
            }
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiChannel;
