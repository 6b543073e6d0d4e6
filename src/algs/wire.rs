//! Fixed, little-endian wire records for the collective exchanges.

use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

/// A count of following records.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A process rank.
/// NOTE: ranks are u32 (never usize) on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireRank {
    pub rank_le: u32,
}

impl WireRank {
    pub fn new(rank: usize) -> Self {
        Self {
            rank_le: (rank as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.rank_le) as usize
    }
}

/// An `f64` carried by its little-endian bit pattern.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireF64 {
    pub bits_le: u64,
}

impl WireF64 {
    pub fn new(v: f64) -> Self {
        Self {
            bits_le: v.to_bits().to_le(),
        }
    }
    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }
}

const _: () = {
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireRank>() == 4);
    assert!(size_of::<WireF64>() == 8);
};
