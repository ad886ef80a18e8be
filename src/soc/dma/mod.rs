//! DMA (Direct Memory Access) engine subsystem.
//!
//! Two independent channels move streaming data across the PCIe link:
//!
//! - **Writer**: reads a described host-memory region and streams the
//!   words out of its source port.
//! - **Reader**: accepts words on its sink port and writes them into a
//!   described host-memory region.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       DMA Engine                           │
//! │                                                            │
//! │  host mem ─► ┌────────┐  ┌──────┐                          │
//! │              │ writer │─►│ FIFO │─► source ──┐             │
//! │              │ table  │  └──────┘            │ loopback    │
//! │              └────────┘                      │ (optional)  │
//! │  host mem ◄─ ┌────────┐  ┌──────┐            │             │
//! │              │ reader │◄─│ FIFO │◄─ sink  ◄──┘             │
//! │              │ table  │  └──────┘                          │
//! │              └────────┘                                    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each channel owns a descriptor table; a descriptor names a host region
//! and a length, and its completion raises the channel's interrupt line
//! exactly once. The per-channel FIFOs (built with buffering) decouple the
//! PCIe-side burst rate from the stream-side rate; a full FIFO is
//! backpressure, an empty one is starvation, and neither loses data.

pub mod engine;
pub mod table;

pub use engine::{ChannelState, ChannelStats, DmaEngine, DmaIrqs};
pub use table::DescriptorTable;

use std::fmt;

/// Transfer length field of a raw descriptor (bytes).
pub const DESC_LENGTH_MASK: u32 = 0x00FF_FFFF;

/// Raw descriptor flag: suppress the completion interrupt.
pub const DESC_IRQ_DISABLE: u32 = 1 << 24;

/// Raw descriptor flag: ignore early `last` (reader) / suppress `last`
/// on the final word (writer).
pub const DESC_LAST_DISABLE: u32 = 1 << 25;

/// Channel direction, named from the transfer's PCIe-side perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDir {
    /// Reads host memory, streams out
    Writer,
    /// Accepts a stream, writes host memory
    Reader,
}

impl fmt::Display for ChannelDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelDir::Writer => write!(f, "writer"),
            ChannelDir::Reader => write!(f, "reader"),
        }
    }
}

/// One DMA transfer: a host-memory region plus behavior flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaDescriptor {
    /// Host memory base address
    pub address: u64,
    /// Transfer length in bytes (0 completes immediately)
    pub length: u32,
    /// Suppress the completion interrupt for this descriptor
    pub irq_disable: bool,
    /// Writer: do not assert `last` on the final word.
    /// Reader: execute the full length even if `last` arrives early.
    pub last_disable: bool,
}

impl DmaDescriptor {
    /// Create a plain descriptor (interrupting, `last`-terminated).
    pub fn new(address: u64, length: u32) -> Self {
        Self { address, length, irq_disable: false, last_disable: false }
    }

    /// Decode a descriptor from the three table CSR words.
    pub fn from_raw(value0: u32, addr_lo: u32, addr_hi: u32) -> Self {
        Self {
            address: ((addr_hi as u64) << 32) | addr_lo as u64,
            length: value0 & DESC_LENGTH_MASK,
            irq_disable: value0 & DESC_IRQ_DISABLE != 0,
            last_disable: value0 & DESC_LAST_DISABLE != 0,
        }
    }

    /// Suppress this descriptor's completion interrupt.
    pub fn with_irq_disable(mut self) -> Self {
        self.irq_disable = true;
        self
    }

    /// Disable `last` handling for this descriptor.
    pub fn with_last_disable(mut self) -> Self {
        self.last_disable = true;
        self
    }
}

/// DMA error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmaError {
    /// Descriptor table is full
    TableFull(ChannelDir),
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull(dir) => write!(f, "{} descriptor table is full", dir),
        }
    }
}

impl std::error::Error for DmaError {}
