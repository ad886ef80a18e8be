//! CSR address decode.
//!
//! The CSR space is a flat region partitioned into fixed-size blocks, one
//! per functional unit:
//!
//! ```text
//! address = CSR_BASE + block_index * CSR_BLOCK_SIZE + offset
//!
//! block 16: crg       (reset control)
//! block 17: pcie_phy  (link status)
//! block 18: dma       (channel control, descriptor tables, buffering)
//! block 19: msi       (debug send path)
//! ```
//!
//! Decode yields the block and the byte offset within it; which register
//! lives at that offset depends on the build configuration and is resolved
//! by the register map (`csr_map`).

use std::fmt;

use super::constants::{
    CSR_BASE, CSR_BLOCK_CRG, CSR_BLOCK_DMA, CSR_BLOCK_MSI, CSR_BLOCK_PCIE_PHY, CSR_BLOCK_SIZE,
};

/// Functional blocks in the CSR space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsrBlock {
    /// Clock/reset generation (soft reset)
    Crg,
    /// PCIe PHY status
    PciePhy,
    /// DMA control
    Dma,
    /// MSI control (debug send path)
    Msi,
}

impl CsrBlock {
    /// All blocks, in address order.
    pub const ALL: [CsrBlock; 4] = [CsrBlock::Crg, CsrBlock::PciePhy, CsrBlock::Dma, CsrBlock::Msi];

    /// Block index within the CSR space.
    pub fn index(&self) -> u32 {
        match self {
            CsrBlock::Crg => CSR_BLOCK_CRG,
            CsrBlock::PciePhy => CSR_BLOCK_PCIE_PHY,
            CsrBlock::Dma => CSR_BLOCK_DMA,
            CsrBlock::Msi => CSR_BLOCK_MSI,
        }
    }

    /// Base address of this block.
    pub fn base(&self) -> u32 {
        CSR_BASE + self.index() * CSR_BLOCK_SIZE
    }

    /// Block name as it appears in the generated map.
    pub fn name(&self) -> &'static str {
        match self {
            CsrBlock::Crg => "crg",
            CsrBlock::PciePhy => "pcie_phy",
            CsrBlock::Dma => "dma",
            CsrBlock::Msi => "msi",
        }
    }

    /// Find the block containing an index, if any.
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.index() == index)
    }
}

impl fmt::Display for CsrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decoded CSR address: block plus byte offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsrAddress {
    pub block: CsrBlock,
    pub offset: u32,
}

impl CsrAddress {
    /// Decode an absolute bus address.
    ///
    /// Returns `None` when the address falls outside every block; the bus
    /// treats that as a decode miss (read zero, drop write).
    pub fn decode(addr: u32) -> Option<Self> {
        let rel = addr.checked_sub(CSR_BASE)?;
        let index = rel / CSR_BLOCK_SIZE;
        let block = CsrBlock::from_index(index)?;
        Some(Self { block, offset: rel % CSR_BLOCK_SIZE })
    }

    /// Encode a block and offset into an absolute bus address.
    pub fn encode(block: CsrBlock, offset: u32) -> u32 {
        block.base() + offset
    }
}

impl fmt::Display for CsrAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ 0x{:03X}", self.block, self.offset)
    }
}

/// Host-visible access mode of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrAccess {
    /// Read-only status; writes are dropped.
    ReadOnly,
    /// Readable and writable (including write-1-to-trigger pulses).
    ReadWrite,
}

impl CsrAccess {
    /// Mode string used by the generated map.
    pub fn mode(&self) -> &'static str {
        match self {
            CsrAccess::ReadOnly => "ro",
            CsrAccess::ReadWrite => "rw",
        }
    }
}
