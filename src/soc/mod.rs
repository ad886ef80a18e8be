//! Device model of the PCIe DMA bridge SoC.
//!
//! This module provides:
//! - Clock/reset domain bridging with delayed soft reset (`crg`)
//! - Multi-master bus arbitration and CSR address decode (`bus`, `csr`)
//! - The two-channel DMA engine with buffering and loopback (`dma`)
//! - Interrupt aggregation and MSI dispatch (`msi`)
//! - The static register map and its generated artifacts (`csr_map`)
//!
//! # Architecture Overview
//!
//! ```text
//!  PCIe link ──► PHY/endpoint (external)
//!                 │        ▲
//!      bridged    │        │ MSI messages
//!      master     ▼        │
//!            ┌─────────┐  ┌─────┐
//!            │ arbiter │  │ msi │◄── dma_writer / dma_reader irqs
//!            └────┬────┘  └─────┘
//!  uart ─────────►│
//!  master         ▼ CSR bus
//!        ┌────┬─────────┬──────┬─────┐
//!        │crg │pcie_phy │ dma  │ msi │
//!        └────┴─────────┴──┬───┴─────┘
//!                          │
//!        host memory ◄──── ┴ ──► stream ports / loopback
//! ```
//!
//! # Example
//!
//! ```
//! use pcie_dma_emu::config::SocConfig;
//! use pcie_dma_emu::soc::csr_map::Reg;
//! use pcie_dma_emu::soc::PcieDmaSoc;
//!
//! let mut soc = PcieDmaSoc::new(SocConfig::default());
//!
//! // Host software reads the PHY status through the bridged bus master
//! let status_addr = soc.csr_map().addr_of(Reg::PhyLinkStatus).unwrap();
//! let status = soc.csr_read(status_addr).unwrap();
//! assert_eq!(status & 1, 1); // link up
//! ```

pub mod bus;
pub mod constants;
pub mod crg;
pub mod csr;
pub mod csr_map;
pub mod dma;
pub mod host_memory;
pub mod msi;
pub mod phy;
pub mod stream;
pub mod top;

pub use bus::{BusArbiter, BusError, BusMaster, BusRequest, BusResponse};
pub use crg::{Crg, ResetSynchronizer, SoftResetPhase};
pub use csr::{CsrAccess, CsrAddress, CsrBlock};
pub use csr_map::{CsrMap, CsrMapEntry, Reg};
pub use dma::{
    ChannelDir, ChannelState, ChannelStats, DescriptorTable, DmaDescriptor, DmaEngine, DmaError,
    DmaIrqs,
};
pub use host_memory::{HostMemory, HostMemoryError, MemoryRegion};
pub use msi::{MsiDispatcher, MsiMessage, MsiSource};
pub use phy::PciePhy;
pub use stream::{StreamFifo, StreamWord};
pub use top::PcieDmaSoc;
