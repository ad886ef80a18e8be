//! Fixed hardware parameters of the modeled SoC.
//!
//! Everything here is resolved at build time of the hardware; host software
//! learns these values from the generated register map, never by probing.

/// Cycles between a soft-reset request and the reset pulse.
///
/// 1 us at 125 MHz. Long enough for an in-flight bus-bridge transaction
/// initiated over PCIe to retire before the operating domain resets.
pub const SOFT_RESET_DELAY_CYCLES: u32 = 125;

/// Stages in the reset synchronizer (async assert, sync release).
pub const RESET_SYNC_STAGES: usize = 2;

/// Base of the CSR address space.
pub const CSR_BASE: u32 = 0x0000_0000;

/// Bytes occupied by one CSR block.
pub const CSR_BLOCK_SIZE: u32 = 0x800;

/// CSR data width in bits.
pub const CSR_DATA_WIDTH_BITS: usize = 32;

/// Block indices in the CSR space (block base = `CSR_BASE + index * CSR_BLOCK_SIZE`).
pub const CSR_BLOCK_CRG: u32 = 16;
pub const CSR_BLOCK_PCIE_PHY: u32 = 17;
pub const CSR_BLOCK_DMA: u32 = 18;
pub const CSR_BLOCK_MSI: u32 = 19;

/// Descriptor table depth per DMA channel.
pub const DESCRIPTOR_TABLE_DEPTH: usize = 64;

/// Elastic buffer depth per DMA channel, in 32-bit words.
///
/// Only present when the SoC is built with buffering; without it each
/// channel has a single-word register slice on its stream port.
pub const DMA_FIFO_DEPTH_WORDS: usize = 32;

/// Words a DMA channel moves per cycle at most.
pub const DMA_WORDS_PER_CYCLE: usize = 1;

/// DMA data width in bits.
pub const DMA_DATA_WIDTH_BITS: usize = 32;

/// DMA data width in bytes.
pub const DMA_DATA_WIDTH_BYTES: usize = DMA_DATA_WIDTH_BITS / 8;

/// Cycles one MSI transaction occupies the outgoing path.
///
/// The endpoint itself is out of scope; this constant is what makes the
/// single-message-in-flight rule observable.
pub const MSI_TX_CYCLES: u32 = 4;

/// Interrupt vector of the DMA writer completion source.
pub const IRQ_DMA_WRITER: u8 = 0;

/// Interrupt vector of the DMA reader completion source.
pub const IRQ_DMA_READER: u8 = 1;

/// Interrupt sources and their vectors, sorted by name.
///
/// The vectors are fixed; the name ordering fixes iteration and artifact
/// emission so the generated map is identical across rebuilds.
pub const INTERRUPT_MAP: &[(&str, u8)] =
    &[("dma_reader", IRQ_DMA_READER), ("dma_writer", IRQ_DMA_WRITER)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_map_sorted_by_name() {
        for pair in INTERRUPT_MAP.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn test_interrupt_vectors_unique() {
        for (i, (_, a)) in INTERRUPT_MAP.iter().enumerate() {
            for (_, b) in &INTERRUPT_MAP[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_csr_blocks_distinct() {
        let blocks = [CSR_BLOCK_CRG, CSR_BLOCK_PCIE_PHY, CSR_BLOCK_DMA, CSR_BLOCK_MSI];
        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
