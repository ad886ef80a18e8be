//! Static register/interrupt map and artifact generation.
//!
//! The map is built once from the resolved build configuration and is the
//! single source of truth for both sides of the contract: the model
//! dispatches CSR accesses through it, and host software consumes it as a
//! generated artifact (`csr.csv` plus a C header). Registers of features
//! that are not built do not exist, and later registers shift down, so the
//! artifact must be regenerated whenever the configuration changes.
//!
//! Emission is deterministic: blocks in index order, registers in address
//! order, interrupts sorted by name, constants in a fixed order. The same
//! configuration always yields byte-identical artifacts.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::constants::{
    CSR_BASE, CSR_BLOCK_SIZE, DESCRIPTOR_TABLE_DEPTH, DMA_FIFO_DEPTH_WORDS, INTERRUPT_MAP,
    SOFT_RESET_DELAY_CYCLES,
};
use super::csr::{CsrAccess, CsrBlock};
use crate::config::SocConfig;

/// Every register the SoC can expose, across all configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    // crg
    CrgSoftRst,
    // pcie_phy
    PhyLinkStatus,
    // dma writer
    DmaWriterEnable,
    DmaWriterTableValue0,
    DmaWriterTableValue1,
    DmaWriterTableWe,
    DmaWriterTableLoopProgN,
    DmaWriterTableLoopStatus,
    DmaWriterTableLevel,
    DmaWriterTableReset,
    // dma reader
    DmaReaderEnable,
    DmaReaderTableValue0,
    DmaReaderTableValue1,
    DmaReaderTableWe,
    DmaReaderTableLoopProgN,
    DmaReaderTableLoopStatus,
    DmaReaderTableLevel,
    DmaReaderTableReset,
    // dma loopback (with_dma_loopback)
    DmaLoopbackEnable,
    // dma buffering (with_dma_buffering)
    DmaBufferingWriterFifoControl,
    DmaBufferingWriterFifoStatus,
    DmaBufferingReaderFifoControl,
    DmaBufferingReaderFifoStatus,
    // msi
    MsiData,
    MsiSend,
    MsiDone,
}

/// Register metadata before address assignment.
#[derive(Debug, Clone, Copy)]
struct RegisterDef {
    reg: Reg,
    /// Name within the block; the emitted name is `<block>_<name>`
    name: &'static str,
    access: CsrAccess,
}

const fn rw(reg: Reg, name: &'static str) -> RegisterDef {
    RegisterDef { reg, name, access: CsrAccess::ReadWrite }
}

const fn ro(reg: Reg, name: &'static str) -> RegisterDef {
    RegisterDef { reg, name, access: CsrAccess::ReadOnly }
}

/// One mapped register.
#[derive(Debug, Clone, Copy)]
pub struct CsrMapEntry {
    pub addr: u32,
    pub block: CsrBlock,
    pub reg: Reg,
    /// Name within the block
    pub name: &'static str,
    pub access: CsrAccess,
}

impl CsrMapEntry {
    /// Full register name as emitted (`<block>_<name>`).
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.block.name(), self.name)
    }
}

/// The resolved register/interrupt map for one configuration.
#[derive(Debug, Clone)]
pub struct CsrMap {
    entries: Vec<CsrMapEntry>,
    by_addr: BTreeMap<u32, usize>,
    /// Interrupt vectors, sorted by name
    interrupts: Vec<(&'static str, u8)>,
    /// Configuration constants, in emission order
    constants: Vec<(&'static str, u64)>,
}

impl CsrMap {
    /// Build the map for a configuration.
    pub fn build(config: &SocConfig) -> Self {
        let mut entries = Vec::new();
        let mut by_addr = BTreeMap::new();

        for block in CsrBlock::ALL {
            let defs = Self::block_registers(block, config);
            assert!(
                (defs.len() as u32) * 4 <= CSR_BLOCK_SIZE,
                "register block {} overflows its address range",
                block
            );
            for (i, def) in defs.iter().enumerate() {
                let addr = block.base() + (i as u32) * 4;
                by_addr.insert(addr, entries.len());
                entries.push(CsrMapEntry {
                    addr,
                    block,
                    reg: def.reg,
                    name: def.name,
                    access: def.access,
                });
            }
        }

        let mut constants: Vec<(&'static str, u64)> = vec![
            ("sys_clk_freq", config.sys_clk_freq_hz as u64),
            ("pcie_link_width", config.pcie_link_width as u64),
            ("soft_reset_delay_cycles", SOFT_RESET_DELAY_CYCLES as u64),
            ("dma_table_depth", DESCRIPTOR_TABLE_DEPTH as u64),
        ];
        if config.with_dma_buffering {
            constants.push(("dma_buffering_fifo_depth", DMA_FIFO_DEPTH_WORDS as u64));
        }
        if config.with_dma_loopback {
            constants.push(("with_dma_loopback", 1));
        }
        if config.with_uart_bridge {
            constants.push(("with_uart_bridge", 1));
        }

        Self {
            entries,
            by_addr,
            interrupts: INTERRUPT_MAP.to_vec(),
            constants,
        }
    }

    /// Registers of one block for this configuration, in address order.
    fn block_registers(block: CsrBlock, config: &SocConfig) -> Vec<RegisterDef> {
        match block {
            CsrBlock::Crg => vec![rw(Reg::CrgSoftRst, "soft_rst")],
            CsrBlock::PciePhy => vec![ro(Reg::PhyLinkStatus, "link_status")],
            CsrBlock::Dma => {
                let mut defs = vec![
                    rw(Reg::DmaWriterEnable, "writer_enable"),
                    rw(Reg::DmaWriterTableValue0, "writer_table_value0"),
                    rw(Reg::DmaWriterTableValue1, "writer_table_value1"),
                    rw(Reg::DmaWriterTableWe, "writer_table_we"),
                    rw(Reg::DmaWriterTableLoopProgN, "writer_table_loop_prog_n"),
                    ro(Reg::DmaWriterTableLoopStatus, "writer_table_loop_status"),
                    ro(Reg::DmaWriterTableLevel, "writer_table_level"),
                    rw(Reg::DmaWriterTableReset, "writer_table_reset"),
                    rw(Reg::DmaReaderEnable, "reader_enable"),
                    rw(Reg::DmaReaderTableValue0, "reader_table_value0"),
                    rw(Reg::DmaReaderTableValue1, "reader_table_value1"),
                    rw(Reg::DmaReaderTableWe, "reader_table_we"),
                    rw(Reg::DmaReaderTableLoopProgN, "reader_table_loop_prog_n"),
                    ro(Reg::DmaReaderTableLoopStatus, "reader_table_loop_status"),
                    ro(Reg::DmaReaderTableLevel, "reader_table_level"),
                    rw(Reg::DmaReaderTableReset, "reader_table_reset"),
                ];
                if config.with_dma_loopback {
                    defs.push(rw(Reg::DmaLoopbackEnable, "loopback_enable"));
                }
                if config.with_dma_buffering {
                    defs.push(rw(Reg::DmaBufferingWriterFifoControl, "buffering_writer_fifo_control"));
                    defs.push(ro(Reg::DmaBufferingWriterFifoStatus, "buffering_writer_fifo_status"));
                    defs.push(rw(Reg::DmaBufferingReaderFifoControl, "buffering_reader_fifo_control"));
                    defs.push(ro(Reg::DmaBufferingReaderFifoStatus, "buffering_reader_fifo_status"));
                }
                defs
            }
            CsrBlock::Msi => vec![
                rw(Reg::MsiData, "data"),
                rw(Reg::MsiSend, "send"),
                ro(Reg::MsiDone, "done"),
            ],
        }
    }

    /// Resolve a bus address to a register.
    pub fn lookup(&self, addr: u32) -> Option<&CsrMapEntry> {
        self.by_addr.get(&addr).map(|&i| &self.entries[i])
    }

    /// Address of a register in this configuration, if present.
    pub fn addr_of(&self, reg: Reg) -> Option<u32> {
        self.entries.iter().find(|e| e.reg == reg).map(|e| e.addr)
    }

    pub fn entries(&self) -> &[CsrMapEntry] {
        &self.entries
    }

    pub fn interrupts(&self) -> &[(&'static str, u8)] {
        &self.interrupts
    }

    pub fn constants(&self) -> &[(&'static str, u64)] {
        &self.constants
    }

    /// Emit the CSV artifact.
    pub fn emit_csv(&self) -> String {
        let mut out = String::new();
        for block in CsrBlock::ALL {
            let _ = writeln!(out, "csr_base,{},0x{:08x},,", block.name(), block.base());
        }
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "csr_register,{},0x{:08x},1,{}",
                entry.full_name(),
                entry.addr,
                entry.access.mode()
            );
        }
        let csr_span = (CsrBlock::Msi.index() + 1) * CSR_BLOCK_SIZE;
        let _ = writeln!(out, "memory_region,csr,0x{:08x},{},", CSR_BASE, csr_span);
        for (name, vector) in &self.interrupts {
            let _ = writeln!(out, "constant,{}_interrupt,{},,", name, vector);
        }
        for (name, value) in &self.constants {
            let _ = writeln!(out, "constant,{},{},,", name, value);
        }
        out
    }

    /// Emit the C header artifact.
    pub fn emit_c_header(&self) -> String {
        let mut out = String::new();
        out.push_str("#ifndef __GENERATED_CSR_H\n#define __GENERATED_CSR_H\n");

        for block in CsrBlock::ALL {
            let _ = writeln!(out, "\n/* {} */", block.name());
            let _ = writeln!(
                out,
                "#define CSR_{}_BASE 0x{:08x}L",
                block.name().to_uppercase(),
                block.base()
            );
            for entry in self.entries.iter().filter(|e| e.block == block) {
                let upper = entry.full_name().to_uppercase();
                let _ = writeln!(out, "#define CSR_{}_ADDR 0x{:08x}L", upper, entry.addr);
                let _ = writeln!(out, "#define CSR_{}_SIZE 1", upper);
            }
        }

        out.push_str("\n/* interrupts */\n");
        for (name, vector) in &self.interrupts {
            let _ = writeln!(out, "#define {}_INTERRUPT {}", name.to_uppercase(), vector);
        }

        out.push_str("\n/* constants */\n");
        for (name, value) in &self.constants {
            let _ = writeln!(out, "#define {} {}", name.to_uppercase(), value);
        }

        out.push_str("\n#endif\n");
        out
    }
}
