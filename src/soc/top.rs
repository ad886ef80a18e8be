//! Top-level SoC model.
//!
//! [`PcieDmaSoc`] owns every block and advances the whole device by one
//! `sys` clock per [`step`](PcieDmaSoc::step):
//!
//! 1. The CRG synchronizes the upstream reset and the soft-reset countdown
//!    into the `sys` domain; an asserted reset returns every `sys` block to
//!    power-on state.
//! 2. The arbiter grants one pending bus transaction and dispatches it to
//!    the decoded register; misses read zero and drop writes.
//! 3. The DMA channels move data; their completion pulses feed the MSI
//!    dispatcher, which emits at most one message per transmit window.
//!
//! Host-side accesses are posted on a bus master and collected when the
//! arbiter has served them; `csr_read`/`csr_write` wrap that round trip.

use super::bus::{BusArbiter, BusError, BusMaster, BusRequest, BusResponse};
use super::constants::{IRQ_DMA_READER, IRQ_DMA_WRITER};
use super::crg::Crg;
use super::csr::{CsrAccess, CsrAddress};
use super::csr_map::{CsrMap, Reg};
use super::dma::{ChannelDir, DmaEngine};
use super::host_memory::HostMemory;
use super::msi::{MsiDispatcher, MsiMessage};
use super::phy::PciePhy;
use crate::config::SocConfig;

/// Cycles a posted transaction may take before it counts as dropped.
/// Generous: a grant takes at most one cycle per present master.
const MAX_TRANSACTION_CYCLES: u32 = 16;

/// The PCIe DMA bridge SoC.
pub struct PcieDmaSoc {
    config: SocConfig,
    map: CsrMap,
    crg: Crg,
    phy: PciePhy,
    bus: BusArbiter,
    dma: DmaEngine,
    msi: MsiDispatcher,
    host: HostMemory,
    /// Upstream (PCIe recovered-domain) reset level
    pcie_rst: bool,
    sys_rst: bool,
    cycles: u64,
}

impl PcieDmaSoc {
    /// Build the SoC for a resolved configuration.
    pub fn new(config: SocConfig) -> Self {
        log::info!(
            "PcieDmaSoc: uart_bridge={} buffering={} loopback={} sys_clk={}Hz link=x{}",
            config.with_uart_bridge,
            config.with_dma_buffering,
            config.with_dma_loopback,
            config.sys_clk_freq_hz,
            config.pcie_link_width
        );
        Self {
            map: CsrMap::build(&config),
            crg: Crg::new(),
            phy: PciePhy::new(config.pcie_link_width),
            bus: BusArbiter::new(config.with_uart_bridge),
            dma: DmaEngine::new(config.with_dma_buffering, config.with_dma_loopback),
            msi: MsiDispatcher::new(),
            host: HostMemory::new(),
            pcie_rst: false,
            sys_rst: false,
            cycles: 0,
            config,
        }
    }

    pub fn config(&self) -> &SocConfig {
        &self.config
    }

    /// The register/interrupt map of this build.
    pub fn csr_map(&self) -> &CsrMap {
        &self.map
    }

    pub fn host_memory(&self) -> &HostMemory {
        &self.host
    }

    pub fn host_memory_mut(&mut self) -> &mut HostMemory {
        &mut self.host
    }

    pub fn dma(&self) -> &DmaEngine {
        &self.dma
    }

    pub fn dma_mut(&mut self) -> &mut DmaEngine {
        &mut self.dma
    }

    pub fn msi(&self) -> &MsiDispatcher {
        &self.msi
    }

    /// Drain one emitted MSI message (the endpoint side).
    pub fn pop_msi(&mut self) -> Option<MsiMessage> {
        self.msi.pop_msi()
    }

    /// Drive the upstream reset level.
    pub fn set_pcie_reset(&mut self, level: bool) {
        self.pcie_rst = level;
    }

    /// Synchronized `sys` domain reset level.
    pub fn sys_rst(&self) -> bool {
        self.sys_rst
    }

    /// Free-running cycle counter.
    pub fn cycle_count(&self) -> u64 {
        self.cycles
    }

    /// Advance the SoC by one `sys` clock cycle.
    pub fn step(&mut self) {
        let sys_rst = self.crg.step(self.pcie_rst);
        let was_rst = self.sys_rst;
        self.sys_rst = sys_rst;

        if sys_rst {
            if !was_rst {
                log::info!("sys domain reset asserted at cycle {}", self.cycles);
            }
            self.bus.reset();
            self.dma.reset();
            self.msi.reset();
        } else {
            if let Some((master, request)) = self.bus.grant() {
                let response = self.execute(master, request);
                self.bus.complete(master, response);
            }

            let irqs = self.dma.step(&mut self.host);
            if irqs.writer {
                self.msi.assert_vector(IRQ_DMA_WRITER);
            }
            if irqs.reader {
                self.msi.assert_vector(IRQ_DMA_READER);
            }
            self.msi.step();
        }

        self.cycles += 1;
    }

    /// Post a raw bus request on a master.
    pub fn submit(&mut self, master: BusMaster, request: BusRequest) -> Result<(), BusError> {
        self.bus.submit(master, request)
    }

    /// Collect a master's completed response, if any.
    pub fn take_response(&mut self, master: BusMaster) -> Option<BusResponse> {
        self.bus.take_response(master)
    }

    /// Read a CSR from a specific master, stepping until the bus serves it.
    pub fn csr_read_from(&mut self, master: BusMaster, addr: u32) -> Result<u32, BusError> {
        self.bus.submit(master, BusRequest::read(addr))?;
        for _ in 0..MAX_TRANSACTION_CYCLES {
            self.step();
            if let Some(response) = self.bus.take_response(master) {
                return Ok(response.data);
            }
        }
        Err(BusError::NoResponse(master))
    }

    /// Write a CSR from a specific master, stepping until the bus serves it.
    pub fn csr_write_from(
        &mut self,
        master: BusMaster,
        addr: u32,
        value: u32,
    ) -> Result<(), BusError> {
        self.bus.submit(master, BusRequest::write(addr, value))?;
        for _ in 0..MAX_TRANSACTION_CYCLES {
            self.step();
            if self.bus.take_response(master).is_some() {
                return Ok(());
            }
        }
        Err(BusError::NoResponse(master))
    }

    /// Read a CSR through the PCIe-bridged master.
    pub fn csr_read(&mut self, addr: u32) -> Result<u32, BusError> {
        self.csr_read_from(BusMaster::PcieBridge, addr)
    }

    /// Write a CSR through the PCIe-bridged master.
    pub fn csr_write(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        self.csr_write_from(BusMaster::PcieBridge, addr, value)
    }

    /// Dispatch one granted transaction to the decoded register.
    fn execute(&mut self, master: BusMaster, request: BusRequest) -> BusResponse {
        let entry = match self.map.lookup(request.addr) {
            Some(entry) => *entry,
            None => {
                // Decode miss: read zero, drop the write, never fault
                log::debug!(
                    "{}: no responder at 0x{:08X} ({:?}), {}",
                    master,
                    request.addr,
                    CsrAddress::decode(request.addr),
                    if request.write { "write dropped" } else { "read returns 0" }
                );
                return BusResponse { data: 0 };
            }
        };

        if request.write {
            if entry.access == CsrAccess::ReadOnly {
                log::debug!("{}: write to read-only {} dropped", master, entry.full_name());
            } else {
                log::trace!(
                    "{}: write {} <= 0x{:08X}",
                    master,
                    entry.full_name(),
                    request.data
                );
                self.write_reg(entry.reg, request.data);
            }
            BusResponse { data: 0 }
        } else {
            let data = self.read_reg(entry.reg);
            log::trace!("{}: read {} => 0x{:08X}", master, entry.full_name(), data);
            BusResponse { data }
        }
    }

    fn read_reg(&self, reg: Reg) -> u32 {
        match reg {
            Reg::CrgSoftRst => 0,
            Reg::PhyLinkStatus => self.phy.link_status(),

            Reg::DmaWriterEnable => self.read_enable(ChannelDir::Writer),
            Reg::DmaReaderEnable => self.read_enable(ChannelDir::Reader),
            Reg::DmaWriterTableValue0 => self.dma.table(ChannelDir::Writer).read_value0(),
            Reg::DmaWriterTableValue1 => self.dma.table(ChannelDir::Writer).read_value1(),
            Reg::DmaWriterTableWe => self.dma.table(ChannelDir::Writer).read_we(),
            Reg::DmaReaderTableValue0 => self.dma.table(ChannelDir::Reader).read_value0(),
            Reg::DmaReaderTableValue1 => self.dma.table(ChannelDir::Reader).read_value1(),
            Reg::DmaReaderTableWe => self.dma.table(ChannelDir::Reader).read_we(),
            Reg::DmaWriterTableLoopProgN => self.dma.table(ChannelDir::Writer).loop_mode() as u32,
            Reg::DmaReaderTableLoopProgN => self.dma.table(ChannelDir::Reader).loop_mode() as u32,
            Reg::DmaWriterTableLoopStatus => self.dma.table(ChannelDir::Writer).loop_status(),
            Reg::DmaReaderTableLoopStatus => self.dma.table(ChannelDir::Reader).loop_status(),
            Reg::DmaWriterTableLevel => self.dma.table(ChannelDir::Writer).level() as u32,
            Reg::DmaReaderTableLevel => self.dma.table(ChannelDir::Reader).level() as u32,
            Reg::DmaWriterTableReset | Reg::DmaReaderTableReset => 0,

            Reg::DmaLoopbackEnable => self.dma.loopback_enabled() as u32,

            Reg::DmaBufferingWriterFifoControl | Reg::DmaBufferingReaderFifoControl => 0,
            Reg::DmaBufferingWriterFifoStatus => self.dma.fifo_level(ChannelDir::Writer) as u32,
            Reg::DmaBufferingReaderFifoStatus => self.dma.fifo_level(ChannelDir::Reader) as u32,

            Reg::MsiData => self.msi.read_data(),
            Reg::MsiSend => 0,
            Reg::MsiDone => self.msi.read_done(),
        }
    }

    fn write_reg(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::CrgSoftRst => self.crg.write_soft_rst(value),

            Reg::DmaWriterEnable => self.dma.set_enabled(ChannelDir::Writer, value & 1 != 0),
            Reg::DmaReaderEnable => self.dma.set_enabled(ChannelDir::Reader, value & 1 != 0),
            Reg::DmaWriterTableValue0 => self.dma.table_mut(ChannelDir::Writer).write_value0(value),
            Reg::DmaWriterTableValue1 => self.dma.table_mut(ChannelDir::Writer).write_value1(value),
            Reg::DmaWriterTableWe => self.dma.table_mut(ChannelDir::Writer).write_we(value),
            Reg::DmaReaderTableValue0 => self.dma.table_mut(ChannelDir::Reader).write_value0(value),
            Reg::DmaReaderTableValue1 => self.dma.table_mut(ChannelDir::Reader).write_value1(value),
            Reg::DmaReaderTableWe => self.dma.table_mut(ChannelDir::Reader).write_we(value),
            Reg::DmaWriterTableLoopProgN => {
                self.dma.table_mut(ChannelDir::Writer).set_loop_mode(value & 1 != 0)
            }
            Reg::DmaReaderTableLoopProgN => {
                self.dma.table_mut(ChannelDir::Reader).set_loop_mode(value & 1 != 0)
            }
            Reg::DmaWriterTableReset => {
                if value & 1 != 0 {
                    self.dma.table_mut(ChannelDir::Writer).reset();
                }
            }
            Reg::DmaReaderTableReset => {
                if value & 1 != 0 {
                    self.dma.table_mut(ChannelDir::Reader).reset();
                }
            }

            Reg::DmaLoopbackEnable => self.dma.set_loopback(value & 1 != 0),

            Reg::DmaBufferingWriterFifoControl => {
                if value & 1 != 0 {
                    self.dma.flush_fifo(ChannelDir::Writer);
                }
            }
            Reg::DmaBufferingReaderFifoControl => {
                if value & 1 != 0 {
                    self.dma.flush_fifo(ChannelDir::Reader);
                }
            }

            Reg::MsiData => self.msi.write_data(value),
            Reg::MsiSend => self.msi.write_send(value),

            // Read-only registers are filtered out before dispatch
            Reg::PhyLinkStatus
            | Reg::DmaWriterTableLoopStatus
            | Reg::DmaReaderTableLoopStatus
            | Reg::DmaWriterTableLevel
            | Reg::DmaReaderTableLevel
            | Reg::DmaBufferingWriterFifoStatus
            | Reg::DmaBufferingReaderFifoStatus
            | Reg::MsiDone => {}
        }
    }

    /// `enable` CSR: bit 0 = running, bit 1 = idle.
    fn read_enable(&self, dir: ChannelDir) -> u32 {
        (self.dma.enabled(dir) as u32) | ((self.dma.idle(dir) as u32) << 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::constants::SOFT_RESET_DELAY_CYCLES;

    fn soc() -> PcieDmaSoc {
        PcieDmaSoc::new(SocConfig::default())
    }

    fn addr(soc: &PcieDmaSoc, reg: Reg) -> u32 {
        soc.csr_map().addr_of(reg).expect("register not in this configuration")
    }

    /// Program one descriptor through the table CSRs.
    fn push_csr_descriptor(
        soc: &mut PcieDmaSoc,
        value0_reg: Reg,
        value1_reg: Reg,
        we_reg: Reg,
        address: u64,
        length: u32,
    ) {
        let v0 = addr(soc, value0_reg);
        let v1 = addr(soc, value1_reg);
        let we = addr(soc, we_reg);
        soc.csr_write(v0, length).unwrap();
        soc.csr_write(v1, address as u32).unwrap();
        soc.csr_write(we, (address >> 32) as u32).unwrap();
    }

    #[test]
    fn test_dma_loopback_end_to_end() {
        let mut soc = soc();
        let data: Vec<u32> = (0..32).map(|i| 0xCAFE_0000 + i).collect();
        soc.host_memory_mut().allocate_region("tx", 0x10_0000, 4096).unwrap();
        soc.host_memory_mut().allocate_region("rx", 0x20_0000, 4096).unwrap();
        soc.host_memory_mut().write_words(0x10_0000, &data);

        // Host bring-up, entirely through the bridged bus master
        let loopback = addr(&soc, Reg::DmaLoopbackEnable);
        let writer_enable = addr(&soc, Reg::DmaWriterEnable);
        let reader_enable = addr(&soc, Reg::DmaReaderEnable);
        soc.csr_write(loopback, 1).unwrap();
        soc.csr_write(writer_enable, 1).unwrap();
        soc.csr_write(reader_enable, 1).unwrap();

        push_csr_descriptor(
            &mut soc,
            Reg::DmaWriterTableValue0,
            Reg::DmaWriterTableValue1,
            Reg::DmaWriterTableWe,
            0x10_0000,
            128,
        );
        push_csr_descriptor(
            &mut soc,
            Reg::DmaReaderTableValue0,
            Reg::DmaReaderTableValue1,
            Reg::DmaReaderTableWe,
            0x20_0000,
            128,
        );

        for _ in 0..2000 {
            soc.step();
            if soc.dma().idle(ChannelDir::Writer) && soc.dma().idle(ChannelDir::Reader) {
                break;
            }
        }
        for _ in 0..16 {
            soc.step();
        }

        assert_eq!(soc.host_memory_mut().read_words(0x20_0000, 32), data);

        // Both completion sources reached the host as MSI vector bits
        let mut seen = 0u32;
        while let Some(message) = soc.pop_msi() {
            seen |= message.data;
        }
        assert_eq!(seen & 0b11, 0b11);
    }

    #[test]
    fn test_decode_miss_reads_zero_writes_dropped() {
        let mut soc = soc();
        let probe = addr(&soc, Reg::MsiData);
        soc.csr_write(probe, 0x1234).unwrap();

        // Unoccupied block, a gap inside a block, and past the last block
        for miss in [0x0000_0000u32, 0x0000_8004, 0x0000_A000, 0xFFFF_FFF0] {
            assert_eq!(soc.csr_read(miss).unwrap(), 0, "read at 0x{:08X}", miss);
            soc.csr_write(miss, 0xDEAD_BEEF).unwrap();
        }

        // No observable effect anywhere
        assert_eq!(soc.csr_read(probe).unwrap(), 0x1234);
        assert_eq!(soc.host_memory().total_bytes_written(), 0);
    }

    #[test]
    fn test_read_only_register_write_dropped() {
        let mut soc = soc();
        let status = addr(&soc, Reg::PhyLinkStatus);
        let before = soc.csr_read(status).unwrap();
        soc.csr_write(status, 0).unwrap();
        assert_eq!(soc.csr_read(status).unwrap(), before);
    }

    #[test]
    fn test_phy_link_status() {
        let mut soc = soc();
        let status = addr(&soc, Reg::PhyLinkStatus);
        let value = soc.csr_read(status).unwrap();
        assert_eq!(value & 1, 1, "link up");
        assert_eq!((value >> 1) & 0xFF, 2, "x2 link");
    }

    #[test]
    fn test_soft_reset_via_csr() {
        let mut soc = soc();
        let writer_enable = addr(&soc, Reg::DmaWriterEnable);
        let soft_rst = addr(&soc, Reg::CrgSoftRst);

        soc.csr_write(writer_enable, 1).unwrap();
        assert_eq!(soc.csr_read(writer_enable).unwrap() & 1, 1);

        soc.csr_write(soft_rst, 1).unwrap();

        // The pulse lands exactly at the end of the grace window
        let mut cycles_to_reset = 0;
        for _ in 0..(SOFT_RESET_DELAY_CYCLES * 2) {
            soc.step();
            cycles_to_reset += 1;
            if soc.sys_rst() {
                break;
            }
        }
        assert_eq!(cycles_to_reset, SOFT_RESET_DELAY_CYCLES);

        // Let the synchronizer release, then check power-on state
        for _ in 0..8 {
            soc.step();
        }
        assert!(!soc.sys_rst());
        assert_eq!(soc.csr_read(writer_enable).unwrap() & 1, 0, "enable cleared by reset");
        assert_eq!(soc.csr_read(addr(&soc, Reg::MsiDone)).unwrap(), 1);
    }

    #[test]
    fn test_transaction_during_reset_window_is_served() {
        let mut soc = soc();
        let soft_rst = addr(&soc, Reg::CrgSoftRst);
        let status = addr(&soc, Reg::PhyLinkStatus);
        soc.csr_write(soft_rst, 1).unwrap();

        // The grace window exists precisely so this access can retire
        let value = soc.csr_read(status).unwrap();
        assert_eq!(value & 1, 1);
    }

    #[test]
    fn test_msi_debug_path_via_csr() {
        let mut soc = soc();
        let data = addr(&soc, Reg::MsiData);
        let send = addr(&soc, Reg::MsiSend);
        let done = addr(&soc, Reg::MsiDone);

        soc.csr_write(data, 0x5A).unwrap();
        soc.csr_write(send, 1).unwrap();
        while soc.csr_read(done).unwrap() == 0 {}

        let message = soc.pop_msi().expect("message reached the endpoint");
        assert_eq!(message.data, 0x5A);
        assert!(soc.pop_msi().is_none(), "exactly one message per trigger");
    }

    #[test]
    fn test_uart_master_access() {
        let mut soc = soc();
        let status = addr(&soc, Reg::PhyLinkStatus);
        let via_uart = soc.csr_read_from(BusMaster::UartBridge, status).unwrap();
        let via_pcie = soc.csr_read_from(BusMaster::PcieBridge, status).unwrap();
        assert_eq!(via_uart, via_pcie);
    }

    #[test]
    fn test_uart_master_gated_by_config() {
        let mut soc = PcieDmaSoc::new(SocConfig {
            with_uart_bridge: false,
            ..SocConfig::default()
        });
        let err = soc.csr_read_from(BusMaster::UartBridge, 0x8000).unwrap_err();
        assert_eq!(err, BusError::MasterNotPresent(BusMaster::UartBridge));
    }

    #[test]
    fn test_both_masters_share_the_bus() {
        let mut soc = soc();
        let status = addr(&soc, Reg::PhyLinkStatus);
        soc.submit(BusMaster::PcieBridge, BusRequest::read(status)).unwrap();
        soc.submit(BusMaster::UartBridge, BusRequest::read(status)).unwrap();

        for _ in 0..4 {
            soc.step();
        }
        let pcie = soc.take_response(BusMaster::PcieBridge).unwrap();
        let uart = soc.take_response(BusMaster::UartBridge).unwrap();
        assert_eq!(pcie.data, uart.data);
    }

    #[test]
    fn test_cycle_counter_runs_free() {
        let mut soc = soc();
        assert_eq!(soc.cycle_count(), 0);
        for _ in 0..100 {
            soc.step();
        }
        assert_eq!(soc.cycle_count(), 100);
    }

    #[test]
    fn test_upstream_reset_holds_sys_domain() {
        let mut soc = soc();
        let writer_enable = addr(&soc, Reg::DmaWriterEnable);
        soc.csr_write(writer_enable, 1).unwrap();

        soc.set_pcie_reset(true);
        for _ in 0..4 {
            soc.step();
        }
        assert!(soc.sys_rst());

        soc.set_pcie_reset(false);
        for _ in 0..8 {
            soc.step();
        }
        assert!(!soc.sys_rst());
        assert_eq!(soc.csr_read(writer_enable).unwrap() & 1, 0);
    }
}
