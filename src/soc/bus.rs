//! Shared-bus masters and arbitration.
//!
//! Two masters can drive the CSR bus: the PCIe-bridged master (always
//! present) and the UART debug bridge (a build option). Each master holds
//! at most one outstanding transaction; a request simply holds until the
//! arbiter grants it. Grants are round-robin, so neither master starves
//! under sustained demand, and a response is routed back only to the master
//! that owned the granted transaction.
//!
//! Address decode itself lives with the register map; the arbiter only
//! decides whose address/data reach the slaves this cycle.

use std::fmt;

use thiserror::Error;

/// Bus masters, a closed set fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMaster {
    /// Master bridged from the PCIe endpoint
    PcieBridge,
    /// Optional debug master behind the UART bridge
    UartBridge,
}

impl BusMaster {
    pub const ALL: [BusMaster; 2] = [BusMaster::PcieBridge, BusMaster::UartBridge];

    fn index(&self) -> usize {
        match self {
            BusMaster::PcieBridge => 0,
            BusMaster::UartBridge => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BusMaster::PcieBridge => "pcie_bridge",
            BusMaster::UartBridge => "uart_bridge",
        }
    }
}

impl fmt::Display for BusMaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One bus transaction: an address plus read/write intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusRequest {
    pub addr: u32,
    pub data: u32,
    pub write: bool,
}

impl BusRequest {
    pub fn read(addr: u32) -> Self {
        Self { addr, data: 0, write: false }
    }

    pub fn write(addr: u32, data: u32) -> Self {
        Self { addr, data, write: true }
    }
}

/// Completion of a bus transaction. `data` is meaningful for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusResponse {
    pub data: u32,
}

/// Bus error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// The master is not built into this configuration
    #[error("bus master {0} is not present in this build")]
    MasterNotPresent(BusMaster),
    /// The master already has a transaction outstanding
    #[error("bus master {0} already has a transaction outstanding")]
    MasterBusy(BusMaster),
    /// The transaction was dropped (reset hit before completion)
    #[error("no response for bus master {0}: transaction dropped")]
    NoResponse(BusMaster),
}

/// Round-robin arbiter over the fixed master set.
#[derive(Debug, Clone)]
pub struct BusArbiter {
    present: [bool; 2],
    pending: [Option<BusRequest>; 2],
    responses: [Option<BusResponse>; 2],
    last_grant: usize,
    grants: [u64; 2],
}

impl BusArbiter {
    pub fn new(with_uart_bridge: bool) -> Self {
        Self {
            present: [true, with_uart_bridge],
            pending: [None, None],
            responses: [None, None],
            last_grant: BusMaster::ALL.len() - 1,
            grants: [0, 0],
        }
    }

    /// Whether a master exists in this build.
    pub fn has_master(&self, master: BusMaster) -> bool {
        self.present[master.index()]
    }

    /// Post a request on a master. The request holds until granted.
    pub fn submit(&mut self, master: BusMaster, request: BusRequest) -> Result<(), BusError> {
        let idx = master.index();
        if !self.present[idx] {
            return Err(BusError::MasterNotPresent(master));
        }
        if self.pending[idx].is_some() || self.responses[idx].is_some() {
            return Err(BusError::MasterBusy(master));
        }
        log::trace!(
            "{} request: addr=0x{:08X} write={} data=0x{:08X}",
            master,
            request.addr,
            request.write,
            request.data
        );
        self.pending[idx] = Some(request);
        Ok(())
    }

    /// Grant one pending transaction, round-robin.
    ///
    /// Only one master's address/data reach the slaves per transaction.
    pub fn grant(&mut self) -> Option<(BusMaster, BusRequest)> {
        let n = BusMaster::ALL.len();
        for step in 1..=n {
            let idx = (self.last_grant + step) % n;
            if let Some(request) = self.pending[idx].take() {
                self.last_grant = idx;
                self.grants[idx] += 1;
                return Some((BusMaster::ALL[idx], request));
            }
        }
        None
    }

    /// Deliver the slave's response to the granted master.
    pub fn complete(&mut self, master: BusMaster, response: BusResponse) {
        self.responses[master.index()] = Some(response);
    }

    /// Collect a master's completed response, if any.
    pub fn take_response(&mut self, master: BusMaster) -> Option<BusResponse> {
        self.responses[master.index()].take()
    }

    /// Whether a master has a request or response outstanding.
    pub fn is_busy(&self, master: BusMaster) -> bool {
        let idx = master.index();
        self.pending[idx].is_some() || self.responses[idx].is_some()
    }

    /// Grants issued to a master since construction.
    pub fn grant_count(&self, master: BusMaster) -> u64 {
        self.grants[master.index()]
    }

    /// Drop all in-flight transactions (reset).
    ///
    /// A transaction caught here is the documented soft-reset casualty: its
    /// outcome is undefined and the host re-issues it.
    pub fn reset(&mut self) {
        for idx in 0..BusMaster::ALL.len() {
            if self.pending[idx].is_some() || self.responses[idx].is_some() {
                log::warn!("{} transaction dropped by reset", BusMaster::ALL[idx]);
            }
            self.pending[idx] = None;
            self.responses[idx] = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_master_grant() {
        let mut bus = BusArbiter::new(false);
        bus.submit(BusMaster::PcieBridge, BusRequest::read(0x8000)).unwrap();

        let (master, request) = bus.grant().unwrap();
        assert_eq!(master, BusMaster::PcieBridge);
        assert_eq!(request.addr, 0x8000);
        assert!(bus.grant().is_none());
    }

    #[test]
    fn test_absent_master_rejected() {
        let mut bus = BusArbiter::new(false);
        let err = bus.submit(BusMaster::UartBridge, BusRequest::read(0)).unwrap_err();
        assert_eq!(err, BusError::MasterNotPresent(BusMaster::UartBridge));
    }

    #[test]
    fn test_master_single_outstanding() {
        let mut bus = BusArbiter::new(true);
        bus.submit(BusMaster::PcieBridge, BusRequest::read(0)).unwrap();
        let err = bus.submit(BusMaster::PcieBridge, BusRequest::read(4)).unwrap_err();
        assert_eq!(err, BusError::MasterBusy(BusMaster::PcieBridge));
    }

    #[test]
    fn test_round_robin_alternation() {
        let mut bus = BusArbiter::new(true);

        // Both masters keep a request posted; grants must alternate
        let mut order = Vec::new();
        for _ in 0..8 {
            if !bus.is_busy(BusMaster::PcieBridge) {
                bus.submit(BusMaster::PcieBridge, BusRequest::read(0)).unwrap();
            }
            if !bus.is_busy(BusMaster::UartBridge) {
                bus.submit(BusMaster::UartBridge, BusRequest::read(4)).unwrap();
            }
            let (master, _) = bus.grant().unwrap();
            order.push(master);
            bus.complete(master, BusResponse { data: 0 });
            bus.take_response(master);
        }

        for pair in order.windows(2) {
            assert_ne!(pair[0], pair[1], "grants did not alternate: {:?}", order);
        }
        assert_eq!(bus.grant_count(BusMaster::PcieBridge), 4);
        assert_eq!(bus.grant_count(BusMaster::UartBridge), 4);
    }

    #[test]
    fn test_response_routing() {
        let mut bus = BusArbiter::new(true);
        bus.submit(BusMaster::PcieBridge, BusRequest::read(0x8000)).unwrap();
        bus.submit(BusMaster::UartBridge, BusRequest::read(0x8800)).unwrap();

        let (first, _) = bus.grant().unwrap();
        bus.complete(first, BusResponse { data: 0x11 });
        let (second, _) = bus.grant().unwrap();
        bus.complete(second, BusResponse { data: 0x22 });
        assert_ne!(first, second);

        // Each master sees only its own response
        assert_eq!(bus.take_response(first).unwrap().data, 0x11);
        assert_eq!(bus.take_response(second).unwrap().data, 0x22);
        assert!(bus.take_response(first).is_none());
    }

    #[test]
    fn test_reset_drops_in_flight() {
        let mut bus = BusArbiter::new(true);
        bus.submit(BusMaster::PcieBridge, BusRequest::write(0x8000, 1)).unwrap();
        bus.reset();
        assert!(bus.grant().is_none());
        assert!(!bus.is_busy(BusMaster::PcieBridge));
    }
}
