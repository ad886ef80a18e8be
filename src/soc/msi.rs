//! Interrupt aggregation and MSI dispatch.
//!
//! Interrupt sources are a closed table fixed at build time; each source is
//! bound to one vector. Every cycle the pending word accumulates the OR of
//! all asserted sources; whenever it is non-zero and no message is on the
//! wire, one MSI carrying the word is emitted and the word clears. A
//! single message occupies the outgoing path for [`MSI_TX_CYCLES`] cycles;
//! sources asserted meanwhile stay latched for the next message, so none
//! is ever dropped.
//!
//! ```text
//!  dma_writer irq ──► bit 0 ─┐
//!  dma_reader irq ──► bit 1 ─┤ pending word ─► MSI message ─► endpoint
//!  msi_data / msi_send ──────┘ (one in flight at a time)
//! ```
//!
//! The `msi_data`/`msi_send`/`msi_done` CSRs form a manual debug path:
//! host software can transmit an arbitrary payload and poll for
//! completion. It shares the in-flight exclusion with the hardware
//! sources.

use std::collections::VecDeque;

use super::constants::{INTERRUPT_MAP, MSI_TX_CYCLES};

/// One outgoing MSI transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsiMessage {
    /// Vector word (hardware path) or raw payload (debug path)
    pub data: u32,
}

/// A named interrupt source bound to a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsiSource {
    pub name: &'static str,
    pub vector: u8,
}

/// Message occupying the outgoing path.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    remaining: u32,
    manual: bool,
}

/// Interrupt aggregator / MSI dispatcher.
#[derive(Debug)]
pub struct MsiDispatcher {
    /// Closed source table, sorted by name
    sources: Vec<MsiSource>,
    /// OR-accumulated vector bits awaiting transmission
    pending: u32,
    in_flight: Option<InFlight>,
    outbox: VecDeque<MsiMessage>,

    // Manual debug path
    manual_data: u32,
    manual_pending: bool,
    manual_done: bool,

    messages_sent: u64,
}

impl MsiDispatcher {
    pub fn new() -> Self {
        let sources: Vec<MsiSource> = INTERRUPT_MAP
            .iter()
            .map(|&(name, vector)| MsiSource { name, vector })
            .collect();
        debug_assert!(sources.windows(2).all(|p| p[0].name < p[1].name));
        Self {
            sources,
            pending: 0,
            in_flight: None,
            outbox: VecDeque::new(),
            manual_data: 0,
            manual_pending: false,
            manual_done: true,
            messages_sent: 0,
        }
    }

    /// The source table, in name order.
    pub fn sources(&self) -> &[MsiSource] {
        &self.sources
    }

    /// Vector bound to a source name.
    pub fn vector_of(&self, name: &str) -> Option<u8> {
        self.sources.iter().find(|s| s.name == name).map(|s| s.vector)
    }

    /// Latch an asserted source into the pending word.
    pub fn assert_vector(&mut self, vector: u8) {
        self.pending |= 1 << vector;
    }

    /// `msi_data` CSR write.
    pub fn write_data(&mut self, value: u32) {
        self.manual_data = value;
    }

    /// `msi_data` CSR read.
    pub fn read_data(&self) -> u32 {
        self.manual_data
    }

    /// `msi_send` CSR write: bit 0 triggers transmission of `msi_data`.
    pub fn write_send(&mut self, value: u32) {
        if value & 1 == 0 {
            return;
        }
        log::debug!("manual MSI triggered, payload=0x{:08X}", self.manual_data);
        self.manual_pending = true;
        self.manual_done = false;
    }

    /// `msi_done` CSR read: 1 when no manual message is pending or in flight.
    pub fn read_done(&self) -> u32 {
        self.manual_done as u32
    }

    /// Advance one cycle: finish an in-flight message and start the next.
    pub fn step(&mut self) {
        if let Some(flight) = &mut self.in_flight {
            flight.remaining -= 1;
            if flight.remaining == 0 {
                let manual = flight.manual;
                self.in_flight = None;
                if manual && !self.manual_pending {
                    self.manual_done = true;
                }
            }
        }

        if self.in_flight.is_some() {
            // Sources asserted meanwhile stay latched in `pending`
            return;
        }

        // Hardware sources first, the debug path in the next window
        if self.pending != 0 {
            let data = self.pending;
            self.pending = 0;
            self.transmit(data, false);
        } else if self.manual_pending {
            self.manual_pending = false;
            let data = self.manual_data;
            self.transmit(data, true);
        }
    }

    fn transmit(&mut self, data: u32, manual: bool) {
        log::debug!("MSI transmit data=0x{:08X} manual={}", data, manual);
        self.outbox.push_back(MsiMessage { data });
        self.in_flight = Some(InFlight { remaining: MSI_TX_CYCLES, manual });
        self.messages_sent += 1;
    }

    /// Drain one emitted message (the endpoint side).
    pub fn pop_msi(&mut self) -> Option<MsiMessage> {
        self.outbox.pop_front()
    }

    /// Messages emitted since construction.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Whether a message currently occupies the outgoing path.
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Return to power-on state (domain reset).
    pub fn reset(&mut self) {
        self.pending = 0;
        self.in_flight = None;
        self.outbox.clear();
        self.manual_data = 0;
        self.manual_pending = false;
        self.manual_done = true;
    }
}

impl Default for MsiDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::constants::{IRQ_DMA_READER, IRQ_DMA_WRITER};

    #[test]
    fn test_source_table_fixed_and_sorted() {
        let msi = MsiDispatcher::new();
        assert_eq!(msi.sources().len(), 2);
        assert_eq!(msi.sources()[0].name, "dma_reader");
        assert_eq!(msi.sources()[1].name, "dma_writer");
        assert_eq!(msi.vector_of("dma_writer"), Some(IRQ_DMA_WRITER));
        assert_eq!(msi.vector_of("dma_reader"), Some(IRQ_DMA_READER));
        assert_eq!(msi.vector_of("nonexistent"), None);
    }

    #[test]
    fn test_idle_sends_nothing() {
        let mut msi = MsiDispatcher::new();
        for _ in 0..100 {
            msi.step();
        }
        assert!(msi.pop_msi().is_none());
        assert_eq!(msi.messages_sent(), 0);
    }

    #[test]
    fn test_simultaneous_sources_one_word() {
        let mut msi = MsiDispatcher::new();
        msi.assert_vector(IRQ_DMA_WRITER);
        msi.assert_vector(IRQ_DMA_READER);
        msi.step();

        let message = msi.pop_msi().unwrap();
        assert_eq!(message.data, (1 << IRQ_DMA_WRITER) | (1 << IRQ_DMA_READER));
        assert_eq!(msi.messages_sent(), 1);
    }

    #[test]
    fn test_in_flight_defers_never_drops() {
        let mut msi = MsiDispatcher::new();
        msi.assert_vector(IRQ_DMA_WRITER);
        msi.step();
        assert!(msi.in_flight());

        // A source asserting mid-transmission is latched, not lost
        msi.assert_vector(IRQ_DMA_READER);
        let mut messages = vec![msi.pop_msi().unwrap()];
        for _ in 0..(MSI_TX_CYCLES * 3) {
            msi.step();
            if let Some(m) = msi.pop_msi() {
                messages.push(m);
            }
        }

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].data, 1 << IRQ_DMA_WRITER);
        assert_eq!(messages[1].data, 1 << IRQ_DMA_READER);
    }

    #[test]
    fn test_single_message_in_flight() {
        let mut msi = MsiDispatcher::new();
        msi.assert_vector(IRQ_DMA_WRITER);
        msi.step();
        msi.assert_vector(IRQ_DMA_READER);

        // The second message cannot start until the window ends
        for _ in 0..(MSI_TX_CYCLES - 1) {
            msi.step();
            assert_eq!(msi.messages_sent(), 1);
        }
        msi.step();
        assert_eq!(msi.messages_sent(), 2);
    }

    #[test]
    fn test_manual_path_done_handshake() {
        let mut msi = MsiDispatcher::new();
        assert_eq!(msi.read_done(), 1);

        msi.write_data(0x5A);
        msi.write_send(1);
        assert_eq!(msi.read_done(), 0);

        let mut transitions = 0;
        let mut prev_done = 0;
        for _ in 0..(MSI_TX_CYCLES * 2) {
            msi.step();
            let done = msi.read_done();
            if prev_done == 0 && done == 1 {
                transitions += 1;
            }
            prev_done = done;
        }
        assert_eq!(transitions, 1, "done must transition 0 -> 1 exactly once");
        assert_eq!(msi.pop_msi().unwrap().data, 0x5A);
    }

    #[test]
    fn test_manual_path_yields_to_hardware() {
        let mut msi = MsiDispatcher::new();
        msi.write_data(0xAB);
        msi.write_send(1);
        msi.assert_vector(IRQ_DMA_WRITER);

        // Hardware word goes first, manual payload in the next window
        let mut messages = Vec::new();
        for _ in 0..(MSI_TX_CYCLES * 3) {
            msi.step();
            if let Some(m) = msi.pop_msi() {
                messages.push(m.data);
            }
        }
        assert_eq!(messages, vec![1 << IRQ_DMA_WRITER, 0xAB]);
        assert_eq!(msi.read_done(), 1);
    }

    #[test]
    fn test_send_without_bit_ignored() {
        let mut msi = MsiDispatcher::new();
        msi.write_data(0x99);
        msi.write_send(0);
        msi.step();
        assert!(msi.pop_msi().is_none());
        assert_eq!(msi.read_done(), 1);
    }

    #[test]
    fn test_reset_clears_pending_state() {
        let mut msi = MsiDispatcher::new();
        msi.assert_vector(IRQ_DMA_WRITER);
        msi.write_data(0x77);
        msi.write_send(1);
        msi.step();

        msi.reset();
        assert!(!msi.in_flight());
        assert!(msi.pop_msi().is_none());
        assert_eq!(msi.read_done(), 1);
        for _ in 0..10 {
            msi.step();
        }
        assert_eq!(msi.pop_msi(), None);
    }
}
