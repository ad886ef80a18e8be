//! DMA engine implementation.
//!
//! The engine owns the writer and reader channels. Each `step()` advances
//! both by one cycle: the writer drains descriptors by reading host memory
//! into its stream FIFO, the reader drains its FIFO into host memory, and
//! the loopback path (when built and enabled) shuttles words from one to
//! the other with no host participation.
//!
//! The channels are fully independent: no ordering holds between their
//! completions, and each serves exactly one descriptor at a time, in issue
//! order. Once issued, a descriptor cannot be aborted; the only way out is
//! completion or a domain reset.
//!
//! # Usage
//!
//! ```ignore
//! use pcie_dma_emu::soc::dma::{ChannelDir, DmaDescriptor, DmaEngine};
//!
//! let mut engine = DmaEngine::new(true, true);
//! engine.set_loopback(true);
//! engine.set_enabled(ChannelDir::Writer, true);
//! engine.set_enabled(ChannelDir::Reader, true);
//!
//! engine.push_descriptor(ChannelDir::Writer, DmaDescriptor::new(0x1000, 256))?;
//! engine.push_descriptor(ChannelDir::Reader, DmaDescriptor::new(0x2000, 256))?;
//!
//! // Step the engine each cycle
//! while !engine.idle(ChannelDir::Reader) {
//!     let irqs = engine.step(&mut host_memory);
//! }
//! ```

use super::table::DescriptorTable;
use super::{ChannelDir, DmaDescriptor, DmaError};
use crate::soc::constants::{DMA_DATA_WIDTH_BYTES, DMA_FIFO_DEPTH_WORDS, DMA_WORDS_PER_CYCLE};
use crate::soc::host_memory::HostMemory;
use crate::soc::stream::{StreamFifo, StreamWord};

/// State of a DMA channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No descriptor in service
    #[default]
    Idle,
    /// A descriptor is being serviced
    Active,
}

/// Statistics for a DMA channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelStats {
    /// Total descriptors completed
    pub descriptors_completed: u64,
    /// Total bytes transferred
    pub bytes_transferred: u64,
    /// Cycles spent stalled on backpressure or starvation
    pub stall_cycles: u64,
}

/// Completion interrupt pulses produced by one `step()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmaIrqs {
    pub writer: bool,
    pub reader: bool,
}

/// Descriptor in service on a channel.
#[derive(Debug, Clone, Copy)]
struct ActiveTransfer {
    desc: DmaDescriptor,
    /// Bytes moved so far
    offset: u32,
}

/// One directional channel: descriptor table, stream FIFO, bookkeeping.
#[derive(Debug)]
struct Channel {
    dir: ChannelDir,
    enabled: bool,
    table: DescriptorTable,
    current: Option<ActiveTransfer>,
    fifo: StreamFifo,
    /// Completion pulse for the current cycle
    irq: bool,
    stats: ChannelStats,
}

impl Channel {
    fn new(dir: ChannelDir, fifo_depth: usize) -> Self {
        Self {
            dir,
            enabled: false,
            table: DescriptorTable::new(dir),
            current: None,
            fifo: StreamFifo::new(fifo_depth),
            irq: false,
            stats: ChannelStats::default(),
        }
    }

    fn complete(&mut self, desc: DmaDescriptor) {
        self.table.mark_processed();
        self.stats.descriptors_completed += 1;
        if !desc.irq_disable {
            self.irq = true;
        }
        log::debug!(
            "dma {} descriptor complete: addr=0x{:X} len={}",
            self.dir,
            desc.address,
            desc.length
        );
    }

    fn reset(&mut self) {
        self.enabled = false;
        self.table.reset();
        self.current = None;
        self.fifo.clear();
        self.irq = false;
        // Stats are emulator-side accounting and survive a domain reset
    }
}

/// DMA engine: writer and reader channels plus the loopback path.
#[derive(Debug)]
pub struct DmaEngine {
    writer: Channel,
    reader: Channel,
    with_buffering: bool,
    loopback_built: bool,
    loopback_enabled: bool,
}

impl DmaEngine {
    /// Create an engine.
    ///
    /// `with_buffering` sizes the per-channel elastic buffers; without it
    /// each stream port carries a single-word register slice. The loopback
    /// path only exists when `with_loopback` is set at build time.
    pub fn new(with_buffering: bool, with_loopback: bool) -> Self {
        let fifo_depth = if with_buffering { DMA_FIFO_DEPTH_WORDS } else { 1 };
        log::debug!(
            "DmaEngine::new buffering={} loopback={} fifo_depth={}",
            with_buffering,
            with_loopback,
            fifo_depth
        );
        Self {
            writer: Channel::new(ChannelDir::Writer, fifo_depth),
            reader: Channel::new(ChannelDir::Reader, fifo_depth),
            with_buffering,
            loopback_built: with_loopback,
            loopback_enabled: false,
        }
    }

    fn channel(&self, dir: ChannelDir) -> &Channel {
        match dir {
            ChannelDir::Writer => &self.writer,
            ChannelDir::Reader => &self.reader,
        }
    }

    fn channel_mut(&mut self, dir: ChannelDir) -> &mut Channel {
        match dir {
            ChannelDir::Writer => &mut self.writer,
            ChannelDir::Reader => &mut self.reader,
        }
    }

    /// Run/stop a channel. A stopped channel holds its state.
    pub fn set_enabled(&mut self, dir: ChannelDir, enable: bool) {
        self.channel_mut(dir).enabled = enable;
    }

    pub fn enabled(&self, dir: ChannelDir) -> bool {
        self.channel(dir).enabled
    }

    /// Idle: no descriptor in service and none queued.
    pub fn idle(&self, dir: ChannelDir) -> bool {
        let ch = self.channel(dir);
        ch.current.is_none() && ch.table.is_empty()
    }

    pub fn channel_state(&self, dir: ChannelDir) -> ChannelState {
        if self.channel(dir).current.is_some() {
            ChannelState::Active
        } else {
            ChannelState::Idle
        }
    }

    pub fn stats(&self, dir: ChannelDir) -> &ChannelStats {
        &self.channel(dir).stats
    }

    pub fn table(&self, dir: ChannelDir) -> &DescriptorTable {
        &self.channel(dir).table
    }

    pub fn table_mut(&mut self, dir: ChannelDir) -> &mut DescriptorTable {
        &mut self.channel_mut(dir).table
    }

    /// Queue a descriptor directly (bypassing the CSR staging protocol).
    pub fn push_descriptor(&mut self, dir: ChannelDir, desc: DmaDescriptor) -> Result<(), DmaError> {
        self.channel_mut(dir).table.push(desc)
    }

    /// Whether the loopback path exists in this build.
    pub fn loopback_built(&self) -> bool {
        self.loopback_built
    }

    /// Gate the loopback path. Ignored when it was not built.
    pub fn set_loopback(&mut self, enable: bool) {
        if enable && !self.loopback_built {
            log::warn!("loopback enable ignored: path not built");
            return;
        }
        self.loopback_enabled = enable;
    }

    pub fn loopback_enabled(&self) -> bool {
        self.loopback_enabled
    }

    pub fn with_buffering(&self) -> bool {
        self.with_buffering
    }

    /// FIFO occupancy in words (`fifo_status` CSR).
    pub fn fifo_level(&self, dir: ChannelDir) -> usize {
        self.channel(dir).fifo.len()
    }

    /// Flush a channel FIFO (`fifo_control` CSR, write-1).
    pub fn flush_fifo(&mut self, dir: ChannelDir) {
        let ch = self.channel_mut(dir);
        if !ch.fifo.is_empty() {
            log::debug!("dma {} fifo flushed ({} words)", dir, ch.fifo.len());
        }
        ch.fifo.clear();
    }

    /// Pop a word from the writer's source port (external consumer).
    ///
    /// Only meaningful while loopback is disabled.
    pub fn pop_source(&mut self) -> Option<StreamWord> {
        self.writer.fifo.pop()
    }

    /// Offer a word to the reader's sink port (external producer).
    ///
    /// Returns `false` (backpressure) when the reader cannot accept it.
    pub fn push_sink(&mut self, word: StreamWord) -> bool {
        self.reader.fifo.push(word)
    }

    /// Advance both channels by one cycle.
    pub fn step(&mut self, host: &mut HostMemory) -> DmaIrqs {
        self.writer.irq = false;
        self.reader.irq = false;

        self.step_writer(host);
        self.move_loopback();
        self.step_reader(host);

        DmaIrqs { writer: self.writer.irq, reader: self.reader.irq }
    }

    /// Writer: host memory -> stream FIFO.
    fn step_writer(&mut self, host: &mut HostMemory) {
        let ch = &mut self.writer;
        if !ch.enabled {
            return;
        }

        if ch.current.is_none() {
            let Some(desc) = ch.table.pop_next() else { return };
            log::debug!("dma writer start: addr=0x{:X} len={}", desc.address, desc.length);
            if desc.length == 0 {
                // Completes immediately, still exactly one completion
                ch.complete(desc);
                return;
            }
            ch.current = Some(ActiveTransfer { desc, offset: 0 });
        }

        let mut moved = 0;
        while moved < DMA_WORDS_PER_CYCLE {
            if ch.fifo.is_full() {
                // Backpressure: the host-side word is simply not consumed yet
                ch.stats.stall_cycles += 1;
                break;
            }
            let transfer = ch.current.as_mut().expect("BUG: writer transfer missing");
            let remaining = transfer.desc.length - transfer.offset;
            let addr = transfer.desc.address + transfer.offset as u64;
            let word = host.read_u32(addr);
            let is_final = remaining <= DMA_DATA_WIDTH_BYTES as u32;
            let last = is_final && !transfer.desc.last_disable;
            let pushed = ch.fifo.push(StreamWord { data: word, last });
            debug_assert!(pushed, "fifo refused a push after is_full check");

            let chunk = remaining.min(DMA_DATA_WIDTH_BYTES as u32);
            transfer.offset += chunk;
            ch.stats.bytes_transferred += chunk as u64;
            moved += 1;

            if is_final {
                let desc = ch.current.take().expect("BUG: writer transfer vanished").desc;
                ch.complete(desc);
                // The next descriptor starts on a later cycle; back-to-back
                // descriptors never merge or reorder
                break;
            }
        }
    }

    /// Reader: stream FIFO -> host memory.
    fn step_reader(&mut self, host: &mut HostMemory) {
        let ch = &mut self.reader;
        if !ch.enabled {
            return;
        }

        if ch.current.is_none() {
            let Some(desc) = ch.table.pop_next() else { return };
            log::debug!("dma reader start: addr=0x{:X} len={}", desc.address, desc.length);
            if desc.length == 0 {
                ch.complete(desc);
                return;
            }
            ch.current = Some(ActiveTransfer { desc, offset: 0 });
        }

        let mut moved = 0;
        while moved < DMA_WORDS_PER_CYCLE {
            let Some(word) = ch.fifo.pop() else {
                // Starved: wait for the producer, not an error
                ch.stats.stall_cycles += 1;
                break;
            };
            let transfer = ch.current.as_mut().expect("BUG: reader transfer missing");
            let remaining = transfer.desc.length - transfer.offset;
            let chunk = remaining.min(DMA_DATA_WIDTH_BYTES as u32);
            let addr = transfer.desc.address + transfer.offset as u64;
            let bytes = word.data.to_le_bytes();
            host.write_bytes(addr, &bytes[..chunk as usize]);
            transfer.offset += chunk;
            ch.stats.bytes_transferred += chunk as u64;
            moved += 1;

            let finished = transfer.offset >= transfer.desc.length
                || (word.last && !transfer.desc.last_disable);
            if finished {
                let desc = ch.current.take().expect("BUG: reader transfer vanished").desc;
                ch.complete(desc);
                break;
            }
        }
    }

    /// Loopback: writer source -> reader sink, no host participation.
    fn move_loopback(&mut self) {
        if !(self.loopback_built && self.loopback_enabled) {
            return;
        }
        for _ in 0..DMA_WORDS_PER_CYCLE {
            if self.reader.fifo.is_full() {
                break;
            }
            let Some(word) = self.writer.fifo.pop() else { break };
            let pushed = self.reader.fifo.push(word);
            debug_assert!(pushed, "loopback push refused after is_full check");
        }
    }

    /// Return every channel to its power-on state (domain reset).
    pub fn reset(&mut self) {
        self.writer.reset();
        self.reader.reset();
        self.loopback_enabled = false;
    }
}
