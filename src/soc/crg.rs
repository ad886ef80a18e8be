//! Clock/reset generation and domain bridging.
//!
//! The operating (`sys`) clock is the PCIe-recovered clock; the two domains
//! are plesiochronous by construction and only reset crosses between them.
//! The `sys` reset is the OR of two causes, combined before the
//! synchronizer:
//!
//! ```text
//!  pcie reset ────────────┐
//!                         ├─ OR ──► async-assert/sync-release ──► sys reset
//!  soft_rst CSR ─► delay ─┘         synchronizer
//!              (125 cycles)
//! ```
//!
//! The soft-reset delay lets a bus transaction that was initiated over PCIe
//! retire before the domain it is talking to goes away. A request is
//! fire-and-forget: exactly one pulse per request, no retries, and host
//! software re-establishes whatever was in flight afterwards.

use super::constants::{RESET_SYNC_STAGES, SOFT_RESET_DELAY_CYCLES};

/// Soft-reset request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftResetPhase {
    /// No request pending
    #[default]
    Idle,
    /// Request latched, counting down the grace window
    Countdown {
        /// Cycles left before the pulse cycle
        remaining: u32,
    },
    /// Final cycle of the window: the reset pulse itself
    Pulse,
}

/// Reset synchronizer: asynchronous assert, synchronous release.
///
/// Assertion propagates to the output in the same cycle; release marches
/// through the stage registers so the downstream domain never sees a
/// partially-released reset.
#[derive(Debug, Clone)]
pub struct ResetSynchronizer {
    stages: [bool; RESET_SYNC_STAGES],
}

impl ResetSynchronizer {
    /// Create a synchronizer with the reset already released.
    pub fn new() -> Self {
        Self { stages: [false; RESET_SYNC_STAGES] }
    }

    /// Advance one cycle of the consuming clock. Returns the synchronized
    /// reset level.
    pub fn step(&mut self, raw: bool) -> bool {
        if raw {
            self.stages = [true; RESET_SYNC_STAGES];
            return true;
        }
        let out = self.stages[RESET_SYNC_STAGES - 1];
        for i in (1..RESET_SYNC_STAGES).rev() {
            self.stages[i] = self.stages[i - 1];
        }
        self.stages[0] = false;
        out
    }
}

impl Default for ResetSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock/reset domain bridge.
#[derive(Debug, Clone)]
pub struct Crg {
    phase: SoftResetPhase,
    sync: ResetSynchronizer,
    sys_rst: bool,
    soft_resets_issued: u64,
}

impl Crg {
    pub fn new() -> Self {
        Self {
            phase: SoftResetPhase::Idle,
            sync: ResetSynchronizer::new(),
            sys_rst: false,
            soft_resets_issued: 0,
        }
    }

    /// Handle a write to the `soft_rst` CSR.
    ///
    /// Bit 0 set latches a request. Requests while one is already pending
    /// are ignored; the window is never extended or restarted.
    pub fn write_soft_rst(&mut self, value: u32) {
        if value & 1 == 0 {
            return;
        }
        if self.phase == SoftResetPhase::Idle {
            log::info!(
                "soft reset armed, pulse in {} cycles",
                SOFT_RESET_DELAY_CYCLES
            );
            self.phase = SoftResetPhase::Countdown { remaining: SOFT_RESET_DELAY_CYCLES - 1 };
        } else {
            log::debug!("soft reset request ignored, one already pending");
        }
    }

    /// Advance one `sys` clock cycle.
    ///
    /// `pcie_rst` is the upstream recovered-clock-domain reset level.
    /// Returns the synchronized `sys` reset level for this cycle.
    pub fn step(&mut self, pcie_rst: bool) -> bool {
        let soft_pulse = match self.phase {
            SoftResetPhase::Idle => false,
            SoftResetPhase::Countdown { remaining } => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.phase = SoftResetPhase::Pulse;
                } else {
                    self.phase = SoftResetPhase::Countdown { remaining };
                }
                false
            }
            SoftResetPhase::Pulse => {
                self.phase = SoftResetPhase::Idle;
                self.soft_resets_issued += 1;
                log::info!("soft reset pulse asserted");
                true
            }
        };

        self.sys_rst = self.sync.step(pcie_rst || soft_pulse);
        self.sys_rst
    }

    /// Current synchronized `sys` reset level.
    pub fn sys_rst(&self) -> bool {
        self.sys_rst
    }

    /// Whether a soft-reset request is pending (countdown or pulse cycle).
    pub fn soft_reset_pending(&self) -> bool {
        self.phase != SoftResetPhase::Idle
    }

    /// Number of soft-reset pulses issued since construction.
    pub fn soft_resets_issued(&self) -> u64 {
        self.soft_resets_issued
    }
}

impl Default for Crg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inert_without_request() {
        let mut crg = Crg::new();
        for _ in 0..1000 {
            assert!(!crg.step(false));
        }
        assert_eq!(crg.soft_resets_issued(), 0);
    }

    #[test]
    fn test_upstream_reset_passthrough() {
        let mut crg = Crg::new();
        assert!(crg.step(true), "assertion must propagate in the same cycle");
        assert!(crg.step(true));
        // Synchronous release: two more cycles of assertion after the cause clears
        assert!(crg.step(false));
        assert!(crg.step(false));
        assert!(!crg.step(false));
    }

    #[test]
    fn test_soft_reset_pulse_after_delay() {
        let mut crg = Crg::new();
        crg.write_soft_rst(1);

        for cycle in 1..SOFT_RESET_DELAY_CYCLES {
            assert!(!crg.step(false), "reset asserted early at cycle {}", cycle);
        }
        // The 125th cycle after the write is the pulse
        assert!(crg.step(false));
        assert_eq!(crg.soft_resets_issued(), 1);

        // Sync release tail, then quiet forever
        crg.step(false);
        crg.step(false);
        for _ in 0..500 {
            assert!(!crg.step(false));
        }
        assert_eq!(crg.soft_resets_issued(), 1);
    }

    #[test]
    fn test_write_without_bit_set_is_ignored() {
        let mut crg = Crg::new();
        crg.write_soft_rst(0);
        crg.write_soft_rst(0xFFFF_FFFE);
        assert!(!crg.soft_reset_pending());
    }

    #[test]
    fn test_retrigger_during_countdown_ignored() {
        let mut crg = Crg::new();
        crg.write_soft_rst(1);
        for _ in 0..50 {
            crg.step(false);
        }
        // A second request mid-window neither extends nor restarts it
        crg.write_soft_rst(1);
        for _ in 0..(SOFT_RESET_DELAY_CYCLES * 3) {
            crg.step(false);
        }
        assert_eq!(crg.soft_resets_issued(), 1);
    }

    #[test]
    fn test_second_request_after_completion() {
        let mut crg = Crg::new();
        for request in 0..2 {
            crg.write_soft_rst(1);
            let mut saw_pulse = false;
            for _ in 0..(SOFT_RESET_DELAY_CYCLES + RESET_SYNC_STAGES as u32 + 4) {
                if crg.step(false) {
                    saw_pulse = true;
                }
            }
            assert!(saw_pulse, "request {} produced no pulse", request);
            assert_eq!(crg.soft_resets_issued(), request + 1);
        }
    }

    #[test]
    fn test_synchronizer_release_latency() {
        let mut sync = ResetSynchronizer::new();
        assert!(sync.step(true));
        assert!(sync.step(false));
        assert!(sync.step(false));
        assert!(!sync.step(false));
    }
}
