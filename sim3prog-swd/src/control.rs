// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Core control
//!
//! Identifies the SiLabs Chip AP, and halts, resets and releases the target
//! core using the Chip AP and the ARMv7-M debug registers.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use sim3prog_core::arm::scs::{Aircr, Demcr, Dfsr, Dhcsr};
use sim3prog_core::chipap::{ChipApId, Ctrl1, Ctrl1Register, IdRegister};

use crate::SwdError;
use crate::interface::SwdInterface;
use crate::session::{CoreState, Session};
use crate::transport::Transport;

// How often an unbounded poll logs that it is still waiting
const POLL_LOG_INTERVAL: u32 = 1000;

/// How long to keep polling a busy flag.
///
/// The hardware always clears its busy flags eventually, so by default polls
/// never give up.  A bounded limit turns a hung target into
/// [`SwdError::Timeout`] instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollLimit {
    /// Poll until the flag clears
    #[default]
    Unbounded,
    /// Give up after this many polls
    Attempts(u32),
}

impl<T: Transport> Session<T> {
    /// Reads and checks the Chip AP identity register.
    ///
    /// Must succeed before any Chip AP or flash operation is attempted.  It
    /// is never retried internally: a mismatch means this is not a SiM3
    /// device.
    ///
    /// Returns:
    /// - `Ok(ChipApId)`: the identity, which is `0x02430002`.
    /// - `Err(SwdError::ChipApMismatch)`: if any other value was read.
    /// - `Err(SwdError)`: if the read failed.
    pub fn identify(&mut self) -> Result<ChipApId, SwdError> {
        self.require_connected()?;

        let id = self.swd_if().read_ap_register(IdRegister)?;
        if !id.is_silabs() {
            warn!(
                "Chip AP ID {id} is not {}, not a SiM3 device",
                ChipApId::EXPECTED
            );
            return Err(SwdError::ChipApMismatch { found: id.data() });
        }

        debug!("Value: Chip AP ID: {id}");
        if self.core_state() == CoreState::Unknown {
            self.set_core_state(CoreState::Identified);
        }
        Ok(id)
    }

    /// Halts the core at its reset vector.
    ///
    /// Holds the core in reset using the Chip AP, enables halting debug and
    /// reset vector catch, requests a system reset, then releases the core
    /// from reset so that it immediately halts.
    ///
    /// Returns:
    /// - `Ok(())`: the core is halted.
    /// - `Err(SwdError::NotIdentified)`: if [`Self::identify()`] has not
    ///   succeeded on this connection.
    pub fn halt_and_reset(&mut self) -> Result<(), SwdError> {
        self.require_identified()?;

        debug!("Halting and resetting SiM3 core");
        let swd = self.swd_if();
        swd.write_ap_register(Ctrl1Register, Ctrl1::core_reset())?;
        swd.write_ahb(Dhcsr::ADDRESS, Dhcsr::debug_enable().into())?;
        swd.write_ahb(Demcr::ADDRESS, Demcr::VC_CORERESET)?;
        swd.write_ahb(Aircr::ADDRESS, Aircr::SYSTEM_RESET)?;
        swd.write_ap_register(Ctrl1Register, Ctrl1::idle())?;

        // The system reset gated the peripheral clocks
        self.set_clock_enabled(false);
        self.set_core_state(CoreState::Halted);
        Ok(())
    }

    /// Lets a halted core run, by clearing C_HALT and C_STEP in DHCSR.
    pub fn release_core(&mut self) -> Result<(), SwdError> {
        self.require_halted()?;

        debug!("Releasing SiM3 core");
        self.swd_if()
            .write_ahb(Dhcsr::ADDRESS, Dhcsr::release().into())?;
        self.set_core_state(CoreState::Running);
        Ok(())
    }

    /// Reads the core's halt status and the reason for its last halt.
    pub fn halt_status(&mut self) -> Result<(Dhcsr, Dfsr), SwdError> {
        self.require_connected()?;
        let swd = self.swd_if();
        let dhcsr = Dhcsr::from(swd.read_ahb(Dhcsr::ADDRESS)?);
        let dfsr = Dfsr::from(swd.read_ahb(Dfsr::ADDRESS)?);
        trace!("Value: DHCSR {dhcsr:#} DFSR {dfsr}");
        Ok((dhcsr, dfsr))
    }

    /// Reads and clears the adapter's sticky protocol error flags.
    ///
    /// Does not fail because errors were present.  Compare the returned
    /// values to detect them.
    ///
    /// Returns:
    /// - `Ok((before, after))`: the error state before and after clearing.
    pub fn clear_errors(&mut self) -> Result<(u32, u32), SwdError> {
        trace!("Exec:  Clear errors");
        let (before, after) = self.swd_if().transport_mut().clear_errors()?;
        self.record_clear(before, after);
        if before != 0 {
            debug!("Cleared errors 0x{before:08X}, now 0x{after:08X}");
        }
        Ok((before, after))
    }

    /// Polls `busy` until it returns false, within the session's
    /// [`PollLimit`].
    ///
    /// Returns the number of polls made.
    pub(crate) fn poll_while<F>(&mut self, what: &str, mut busy: F) -> Result<u32, SwdError>
    where
        F: FnMut(&mut SwdInterface<T>) -> Result<bool, SwdError>,
    {
        let limit = self.poll_limit();
        let mut polls = 0;
        loop {
            polls += 1;
            if !busy(self.swd_if())? {
                trace!("OK:    {what} complete after {polls} polls");
                return Ok(polls);
            }

            match limit {
                PollLimit::Attempts(max) if polls >= max => {
                    warn!("Gave up waiting for {what} after {polls} polls");
                    return Err(SwdError::Timeout { polls });
                }
                _ => (),
            }

            if polls % POLL_LOG_INTERVAL == 0 {
                debug!("... waiting for {what} to complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTarget;
    use pretty_assertions::assert_eq;

    fn connected(target: SimTarget) -> Session<SimTarget> {
        let mut session = Session::new(target);
        session.open().unwrap();
        session.connect().unwrap();
        session
    }

    #[test]
    fn identify_and_halt() {
        let mut session = connected(SimTarget::new());
        assert_eq!(session.halt_and_reset(), Err(SwdError::NotIdentified));

        let id = session.identify().unwrap();
        assert_eq!(id, ChipApId::EXPECTED);
        assert_eq!(session.core_state(), CoreState::Identified);

        session.halt_and_reset().unwrap();
        assert_eq!(session.core_state(), CoreState::Halted);

        let (dhcsr, dfsr) = session.halt_status().unwrap();
        assert!(dhcsr.halted());
        assert!(dhcsr.debugen());
        assert!(dfsr.vcatch());
        assert!(session.swd_if().transport().core_halted());
    }

    #[test]
    fn identify_mismatch() {
        let mut target = SimTarget::new();
        target.set_chip_ap_id(0x0243_0001);
        let mut session = connected(target);
        assert_eq!(
            session.identify(),
            Err(SwdError::ChipApMismatch { found: 0x0243_0001 })
        );
        assert_eq!(session.core_state(), CoreState::Unknown);
    }

    #[test]
    fn halt_sequence_on_wire() {
        let mut session = connected(SimTarget::new());
        session.identify().unwrap();
        session.swd_if().transport_mut().clear_transactions();
        session.halt_and_reset().unwrap();

        let log = session.swd_if().transport().transactions();
        assert_eq!(log.len(), 5);
        // CTRL1 core_reset_ap, in Chip AP bank 0
        assert_eq!(log[0].accesses()[0].select_value(), Some(0x0A00_0000));
        assert_eq!(log[0].accesses()[1].wire_address(), 0x01);
        let writes: Vec<u32> = log
            .iter()
            .map(|transaction| match transaction.accesses().last().unwrap().direction() {
                crate::transaction::Direction::Write(value) => value,
                crate::transaction::Direction::Read => panic!("unexpected read"),
            })
            .collect();
        assert_eq!(writes, vec![0x8, 0xA05F_0001, 0x1, 0x05FA_0004, 0x0]);
    }

    #[test]
    fn release_runs_core() {
        let mut session = connected(SimTarget::new());
        assert_eq!(session.release_core(), Err(SwdError::NotIdentified));
        session.identify().unwrap();
        assert_eq!(session.release_core(), Err(SwdError::NotHalted));
        session.halt_and_reset().unwrap();
        session.release_core().unwrap();
        assert_eq!(session.core_state(), CoreState::Running);
        let (dhcsr, _) = session.halt_status().unwrap();
        assert!(!dhcsr.halted());
    }

    #[test]
    fn clear_errors_counts() {
        let mut session = connected(SimTarget::new());
        session
            .swd_if()
            .transport_mut()
            .fail_next_execute(crate::AdiStatus::ProtWireError);
        assert!(session.identify().is_err());
        assert_eq!(session.clear_errors().unwrap(), (1, 0));
        let counters = session.error_counters();
        assert_eq!(counters.clears, 2);
        assert_eq!(counters.errors_found, 1);
        session.identify().unwrap();
    }

    #[test]
    fn bounded_poll_times_out() {
        let mut session = connected(SimTarget::new());
        session.set_poll_limit(PollLimit::Attempts(3));
        let mut calls = 0;
        let result = session.poll_while("test", |_| {
            calls += 1;
            Ok(true)
        });
        assert_eq!(result, Err(SwdError::Timeout { polls: 3 }));
        assert_eq!(calls, 3);

        session.set_poll_limit(PollLimit::Unbounded);
        let mut remaining = 2500;
        let polls = session
            .poll_while("test", |_| {
                remaining -= 1;
                Ok(remaining > 0)
            })
            .unwrap();
        assert_eq!(polls, 2500);
    }

    #[test]
    fn poll_limit_config_format() {
        let limit: PollLimit = serde_json::from_str(r#"{"attempts":50}"#).unwrap();
        assert_eq!(limit, PollLimit::Attempts(50));
        let limit: PollLimit = serde_json::from_str(r#""unbounded""#).unwrap();
        assert_eq!(limit, PollLimit::Unbounded);
    }
}
