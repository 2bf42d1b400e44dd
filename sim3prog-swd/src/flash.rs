// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SiM3 flash programming
//!
//! Flash is erased in bulk using the Chip AP, or a page at a time using
//! FLASHCTRL.  It is written 16 bits at a time through FLASHCTRL's
//! WRITE_DATA register, using sequential mode so that WRITE_ADDRESS
//! advances by itself.
//!
//! Every FLASHCTRL write or erase must be preceded by an unlock key sequence,
//! and the controller is locked again afterwards.  If an operation fails part
//! way through, the controller may be left unlocked.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use sim3prog_core::arm::map::Csw;
use sim3prog_core::chipap::{Ctrl1, Ctrl1Register};
use sim3prog_core::sim3::{self, ApbClkG0, FlashConfig, FlashWriteAddress, FlashWriteData};

use crate::SwdError;
use crate::config::ProgrammerConfig;
use crate::session::{CoreState, Session};
use crate::transport::Transport;

/// Second FLASHCTRL unlock key to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKey {
    /// `0xF1`: unlock for the next write or erase only
    UnlockNext,
    /// `0xF2`: unlock until locked again
    #[default]
    UnlockAll,
}

impl FlashKey {
    /// Value written to the KEY register after `0xA5`
    pub fn value(&self) -> u32 {
        match self {
            FlashKey::UnlockNext => sim3::FlashKey::UNLOCK_NEXT,
            FlashKey::UnlockAll => sim3::FlashKey::UNLOCK_ALL,
        }
    }
}

/// Flash programming engine
///
/// Borrows a [`Session`] for its lifetime.  Other than
/// [`Self::bulk_erase()`], every operation needs the core halted, using
/// [`Session::halt_and_reset()`].  The FLASHCTRL clock is enabled
/// automatically when first needed.
///
/// ```rust
/// use sim3prog_swd::{FlashEngine, Session};
/// use sim3prog_swd::sim::SimTarget;
///
/// let mut session = Session::new(SimTarget::new());
/// session.open().unwrap();
/// session.connect().unwrap();
/// session.identify().unwrap();
/// session.halt_and_reset().unwrap();
///
/// let mut flash = FlashEngine::new(&mut session);
/// flash.erase_page(0x0000_0400).unwrap();
/// flash.write_sequential_words(0x0000_0400, &[0x1234_5678]).unwrap();
/// assert_eq!(flash.read_sequential_words(0x0000_0400, 1).unwrap(), vec![0x1234_5678]);
/// ```
#[derive(Debug)]
pub struct FlashEngine<'a, T: Transport> {
    session: &'a mut Session<T>,
    key: FlashKey,
}

impl<'a, T: Transport> FlashEngine<'a, T> {
    pub fn new(session: &'a mut Session<T>) -> Self {
        Self {
            session,
            key: FlashKey::default(),
        }
    }

    /// Sets the unlock key to use.
    pub fn with_key(mut self, key: FlashKey) -> Self {
        self.key = key;
        self
    }

    /// Takes the unlock key from `config`.
    pub fn with_config(self, config: &ProgrammerConfig) -> Self {
        self.with_key(config.flash_key)
    }

    pub fn key(&self) -> FlashKey {
        self.key
    }

    /// Enables the FLASHCTRL APB clock.
    ///
    /// The FLASHCTRL clock gate bit differs between SiM3L1xx and SiM3U/C1xx
    /// parts, so every APB clock is enabled.
    pub fn enable_clock(&mut self) -> Result<(), SwdError> {
        self.session.require_connected()?;
        debug!("Enabling SiM3 APB clocks");
        self.session
            .swd_if()
            .write_ahb(ApbClkG0::SET_ADDRESS, ApbClkG0::ENABLE_ALL)?;
        self.session.set_clock_enabled(true);
        Ok(())
    }

    // Checks the core is halted, and enables the clock if needed.
    fn prepare(&mut self) -> Result<(), SwdError> {
        self.session.require_halted()?;
        if !self.session.clock_enabled() {
            self.enable_clock()?;
        }
        Ok(())
    }

    fn check_address(address: u32) -> Result<(), SwdError> {
        if address & 0x3 != 0 {
            warn!("Unaligned flash address 0x{address:08X}");
            return Err(SwdError::InvalidArgument(format!(
                "flash address 0x{address:08X} is not word aligned"
            )));
        }
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), SwdError> {
        let swd = self.session.swd_if();
        swd.write_ahb(sim3::FlashKey::ADDRESS, sim3::FlashKey::KEY1)?;
        swd.write_ahb(sim3::FlashKey::ADDRESS, self.key.value())
    }

    fn lock(&mut self) -> Result<(), SwdError> {
        self.session
            .swd_if()
            .write_ahb(sim3::FlashKey::ADDRESS, sim3::FlashKey::LOCK)
    }

    /// Erases all user flash using the Chip AP, then pulses a system reset
    /// so that the device unlocks.
    ///
    /// Needs the Chip AP identified, but not the core halted.  Afterwards the
    /// core is in [`CoreState::Reset`], and must be halted again before any
    /// other flash operation.
    ///
    /// Returns:
    /// - `Ok(())`: if the flash was erased.
    /// - `Err(SwdError::NotIdentified)`: if the Chip AP has not been
    ///   identified on this connection.
    /// - `Err(SwdError::Timeout)`: if the session has a bounded
    ///   [`crate::PollLimit`] and the erase did not complete within it.
    pub fn bulk_erase(&mut self) -> Result<(), SwdError> {
        self.session.require_identified()?;

        debug!("Erasing all SiM3 flash");
        self.session
            .swd_if()
            .write_ap_register(Ctrl1Register, Ctrl1::user_erase())?;

        self.session.poll_while("bulk erase", |swd| {
            Ok(swd.read_ap_register(Ctrl1Register)?.erase_busy())
        })?;

        let swd = self.session.swd_if();
        swd.write_ap_register(Ctrl1Register, Ctrl1::sysreset_req())?;
        swd.write_ap_register(Ctrl1Register, Ctrl1::idle())?;

        // The system reset gated the clocks and released the core
        self.session.set_clock_enabled(false);
        self.session.set_core_state(CoreState::Reset);
        info!("SiM3 flash erased");
        Ok(())
    }

    /// Writes `words` to flash, starting at `address`.
    ///
    /// The flash must already be erased.  Each word is written as two
    /// half-words, low half first, one transaction per word.  Nothing is read
    /// back: use [`Self::read_sequential_words()`] to verify.
    ///
    /// Arguments:
    /// - `address`: Word aligned flash address.
    /// - `words`: The words to write.
    pub fn write_sequential_words(&mut self, address: u32, words: &[u32]) -> Result<(), SwdError> {
        Self::check_address(address)?;
        self.prepare()?;
        if words.is_empty() {
            return Ok(());
        }

        debug!("Writing {} words to flash at 0x{address:08X}", words.len());
        let swd = self.session.swd_if();
        swd.write_ahb(FlashConfig::CLR_ADDRESS, FlashConfig::ERASE_ENABLE_MASK)?;
        swd.write_ahb(FlashWriteAddress::ADDRESS, address)?;
        swd.write_ahb(FlashConfig::SET_ADDRESS, FlashConfig::SEQUENTIAL_MASK)?;
        self.unlock()?;

        // DRW now writes straight to WRITE_DATA
        let swd = self.session.swd_if();
        swd.configure_mem_ap(Csw::word(), FlashWriteData::ADDRESS)?;
        for word in words {
            let low = word & FlashWriteData::HALF_WORD_MASK;
            let high = (word >> 16) & FlashWriteData::HALF_WORD_MASK;
            swd.write_drw(&[low, high])?;
        }

        self.lock()
    }

    /// Erases the flash page containing `address`.
    ///
    /// Arguments:
    /// - `address`: Any word aligned address within the page.
    pub fn erase_page(&mut self, address: u32) -> Result<(), SwdError> {
        Self::check_address(address)?;
        self.prepare()?;

        debug!("Erasing flash page 0x{:08X}", sim3::page_base(address));
        let swd = self.session.swd_if();
        swd.write_ahb(FlashConfig::SET_ADDRESS, FlashConfig::ERASE_ENABLE_MASK)?;
        swd.write_ahb(FlashWriteAddress::ADDRESS, address)?;
        self.unlock()?;

        // Any write to WRITE_DATA starts the erase
        self.session.swd_if().write_ahb(FlashWriteData::ADDRESS, 0)?;
        self.session.poll_while("page erase", |swd| {
            Ok(FlashConfig::from(swd.read_ahb(FlashConfig::ADDRESS)?).busy())
        })?;

        self.session
            .swd_if()
            .write_ahb(FlashConfig::CLR_ADDRESS, FlashConfig::ERASE_ENABLE_MASK)?;
        self.lock()
    }

    /// Erases every page overlapping `len` bytes from `address`.
    ///
    /// Returns:
    /// - `Ok(usize)`: the number of pages erased.
    pub fn erase_range(&mut self, address: u32, len: u32) -> Result<usize, SwdError> {
        Self::check_address(address)?;
        if len == 0 {
            return Ok(0);
        }
        let end = address.checked_add(len - 1).ok_or_else(|| {
            SwdError::InvalidArgument(format!(
                "range 0x{address:08X}+0x{len:X} overflows the address space"
            ))
        })?;

        let first = sim3::page_base(address);
        let last = sim3::page_base(end);
        let mut erased = 0;
        let mut page = first;
        loop {
            self.erase_page(page)?;
            erased += 1;
            if page == last {
                break;
            }
            page += sim3::SIM3_FLASH_PAGE_SIZE;
        }

        debug!("Erased {erased} flash pages from 0x{first:08X}");
        Ok(erased)
    }

    /// Reads `count` words of flash from `address`.
    pub fn read_sequential_words(&mut self, address: u32, count: usize) -> Result<Vec<u32>, SwdError> {
        Self::check_address(address)?;
        self.session.require_halted()?;
        self.session.swd_if().read_block(address, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTarget;
    use pretty_assertions::assert_eq;

    fn halted() -> Session<SimTarget> {
        let mut session = Session::new(SimTarget::new());
        session.open().unwrap();
        session.connect().unwrap();
        session.identify().unwrap();
        session.halt_and_reset().unwrap();
        session
    }

    #[test]
    fn key_values() {
        assert_eq!(FlashKey::UnlockNext.value(), 0xF1);
        assert_eq!(FlashKey::UnlockAll.value(), 0xF2);
        assert_eq!(FlashKey::default(), FlashKey::UnlockAll);
    }

    #[test]
    fn write_needs_halted_core() {
        let mut session = Session::new(SimTarget::new());
        session.open().unwrap();
        session.connect().unwrap();
        session.identify().unwrap();
        session.swd_if().transport_mut().clear_transactions();

        let mut flash = FlashEngine::new(&mut session);
        assert_eq!(
            flash.write_sequential_words(0x200, &[1]),
            Err(SwdError::NotHalted)
        );
        assert_eq!(flash.erase_page(0x200), Err(SwdError::NotHalted));
        assert!(session.swd_if().transport().transactions().is_empty());
    }

    #[test]
    fn clock_enabled_on_first_use() {
        let mut session = halted();
        assert!(!session.clock_enabled());
        FlashEngine::new(&mut session)
            .write_sequential_words(0x800, &[0x0102_0304])
            .unwrap();
        assert!(session.clock_enabled());
        assert!(session.swd_if().transport().flash_clock_enabled());
    }

    #[test]
    fn unaligned_rejected() {
        let mut session = halted();
        let mut flash = FlashEngine::new(&mut session);
        assert!(matches!(
            flash.write_sequential_words(0x202, &[1]),
            Err(SwdError::InvalidArgument(_))
        ));
        assert!(matches!(flash.erase_page(0x3), Err(SwdError::InvalidArgument(_))));
    }

    #[test]
    fn erase_range_pages() {
        let mut session = halted();
        let mut flash = FlashEngine::new(&mut session);
        flash.write_sequential_words(0x3FC, &[0, 0]).unwrap();
        flash.write_sequential_words(0xC00, &[0]).unwrap();

        assert_eq!(flash.erase_range(0x3FC, 8).unwrap(), 2);
        assert_eq!(flash.erase_range(0x1000, 0).unwrap(), 0);
        assert_eq!(
            flash.read_sequential_words(0x3FC, 2).unwrap(),
            vec![0xFFFF_FFFF, 0xFFFF_FFFF]
        );
        assert_eq!(flash.read_sequential_words(0xC00, 1).unwrap(), vec![0]);
    }

    #[test]
    fn unlock_next_key() {
        let mut session = halted();
        let mut flash = FlashEngine::new(&mut session).with_key(FlashKey::UnlockNext);
        flash.write_sequential_words(0x400, &[0xAAAA_5555]).unwrap();
        assert_eq!(
            flash.read_sequential_words(0x400, 1).unwrap(),
            vec![0xAAAA_5555]
        );
        flash.erase_page(0x400).unwrap();
        assert_eq!(
            flash.read_sequential_words(0x400, 1).unwrap(),
            vec![0xFFFF_FFFF]
        );
        assert!(session.swd_if().transport().flash_locked());
    }
}
