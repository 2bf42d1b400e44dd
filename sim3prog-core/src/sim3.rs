// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! sim3prog-core - SiLabs SiM3 specific objects
//!
//! Most SiM3 peripheral registers occupy 16 bytes: the register itself,
//! followed by SET and CLR aliases which set or clear the bits written to
//! them, leaving the others unchanged.

use core::fmt;
use static_assertions::const_assert;

/// SiM3 flash base address
pub const SIM3_FLASH_BASE: u32 = 0x0000_0000;

/// SiM3 SRAM base address
pub const SIM3_SRAM_BASE: u32 = 0x2000_0000;

/// Top of the 32KB SRAM on SiM3U1x7 parts, used as the initial stack
/// pointer for images loaded into SRAM.
pub const SIM3_SRAM_TOP: u32 = 0x2000_8000;

/// Flash page size in bytes.  Page erase clears the whole page containing
/// the given address.
pub const SIM3_FLASH_PAGE_SIZE: u32 = 1024;

const_assert!(SIM3_FLASH_PAGE_SIZE.is_power_of_two());
const_assert!(SIM3_SRAM_TOP > SIM3_SRAM_BASE);

// FLASHCTRL register base address
const FLASHCTRL_REG_BASE: u32 = 0x4002_E000;

// CLKCTRL register base address
const CLKCTRL_REG_BASE: u32 = 0x4002_D000;

/// Returns the base address of the flash page containing `addr`.
pub fn page_base(addr: u32) -> u32 {
    addr & !(SIM3_FLASH_PAGE_SIZE - 1)
}

/// FLASHCTRL CONFIG register
///
/// Used to select between writes and page erases, sequential writes, and to
/// check whether the flash controller is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashConfig(u32);

impl FlashConfig {
    /// Memory address of this register
    pub const ADDRESS: u32 = FLASHCTRL_REG_BASE;
    /// Set alias: bits written as 1 are set
    pub const SET_ADDRESS: u32 = FLASHCTRL_REG_BASE + 0x04;
    /// Clear alias: bits written as 1 are cleared
    pub const CLR_ADDRESS: u32 = FLASHCTRL_REG_BASE + 0x08;

    /// A flash write or erase is in progress
    pub const BUSY_MASK: u32 = 0x0010_0000;
    /// The write data buffer is full
    pub const DATA_BUSY_MASK: u32 = 0x0008_0000;
    /// Writes to WRITE_DATA erase the page at WRITE_ADDRESS rather than
    /// program it
    pub const ERASE_ENABLE_MASK: u32 = 0x0004_0000;
    /// Sequential, double buffered, writes with WRITE_ADDRESS auto-increment
    pub const SEQUENTIAL_MASK: u32 = 0x0001_0000;

    /// Whether a flash operation is in progress.
    pub fn busy(&self) -> bool {
        self.0 & Self::BUSY_MASK != 0
    }

    /// Whether the write data buffer is full.
    pub fn data_busy(&self) -> bool {
        self.0 & Self::DATA_BUSY_MASK != 0
    }

    pub fn erase_enabled(&self) -> bool {
        self.0 & Self::ERASE_ENABLE_MASK != 0
    }

    pub fn sequential(&self) -> bool {
        self.0 & Self::SEQUENTIAL_MASK != 0
    }
}

impl From<u32> for FlashConfig {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FlashConfig> for u32 {
    fn from(config: FlashConfig) -> Self {
        config.0
    }
}

impl fmt::Display for FlashConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)?;
        if f.alternate() {
            write!(
                f,
                " (BUSY: {}, ERASE: {}, SEQUENTIAL: {})",
                self.busy(),
                self.erase_enabled(),
                self.sequential()
            )?;
        }
        Ok(())
    }
}

/// FLASHCTRL WRITE_ADDRESS register
///
/// Target of the next write, or any address in the page to erase.
pub struct FlashWriteAddress;

impl FlashWriteAddress {
    /// Memory address of this register
    pub const ADDRESS: u32 = FLASHCTRL_REG_BASE + 0xA0;
}

/// FLASHCTRL WRITE_DATA register
///
/// Flash is programmed 16 bits at a time through this register.  With
/// ERASE_ENABLE set, any write starts a page erase.
pub struct FlashWriteData;

impl FlashWriteData {
    /// Memory address of this register
    pub const ADDRESS: u32 = FLASHCTRL_REG_BASE + 0xB0;

    /// Half-word mask.  Each write programs one half-word.
    pub const HALF_WORD_MASK: u32 = 0x0000_FFFF;
}

/// FLASHCTRL KEY register values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashKey;

impl FlashKey {
    /// Memory address of this register
    pub const ADDRESS: u32 = FLASHCTRL_REG_BASE + 0xC0;

    /// First key of both unlock sequences
    pub const KEY1: u32 = 0xA5;
    /// Second key: unlock the next write or erase only
    pub const UNLOCK_NEXT: u32 = 0xF1;
    /// Second key: unlock all writes and erases until re-locked
    pub const UNLOCK_ALL: u32 = 0xF2;
    /// Lock all writes and erases
    pub const LOCK: u32 = 0x5A;
}

/// CLKCTRL APBCLKG0 register
///
/// APB clock gates.  The FLASHCTRL gate is at a different bit on SiM3L1xx and
/// SiM3U/C1xx parts, so all gates are enabled.
pub struct ApbClkG0;

impl ApbClkG0 {
    /// Memory address of this register
    pub const ADDRESS: u32 = CLKCTRL_REG_BASE + 0x20;
    /// Set alias
    pub const SET_ADDRESS: u32 = CLKCTRL_REG_BASE + 0x24;
    /// Clear alias
    pub const CLR_ADDRESS: u32 = CLKCTRL_REG_BASE + 0x28;

    /// Enable all APB peripheral clocks
    pub const ENABLE_ALL: u32 = 0xFFFF_FFFF;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_addresses() {
        assert_eq!(FlashConfig::ADDRESS, 0x4002_E000);
        assert_eq!(FlashConfig::SET_ADDRESS, 0x4002_E004);
        assert_eq!(FlashConfig::CLR_ADDRESS, 0x4002_E008);
        assert_eq!(FlashWriteAddress::ADDRESS, 0x4002_E0A0);
        assert_eq!(FlashWriteData::ADDRESS, 0x4002_E0B0);
        assert_eq!(FlashKey::ADDRESS, 0x4002_E0C0);
        assert_eq!(ApbClkG0::SET_ADDRESS, 0x4002_D024);
    }

    #[test]
    fn page_bases() {
        assert_eq!(page_base(0x0000_0200), 0x0000_0000);
        assert_eq!(page_base(0x0000_0400), 0x0000_0400);
        assert_eq!(page_base(0x0000_07FC), 0x0000_0400);
    }

    #[test]
    fn flash_config_flags() {
        let config = FlashConfig::from(FlashConfig::BUSY_MASK | FlashConfig::SEQUENTIAL_MASK);
        assert!(config.busy());
        assert!(config.sequential());
        assert!(!config.erase_enabled());
        assert!(!config.data_busy());
    }
}
