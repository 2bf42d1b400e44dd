// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARMv7-M System Control Space debug registers
//!
//! These are memory mapped, and are reached over the AHB bus via the MEM-AP,
//! rather than being DP/AP registers.

use crate::register_data_w;
use core::fmt;

/// Debug Halting Control and Status Register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dhcsr(u32);

impl Dhcsr {
    /// Memory address of this register
    pub const ADDRESS: u32 = 0xE000_EDF0;

    /// Must be written to bits 31:16 for any write to take effect.
    pub const DBGKEY: u32 = 0xA05F << 16;

    pub const C_DEBUGEN: u32 = 1 << 0;
    pub const C_HALT: u32 = 1 << 1;
    pub const C_STEP: u32 = 1 << 2;
    pub const S_REGRDY: u32 = 1 << 16;
    pub const S_HALT: u32 = 1 << 17;

    /// Debug enabled, core not halted by this write: 0xA05F0001.
    pub const fn debug_enable() -> Self {
        Dhcsr(Self::DBGKEY | Self::C_DEBUGEN)
    }

    /// Key only, with C_DEBUGEN, C_HALT and C_STEP clear: 0xA05F0000.
    pub const fn release() -> Self {
        Dhcsr(Self::DBGKEY)
    }

    /// Whether the core is halted in debug state.
    pub fn halted(&self) -> bool {
        self.0 & Self::S_HALT != 0
    }

    /// Whether the last DCRSR transfer has completed.
    pub fn regrdy(&self) -> bool {
        self.0 & Self::S_REGRDY != 0
    }

    /// Whether halting debug is enabled.
    pub fn debugen(&self) -> bool {
        self.0 & Self::C_DEBUGEN != 0
    }
}

impl From<u32> for Dhcsr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Dhcsr> for u32 {
    fn from(dhcsr: Dhcsr) -> Self {
        dhcsr.0
    }
}

impl fmt::Display for Dhcsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(
                f,
                "0x{:08X} (DEBUGEN: {}, HALTED: {}, REGRDY: {})",
                self.0,
                self.debugen(),
                self.halted(),
                self.regrdy()
            )
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

/// Debug Core Register Selector Register.  Write-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dcrsr(u32);

register_data_w!(Dcrsr);

impl Dcrsr {
    /// Memory address of this register
    pub const ADDRESS: u32 = 0xE000_EDF4;

    /// Set to write DCRDR to the selected register, clear to read it.
    pub const REGWNR: u32 = 1 << 16;

    const REGSEL_MASK: u32 = 0x7F;

    /// Selector for transferring register `reg` into DCRDR.
    pub const fn read(reg: CoreRegister) -> Self {
        Dcrsr(reg.index() & Self::REGSEL_MASK)
    }

    /// Selector for transferring DCRDR into register `reg`.
    pub const fn write(reg: CoreRegister) -> Self {
        Dcrsr((reg.index() & Self::REGSEL_MASK) | Self::REGWNR)
    }

    /// Decodes a raw selector value, as seen by the target.
    pub fn decode(raw: u32) -> (u32, bool) {
        (raw & Self::REGSEL_MASK, raw & Self::REGWNR != 0)
    }
}

/// Debug Core Register Data Register
pub struct Dcrdr;

impl Dcrdr {
    /// Memory address of this register
    pub const ADDRESS: u32 = 0xE000_EDF8;
}

/// Debug Exception and Monitor Control Register
pub struct Demcr;

impl Demcr {
    /// Memory address of this register
    pub const ADDRESS: u32 = 0xE000_EDFC;

    /// Halt on the next reset vector fetch.
    pub const VC_CORERESET: u32 = 1 << 0;
}

/// Application Interrupt and Reset Control Register
pub struct Aircr;

impl Aircr {
    /// Memory address of this register
    pub const ADDRESS: u32 = 0xE000_ED0C;

    pub const VECTKEY: u32 = 0x05FA << 16;
    pub const SYSRESETREQ: u32 = 1 << 2;

    /// Requests a system reset: 0x05FA0004.
    pub const SYSTEM_RESET: u32 = Self::VECTKEY | Self::SYSRESETREQ;
}

/// Vector Table Offset Register
pub struct Vtor;

impl Vtor {
    /// Memory address of this register
    pub const ADDRESS: u32 = 0xE000_ED08;
}

/// Debug Fault Status Register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dfsr(u32);

impl Dfsr {
    /// Memory address of this register
    pub const ADDRESS: u32 = 0xE000_ED30;

    pub const HALTED: u32 = 1 << 0;
    pub const BKPT: u32 = 1 << 1;
    pub const DWTTRAP: u32 = 1 << 2;
    pub const VCATCH: u32 = 1 << 3;
    pub const EXTERNAL: u32 = 1 << 4;

    /// Whether the last halt was caused by a vector catch.
    pub fn vcatch(&self) -> bool {
        self.0 & Self::VCATCH != 0
    }

    /// Describes the recorded halt reasons.
    pub fn reasons(&self) -> &'static str {
        match self.0 & 0x1F {
            0 => "none",
            Self::HALTED => "halt request",
            Self::BKPT => "breakpoint",
            Self::DWTTRAP => "watchpoint",
            Self::VCATCH => "vector catch",
            Self::EXTERNAL => "external",
            _ => "multiple",
        }
    }
}

impl From<u32> for Dfsr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Dfsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} ({})", self.0, self.reasons())
    }
}

/// Cortex-M core register, as selected by DCRSR.REGSEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreRegister {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    /// Stack pointer, R13
    Sp,
    /// Link register, R14
    Lr,
    /// Program counter (debug return address), R15
    Pc,
    /// Combined program status register
    Xpsr,
}

impl CoreRegister {
    const ALL: [CoreRegister; 17] = [
        CoreRegister::R0,
        CoreRegister::R1,
        CoreRegister::R2,
        CoreRegister::R3,
        CoreRegister::R4,
        CoreRegister::R5,
        CoreRegister::R6,
        CoreRegister::R7,
        CoreRegister::R8,
        CoreRegister::R9,
        CoreRegister::R10,
        CoreRegister::R11,
        CoreRegister::R12,
        CoreRegister::Sp,
        CoreRegister::Lr,
        CoreRegister::Pc,
        CoreRegister::Xpsr,
    ];

    /// DCRSR.REGSEL value for this register
    pub const fn index(&self) -> u32 {
        *self as u32
    }

    /// Maps a REGSEL value back to a register.
    pub fn from_index(index: u32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|index| Self::ALL.get(index))
            .copied()
    }

    /// General purpose register `Rn`, for `n` in 0 to 12.
    pub fn general(n: u8) -> Option<Self> {
        match n {
            0..=12 => Self::from_index(n as u32),
            _ => None,
        }
    }
}

impl fmt::Display for CoreRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreRegister::Sp => write!(f, "SP"),
            CoreRegister::Lr => write!(f, "LR"),
            CoreRegister::Pc => write!(f, "PC"),
            CoreRegister::Xpsr => write!(f, "xPSR"),
            general => write!(f, "R{}", general.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn control_values() {
        assert_eq!(u32::from(Dhcsr::debug_enable()), 0xA05F_0001);
        assert_eq!(u32::from(Dhcsr::release()), 0xA05F_0000);
        assert_eq!(Aircr::SYSTEM_RESET, 0x05FA_0004);
        assert_eq!(Demcr::VC_CORERESET, 0x1);
    }

    #[test]
    fn dcrsr_selectors() {
        assert_eq!(u32::from(Dcrsr::write(CoreRegister::Pc)), 0x0001_000F);
        assert_eq!(u32::from(Dcrsr::read(CoreRegister::Pc)), 0x0000_000F);
        assert_eq!(u32::from(Dcrsr::write(CoreRegister::Sp)), 0x0001_000D);
        assert_eq!(Dcrsr::decode(0x0001_000D), (13, true));
        assert_eq!(Dcrsr::decode(0x0000_0003), (3, false));
    }

    #[test]
    fn core_register_indices() {
        for index in 0..=16 {
            let reg = CoreRegister::from_index(index).unwrap();
            assert_eq!(reg.index(), index);
        }
        assert_eq!(CoreRegister::from_index(17), None);
        assert_eq!(CoreRegister::Sp.to_string(), "SP");
        assert_eq!(CoreRegister::R12.to_string(), "R12");
    }

    #[test]
    fn general_registers_bounded() {
        assert_eq!(CoreRegister::general(0), Some(CoreRegister::R0));
        assert_eq!(CoreRegister::general(12), Some(CoreRegister::R12));
        assert_eq!(CoreRegister::general(13), None);
        assert_eq!(CoreRegister::general(200), None);
    }

    #[test]
    fn dfsr_reasons() {
        let dfsr = Dfsr::from(Dfsr::VCATCH);
        assert!(dfsr.vcatch());
        assert_eq!(dfsr.reasons(), "vector catch");
        assert_eq!(Dfsr::from(0x9).reasons(), "multiple");
    }
}
