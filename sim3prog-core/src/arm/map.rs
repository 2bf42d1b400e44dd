// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Memory Access Port Registers
//!
//! On SiM3 devices the AHB-AP is Access Port 0.  Bank 0 holds CSW, TAR and
//! DRW, bank 1 the four banked data registers.

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::register_data_rw;
use alloc::{format, string::String};
use core::fmt;

/// APSEL value of the AHB MEM-AP
pub const MEM_AP_APSEL: u8 = 0x00;

/// Generates a MEM-AP register descriptor
macro_rules! mem_ap_register {
    ($(#[$meta:meta])* $name:ident, $addr:expr, $value:ty) => {
        $(#[$meta])*
        pub struct $name;

        impl RegisterDescriptor for $name {
            const ADDRESS: u8 = $addr;
            type Value = $value;
        }

        impl ReadableRegister for $name {}
        impl WritableRegister for $name {}
        impl ApRegister for $name {
            const APSEL: u8 = MEM_AP_APSEL;
        }
    };
}

mem_ap_register!(
    /// Control/Status Word Register descriptor (read-write)
    CswRegister,
    0x00,
    Csw
);

/// Control/Status Word register data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csw(u32);

// Standard register data impls
register_data_rw!(Csw);

impl Csw {
    const SIZE_MASK: u32 = 0b111;
    const SIZE_SHIFT: u32 = 0;

    const ADDRINC_MASK: u32 = 0b11;
    const ADDRINC_SHIFT: u32 = 4;

    const PROT_MASK: u32 = 0b1111111;
    const PROT_SHIFT: u32 = 24;

    const RESERVED_HIGH: u32 = 1 << 24;

    // Size values
    pub const SIZE_8BIT: u32 = 0b000;
    pub const SIZE_16BIT: u32 = 0b001;
    pub const SIZE_32BIT: u32 = 0b010;

    // Address increment values
    pub const ADDRINC_OFF: u32 = 0b00;
    pub const ADDRINC_SINGLE: u32 = 0b01;
    pub const ADDRINC_PACKED: u32 = 0b10;

    // Prot values
    pub const PROT_MASTER_DEBUG: u32 = 1 << 5;
    pub const PROT_BIT_1: u32 = 1 << 1;

    /// 32-bit transfers, no address increment: 0x23000002.
    ///
    /// Used for single word AHB accesses and for repeated writes to a fixed
    /// peripheral data register.
    pub fn word() -> Self {
        let mut csw = Csw(0);
        // PROT overlaps the reserved bit, so must be set first
        csw.set_prot(Self::PROT_MASTER_DEBUG | Self::PROT_BIT_1);
        csw.set_reserved_high();
        csw.set_size(Self::SIZE_32BIT);
        csw.set_addrinc(Self::ADDRINC_OFF);
        csw
    }

    /// 32-bit transfers, single auto-increment: 0x23000012.
    pub fn word_auto_increment() -> Self {
        let mut csw = Self::word();
        csw.set_addrinc(Self::ADDRINC_SINGLE);
        csw
    }

    /// Get raw register value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Get size field
    pub fn size(&self) -> u32 {
        (self.0 >> Self::SIZE_SHIFT) & Self::SIZE_MASK
    }

    /// Get address increment field
    pub fn addrinc(&self) -> u32 {
        (self.0 >> Self::ADDRINC_SHIFT) & Self::ADDRINC_MASK
    }

    pub fn set_reserved_high(&mut self) {
        self.0 |= Self::RESERVED_HIGH;
    }

    /// Set size field
    pub fn set_size(&mut self, size: u32) {
        self.0 = (self.0 & !(Self::SIZE_MASK << Self::SIZE_SHIFT))
            | ((size & Self::SIZE_MASK) << Self::SIZE_SHIFT);
    }

    /// Set address increment field
    pub fn set_addrinc(&mut self, addrinc: u32) {
        self.0 = (self.0 & !(Self::ADDRINC_MASK << Self::ADDRINC_SHIFT))
            | ((addrinc & Self::ADDRINC_MASK) << Self::ADDRINC_SHIFT);
    }

    /// Set protection field
    pub fn set_prot(&mut self, prot: u32) {
        self.0 = (self.0 & !(Self::PROT_MASK << Self::PROT_SHIFT))
            | ((prot & Self::PROT_MASK) << Self::PROT_SHIFT);
    }

    /// Whether TAR advances after each DRW access
    pub fn auto_increment(&self) -> bool {
        self.addrinc() != Self::ADDRINC_OFF
    }

    /// Get transfer configuration description
    pub fn transfer_config(&self) -> String {
        let size = match self.size() {
            Self::SIZE_8BIT => "8-bit",
            Self::SIZE_16BIT => "16-bit",
            Self::SIZE_32BIT => "32-bit",
            _ => "Reserved",
        };

        let addrinc = match self.addrinc() {
            Self::ADDRINC_OFF => "Off",
            Self::ADDRINC_SINGLE => "Single",
            Self::ADDRINC_PACKED => "Packed",
            _ => "Reserved",
        };

        format!("Size: {size}, AddrInc: {addrinc}")
    }
}

mem_ap_register!(
    /// Transfer Address Register descriptor (read-write)
    TarRegister,
    0x04,
    Tar
);

/// Transfer Address Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tar(u32);

// Standard register data impls
register_data_rw!(Tar);

impl Tar {
    /// Get target address
    pub fn target_address(&self) -> u32 {
        self.0
    }
}

mem_ap_register!(
    /// Data Read/Write Register descriptor (read-write)
    DrwRegister,
    0x0C,
    Drw
);

/// Data Read/Write Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drw(u32);

// Standard register data impls
register_data_rw!(Drw);

impl Drw {
    /// Get data value
    pub fn data(&self) -> u32 {
        self.0
    }
}

mem_ap_register!(
    /// Banked Data Register 0 descriptor (read-write)
    Bd0Register,
    0x10,
    BankedData
);
mem_ap_register!(
    /// Banked Data Register 1 descriptor (read-write)
    Bd1Register,
    0x14,
    BankedData
);
mem_ap_register!(
    /// Banked Data Register 2 descriptor (read-write)
    Bd2Register,
    0x18,
    BankedData
);
mem_ap_register!(
    /// Banked Data Register 3 descriptor (read-write)
    Bd3Register,
    0x1C,
    BankedData
);

/// MEM-AP Banked Data register data
///
/// Used as the value for [`Bd0Register`], [`Bd1Register`], [`Bd2Register`],
/// and [`Bd3Register`].  Each maps to `TAR[31:4] | n*4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankedData(u32);

// Standard register data impls
register_data_rw!(BankedData);

impl BankedData {
    /// Get data value
    pub fn data(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::dp::Select;

    #[test]
    fn csw_constants() {
        assert_eq!(Csw::word().value(), 0x2300_0002);
        assert_eq!(Csw::word_auto_increment().value(), 0x2300_0012);
        assert!(!Csw::word().auto_increment());
        assert!(Csw::word_auto_increment().auto_increment());
        assert_eq!(
            Csw::word_auto_increment().transfer_config(),
            "Size: 32-bit, AddrInc: Single"
        );
        assert_eq!(Csw::word().transfer_config(), "Size: 32-bit, AddrInc: Off");
    }

    #[test]
    fn wire_addresses() {
        assert_eq!(CswRegister::WIRE_ADDRESS, 0x01);
        assert_eq!(TarRegister::WIRE_ADDRESS, 0x05);
        assert_eq!(DrwRegister::WIRE_ADDRESS, 0x0D);
        assert_eq!(Bd0Register::WIRE_ADDRESS, 0x01);
        assert_eq!(Bd1Register::WIRE_ADDRESS, 0x05);
        assert_eq!(Bd2Register::WIRE_ADDRESS, 0x09);
        assert_eq!(Bd3Register::WIRE_ADDRESS, 0x0D);
    }

    #[test]
    fn bank_selects() {
        assert_eq!(CswRegister::bank_select(), Select::new(0x0000_0000));
        assert_eq!(DrwRegister::bank_select(), Select::new(0x0000_0000));
        assert_eq!(Bd0Register::bank_select(), Select::new(0x0000_0010));
        assert_eq!(Bd3Register::bank_select(), Select::new(0x0000_0010));
    }
}
