// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Register Access Traits
//!
//! These are used to ensure strongly typed access to reading and writing
//! Debug Port and Access Port registers, using
//!
//! * `sim3prog_swd::interface::SwdInterface::read_dp_register`
//! * `sim3prog_swd::interface::SwdInterface::read_ap_register`
//! * `sim3prog_swd::interface::SwdInterface::write_dp_register`
//! * `sim3prog_swd::interface::SwdInterface::write_ap_register`
//!
//! Register addresses are given as the full AP register address, so
//! `0x00`-`0x0C` are bank 0, `0x10`-`0x1C` bank 1, and so on.  The adapter
//! only sees the low nibble of this address, with bit 0 set for an Access
//! Port access.  The bank is carried separately in the DP SELECT register.

use crate::arm::dp::Select;

/// Set in the adapter's register address to indicate an AP, rather than DP,
/// access.
pub const AP_ACCESS_FLAG: u8 = 0x01;

// Mask for the register index within a 16 byte bank
const BANK_OFFSET_MASK: u8 = 0x0C;

/// Base trait for all ARM debug register descriptors
pub trait RegisterDescriptor {
    const ADDRESS: u8;
    type Value;
}

/// Registers that can be read
pub trait ReadableRegister: RegisterDescriptor {
    /// Convert raw 32-bit data to register value
    fn from_raw(data: u32) -> Self::Value
    where
        Self::Value: From<u32>,
    {
        Self::Value::from(data)
    }
}

/// Registers that can be written
pub trait WritableRegister: RegisterDescriptor {
    /// Convert register value to raw 32-bit data
    fn to_raw(value: Self::Value) -> u32
    where
        Self::Value: Into<u32>,
    {
        value.into()
    }
}

/// Debug Port registers (accessed via DP operations)
pub trait DpRegister: RegisterDescriptor {
    /// Address as presented to the debug adapter.
    const WIRE_ADDRESS: u8 = Self::ADDRESS & BANK_OFFSET_MASK;
}

/// Access Port registers (accessed via AP operations, after DP SELECT has
/// been written).
pub trait ApRegister: RegisterDescriptor {
    /// The APSEL value of the Access Port that owns this register.
    const APSEL: u8;

    /// Address as presented to the debug adapter.
    const WIRE_ADDRESS: u8 = (Self::ADDRESS & BANK_OFFSET_MASK) | AP_ACCESS_FLAG;

    /// DP SELECT value required to access this register.
    fn bank_select() -> Select {
        Select::for_ap(Self::APSEL, Self::ADDRESS)
    }
}

/// Generate a read-only register data type
#[macro_export]
macro_rules! register_data_r {
    ($name:ident) => {
        // Used to retrieve value
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}

/// Generate a read-write register data type
#[macro_export]
macro_rules! register_data_rw {
    ($name:ident) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}

/// Generate a write-only register data type
#[macro_export]
macro_rules! register_data_w {
    ($name:ident) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}
