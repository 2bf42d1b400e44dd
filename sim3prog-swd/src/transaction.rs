// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Queued register accesses
//!
//! A [`Transaction`] is the ordered set of [`RegisterAccess`]es submitted to
//! the adapter in one request/response cycle.  Bank selection is expressed
//! in the transaction itself, as a DP SELECT write preceding the AP accesses
//! it applies to.

use core::fmt;

use sim3prog_core::arm::dp::SelectRegister;
use sim3prog_core::arm::register::{AP_ACCESS_FLAG, DpRegister};

/// Which port a register access targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// Debug Port
    Dp,
    /// Access Port, as chosen by the last DP SELECT write
    Ap,
}

/// Direction and, for writes, payload of a register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write(u32),
}

/// A single queued DP or AP register access.  Immutable once queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAccess {
    port: Port,
    offset: u8,
    direction: Direction,
}

impl RegisterAccess {
    // Register offset within a 16 byte bank
    const OFFSET_MASK: u8 = 0x0C;

    /// Builds an access from an adapter wire address.
    pub fn from_wire(address: u8, direction: Direction) -> Self {
        let port = if address & AP_ACCESS_FLAG != 0 {
            Port::Ap
        } else {
            Port::Dp
        };
        Self {
            port,
            offset: address & Self::OFFSET_MASK,
            direction,
        }
    }

    pub fn read(address: u8) -> Self {
        Self::from_wire(address, Direction::Read)
    }

    pub fn write(address: u8, value: u32) -> Self {
        Self::from_wire(address, Direction::Write(value))
    }

    pub fn port(&self) -> Port {
        self.port
    }

    /// Register offset within the selected bank (0x0, 0x4, 0x8 or 0xC)
    pub fn offset(&self) -> u8 {
        self.offset
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Address as presented to the adapter
    pub fn wire_address(&self) -> u8 {
        match self.port {
            Port::Dp => self.offset,
            Port::Ap => self.offset | AP_ACCESS_FLAG,
        }
    }

    pub fn is_read(&self) -> bool {
        self.direction == Direction::Read
    }

    /// Returns the SELECT value if this is a DP SELECT write.
    pub fn select_value(&self) -> Option<u32> {
        match (self.port, self.direction) {
            (Port::Dp, Direction::Write(value)) if self.offset == SelectRegister::WIRE_ADDRESS => {
                Some(value)
            }
            _ => None,
        }
    }
}

impl fmt::Display for RegisterAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = match self.port {
            Port::Dp => "DP",
            Port::Ap => "AP",
        };
        match self.direction {
            Direction::Read => write!(f, "{port} read 0x{:X}", self.offset),
            Direction::Write(value) => {
                write!(f, "{port} write 0x{:X} <- 0x{value:08X}", self.offset)
            }
        }
    }
}

/// An ordered sequence of register accesses executed atomically by the
/// adapter.  Read results come back in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    accesses: Vec<RegisterAccess>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, access: RegisterAccess) {
        self.accesses.push(access);
    }

    pub fn accesses(&self) -> &[RegisterAccess] {
        &self.accesses
    }

    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    /// Number of results the adapter must return for this transaction
    pub fn reads(&self) -> usize {
        self.accesses.iter().filter(|access| access.is_read()).count()
    }

    /// Number of DP SELECT writes in this transaction
    pub fn select_writes(&self) -> usize {
        self.accesses
            .iter()
            .filter(|access| access.select_value().is_some())
            .count()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (ii, access) in self.accesses.iter().enumerate() {
            if ii > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{access}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_addresses_decode() {
        let select = RegisterAccess::write(0x08, 0x0A00_00F0);
        assert_eq!(select.port(), Port::Dp);
        assert_eq!(select.select_value(), Some(0x0A00_00F0));

        let id = RegisterAccess::read(0x0D);
        assert_eq!(id.port(), Port::Ap);
        assert_eq!(id.offset(), 0x0C);
        assert_eq!(id.wire_address(), 0x0D);
        assert_eq!(id.select_value(), None);

        // AP offset 0x8 is not SELECT
        assert_eq!(RegisterAccess::write(0x09, 1).select_value(), None);
    }

    #[test]
    fn transaction_counts() {
        let mut transaction = Transaction::new();
        transaction.push(RegisterAccess::write(0x08, 0));
        transaction.push(RegisterAccess::write(0x01, 0x2300_0002));
        transaction.push(RegisterAccess::read(0x0D));
        transaction.push(RegisterAccess::read(0x0D));
        assert_eq!(transaction.len(), 4);
        assert_eq!(transaction.reads(), 2);
        assert_eq!(transaction.select_writes(), 1);
        assert_eq!(
            transaction.to_string(),
            "[DP write 0x8 <- 0x00000000, AP write 0x0 <- 0x23000002, AP read 0xC, AP read 0xC]"
        );
    }
}
