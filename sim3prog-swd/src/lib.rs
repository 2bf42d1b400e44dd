// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! sim3prog-swd library
//!
//! Programs the flash and SRAM of SiLabs SiM3 (SiM3U/C/L) Cortex-M
//! microcontrollers over Serial Wire Debug (SWD), via a SiLabs debug adapter.
//!
//! The SiM3 vendor specific Chip Access Port is used to bulk erase, halt and
//! reset the target, and the AHB MEM-AP to move data across the bus to the
//! flash controller, SRAM and core debug registers.
//!
//! The following diagram shows the key `sim3prog-swd` concepts.
//!
//! ```text
//!      sim3prog CLI
//! ----------------------
//!  FlashEngine  ImageLoader
//! ----------------------      \
//!  Session (core control)      \
//! ----------------------        |--  SwdError
//!      SwdInterface             |
//! ----------------------       /
//!   Transaction queue         /
//! ----------------------
//!       Transport        >=====  USB  =====<  Debug Adapter  ==SWD==  SiM3
//! ```
//!
//! * [`FlashEngine`] erases and programs flash through FLASHCTRL.
//! * [`ImageLoader`] loads a firmware image into SRAM and starts it.
//! * [`Session`] owns the adapter connection and tracks the target core's
//!   state, providing the identify/halt/reset sequences.
//! * [`SwdInterface`] performs individual DP, AP and AHB register accesses,
//!   building them into [`Transaction`]s.
//! * [`Transport`] is implemented by the debug adapter driver.  A simulated
//!   SiM3 target, [`sim::SimTarget`], implements it for testing.
//!
//! Everything is synchronous and single threaded.  A [`Session`] owns its
//! transport, and the engine and loader borrow the session mutably, so
//! exclusive use is enforced at compile time.
//!
//! `sim3prog-swd` uses the [`sim3prog_core`] library for its register
//! definitions.

pub mod config;
pub mod control;
pub mod flash;
pub mod interface;
pub mod loader;
pub mod session;
pub mod sim;
pub mod transaction;
pub mod transport;

#[doc(inline)]
pub use crate::config::ProgrammerConfig;
#[doc(inline)]
pub use crate::control::PollLimit;
#[doc(inline)]
pub use crate::flash::{FlashEngine, FlashKey};
#[doc(inline)]
pub use crate::interface::SwdInterface;
#[doc(inline)]
pub use crate::loader::{ImageLoader, LoadReport, MemoryImage, Mismatch};
#[doc(inline)]
pub use crate::session::{CoreState, Session};
#[doc(inline)]
pub use crate::transaction::{RegisterAccess, Transaction};
#[doc(inline)]
pub use crate::transport::{AdiClass, AdiStatus, Transport};

use serde::Serialize;

/// Core error type used by all sim3prog-swd objects
///
/// Methods are provided to make it easier to handle errors, by checking if
/// either a retry or reset is required:
///
/// - [`SwdError::requires_retry()`]
/// - [`SwdError::requires_reset()`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwdError {
    /// The adapter, or the USB link to it, failed.  Nothing further can be
    /// done on this adapter handle.  Close and reopen the adapter.
    #[error("Transport fault: {0}")]
    Transport(AdiStatus),

    /// The SWD transaction failed on the wire, for example a FAULT ACK or an
    /// AP timeout.  Use [`Session::clear_errors()`] and retry the whole
    /// operation.
    #[error("Protocol fault: {0}")]
    Protocol(AdiStatus),

    /// The adapter rejected the request as invalid.  This is a programming
    /// error and should not be retried.
    #[error("API fault: {0}")]
    Api(AdiStatus),

    /// The Chip AP identity register did not read as the SiLabs value, so
    /// this is not a SiM3 device, or the Chip AP is not responding.  Raised
    /// before any destructive operation.
    #[error("Chip AP identity mismatch: found 0x{found:08X}")]
    ChipApMismatch { found: u32 },

    /// No target connection.  [`Session::connect()`] must be called first.
    #[error("Not connected")]
    NotConnected,

    /// The Chip AP has not been identified.  Call [`Session::identify()`]
    /// first.
    #[error("Chip AP not identified")]
    NotIdentified,

    /// The operation requires a halted core.  Call
    /// [`Session::halt_and_reset()`] first.
    #[error("Core not halted")]
    NotHalted,

    /// The adapter returned a different number of read results than reads
    /// were queued.
    #[error("Expected {expected} read results, received {received}")]
    ResultCount { expected: usize, received: usize },

    /// An argument was invalid, such as an unaligned address.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A firmware image could not be used.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A bounded poll expired before the hardware became ready.
    #[error("Timed out after {polls} polls")]
    Timeout { polls: u32 },
}

impl From<AdiStatus> for SwdError {
    fn from(status: AdiStatus) -> Self {
        match status.class() {
            AdiClass::Protocol => SwdError::Protocol(status),
            AdiClass::Api => SwdError::Api(status),
            AdiClass::Transport => SwdError::Transport(status),
        }
    }
}

impl SwdError {
    /// Returns true if the adapter must be reopened to recover.  If the
    /// error persists, the adapter may need to be re-plugged.
    pub fn requires_reset(&self) -> bool {
        matches!(self, SwdError::Transport(_))
    }

    /// Returns true if the error is transient.  Clear errors using
    /// [`Session::clear_errors()`] and retry the whole operation.
    pub fn requires_retry(&self) -> bool {
        matches!(self, SwdError::Protocol(_) | SwdError::Timeout { .. })
    }

    /// Returns true if the error requires neither a reset nor a retry to
    /// recover.  Normally this means the API has been used incorrectly, or
    /// the target is not a SiM3 device.
    pub fn requires_other(&self) -> bool {
        !self.requires_reset() && !self.requires_retry()
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwdError::Transport(_) => "Transport Fault",
            SwdError::Protocol(_) => "Protocol Fault",
            SwdError::Api(_) => "API Fault",
            SwdError::ChipApMismatch { .. } => "Chip AP Mismatch",
            SwdError::NotConnected => "Not Connected",
            SwdError::NotIdentified => "Not Identified",
            SwdError::NotHalted => "Not Halted",
            SwdError::ResultCount { .. } => "Result Count Mismatch",
            SwdError::InvalidArgument(_) => "Invalid Argument",
            SwdError::InvalidImage(_) => "Invalid Image",
            SwdError::Timeout { .. } => "Timeout",
        }
    }
}

impl Serialize for SwdError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SwdError", 2)?;

        let kind = match self {
            SwdError::Transport(_) => "transport",
            SwdError::Protocol(_) => "protocol",
            SwdError::Api(_) => "api",
            SwdError::ChipApMismatch { .. } => "chip ap mismatch",
            SwdError::NotConnected => "not connected",
            SwdError::NotIdentified => "not identified",
            SwdError::NotHalted => "not halted",
            SwdError::ResultCount { .. } => "result count",
            SwdError::InvalidArgument(_) => "invalid argument",
            SwdError::InvalidImage(_) => "invalid image",
            SwdError::Timeout { .. } => "timeout",
        };
        state.serialize_field("kind", kind)?;

        let detail = match self {
            SwdError::Transport(status) | SwdError::Protocol(status) | SwdError::Api(status) => {
                status.name().to_string()
            }
            SwdError::ChipApMismatch { found } => format!("0x{found:08X}"),
            SwdError::ResultCount { expected, received } => {
                format!("expected {expected}, received {received}")
            }
            SwdError::InvalidArgument(msg) | SwdError::InvalidImage(msg) => msg.clone(),
            SwdError::Timeout { polls } => format!("{polls}"),
            _ => String::new(), // empty detail for variants without data
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x01, "protocol"; "invalid command")]
    #[test_case(0x05, "protocol"; "ack fault")]
    #[test_case(0x06, "protocol"; "dp not connected")]
    #[test_case(0x40, "api"; "invalid parameter")]
    #[test_case(0x50, "api"; "target must be halted")]
    #[test_case(0x51, "api"; "flash verify failed")]
    #[test_case(0x80, "transport"; "device not found")]
    #[test_case(0x84, "transport"; "transfer timeout")]
    #[test_case(0xC2, "transport"; "re-enumerate")]
    #[test_case(0x7F, "transport"; "unknown")]
    fn status_classification(code: u8, kind: &str) {
        let error = SwdError::from(AdiStatus::from_code(code));
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["kind"], kind);
    }

    #[test]
    fn recovery_classes() {
        let protocol = SwdError::from(AdiStatus::ProtAckFault);
        assert!(protocol.requires_retry());
        assert!(!protocol.requires_reset());

        let transport = SwdError::from(AdiStatus::HwifTransferError);
        assert!(transport.requires_reset());
        assert!(!transport.requires_retry());

        assert!(SwdError::Timeout { polls: 10 }.requires_retry());
        assert!(SwdError::ChipApMismatch { found: 0 }.requires_other());
        assert!(SwdError::NotHalted.requires_other());
        assert!(SwdError::from(AdiStatus::ApiInvalidParameter).requires_other());
    }

    #[test]
    fn display_and_serialize() {
        let error = SwdError::ChipApMismatch { found: 0x1234 };
        assert_eq!(error.to_string(), "Chip AP identity mismatch: found 0x00001234");
        assert_eq!(error.as_str(), "Chip AP Mismatch");

        let json = serde_json::to_string(&SwdError::from(AdiStatus::ProtWireError)).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"protocol","detail":"ADI_STATUS_PROT_WIRE_ERROR"}"#
        );

        let json = serde_json::to_string(&SwdError::NotHalted).unwrap();
        assert_eq!(json, r#"{"kind":"not halted","detail":""}"#);
    }
}
