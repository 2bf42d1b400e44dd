// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Debug adapter transport contract
//!
//! sim3prog does not talk to USB itself.  Instead it drives any object that
//! implements [`Transport`], which models the SiLabs debug adapter (ADI)
//! programming interface: a single queued-command, single-response channel.
//! Register accesses are queued, then executed as one request/response cycle
//! which returns the read results in submission order.
//!
//! All methods report failure using the adapter's own status codes,
//! [`AdiStatus`], which [`crate::SwdError`] then classifies.

use core::fmt;

use sim3prog_core::arm::dp::IdCode;

/// SiLabs USB vendor ID, used by all SiLabs debug adapters.
pub const SLAB_VID: u16 = 0x10C4;

/// USB Debug Adapter product ID
pub const UDA_PID: u16 = 0x8045;

/// ToolStick product ID
pub const TOOLSTICK_PID: u16 = 0x8253;

/// Set by adapter implementations in the wire address of queued reads.
/// Callers of [`Transport::queue_read()`] never include it.
pub const ADI_READ_FLAG: u8 = 0x02;

/// Type of SiLabs debug adapter, from its USB IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterModel {
    /// USB Debug Adapter
    Uda,
    /// ToolStick base adapter
    ToolStick,
}

impl AdapterModel {
    /// Identifies the adapter from its USB VID/PID, if it is a SiLabs one.
    pub fn from_ids(vid: u16, pid: u16) -> Option<Self> {
        match (vid, pid) {
            (SLAB_VID, UDA_PID) => Some(AdapterModel::Uda),
            (SLAB_VID, TOOLSTICK_PID) => Some(AdapterModel::ToolStick),
            _ => None,
        }
    }
}

impl fmt::Display for AdapterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterModel::Uda => write!(f, "USB Debug Adapter"),
            AdapterModel::ToolStick => write!(f, "ToolStick"),
        }
    }
}

/// Firmware mode the adapter is running in.  Only [`DeviceMode::DebugArm`]
/// can drive an SWD target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Bootload,
    Debug8051,
    DebugArm,
    Unknown(u32),
}

impl DeviceMode {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x01 => DeviceMode::Bootload,
            0x02 => DeviceMode::Debug8051,
            0x03 => DeviceMode::DebugArm,
            other => DeviceMode::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            DeviceMode::Bootload => 0x01,
            DeviceMode::Debug8051 => 0x02,
            DeviceMode::DebugArm => 0x03,
            DeviceMode::Unknown(code) => *code,
        }
    }
}

/// How a failing [`AdiStatus`] should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdiClass {
    /// The SWD transaction failed.  Clear errors and retry the operation.
    Protocol,
    /// The adapter API was used incorrectly.
    Api,
    /// The adapter or its USB link failed.  Reopen the adapter.
    Transport,
}

macro_rules! adi_status {
    ($($variant:ident = $code:literal, $name:literal, $class:ident;)*) => {
        /// Non-zero status code returned by the debug adapter.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum AdiStatus {
            $($variant,)*
            /// A status code not known to this library
            Unknown(u8),
        }

        impl AdiStatus {
            /// Maps a raw status code to its named fault.  Zero is success
            /// and is never passed here.
            pub fn from_code(code: u8) -> Self {
                match code {
                    $($code => AdiStatus::$variant,)*
                    other => AdiStatus::Unknown(other),
                }
            }

            /// Raw status code
            pub fn code(&self) -> u8 {
                match self {
                    $(AdiStatus::$variant => $code,)*
                    AdiStatus::Unknown(code) => *code,
                }
            }

            /// Adapter library name for this status
            pub fn name(&self) -> &'static str {
                match self {
                    $(AdiStatus::$variant => $name,)*
                    AdiStatus::Unknown(_) => "ADI_STATUS_UNKNOWN",
                }
            }

            /// Error class.  Unknown codes are treated as transport faults.
            pub fn class(&self) -> AdiClass {
                match self {
                    $(AdiStatus::$variant => AdiClass::$class,)*
                    AdiStatus::Unknown(_) => AdiClass::Transport,
                }
            }
        }
    };
}

adi_status! {
    ProtInvalidCommand = 0x01, "ADI_STATUS_PROT_INVALID_COMMAND", Protocol;
    ProtCommandFailed = 0x02, "ADI_STATUS_PROT_COMMAND_FAILED", Protocol;
    ProtApTimeout = 0x03, "ADI_STATUS_PROT_AP_TIMEOUT", Protocol;
    ProtWireError = 0x04, "ADI_STATUS_PROT_WIRE_ERROR", Protocol;
    ProtAckFault = 0x05, "ADI_STATUS_PROT_ACK_FAULT", Protocol;
    ProtDpNotConnected = 0x06, "ADI_STATUS_PROT_DP_NOT_CONNECTED", Protocol;
    ApiInvalidParameter = 0x40, "ADI_STATUS_API_INVALID_PARAMETER", Api;
    ApiInvalidBufferSize = 0x41, "ADI_STATUS_API_INVALID_BUFFER_SIZE", Api;
    ApiNotSupported = 0x42, "ADI_STATUS_API_NOT_SUPPORTED", Api;
    ApiNotInBootloadMode = 0x43, "ADI_STATUS_API_NOT_IN_BOOTLOAD_MODE", Api;
    ApiNotInDebugMode = 0x44, "ADI_STATUS_API_NOT_IN_DEBUG_MODE", Api;
    ApiNotInArmDebugMode = 0x45, "ADI_STATUS_API_NOT_IN_ARM_DEBUG_MODE", Api;
    ApiFailedToEnterMode = 0x46, "ADI_STATUS_API_FAILED_TO_ENTER_MODE", Api;
    ApiInvalidTransfer = 0x47, "ADI_STATUS_API_INVALID_TRANSFER", Api;
    ApiInvalidHexChecksum = 0x48, "ADI_STATUS_API_INVALID_HEX_CHECKSUM", Api;
    ApiInvalidHexRecord = 0x49, "ADI_STATUS_API_INVALID_HEX_RECORD", Api;
    ApiInvalidHexFile = 0x4A, "ADI_STATUS_API_INVALID_HEX_FILE", Api;
    ApiInvalidDeviceObject = 0x4B, "ADI_STATUS_API_INVALID_DEVICE_OBJECT", Api;
    ApiFatalError = 0x4C, "ADI_STATUS_API_FATAL_ERROR", Api;
    ApiAborted = 0x4D, "ADI_STATUS_API_ABORTED", Api;
    ApiFwUpgradeRequired = 0x4E, "ADI_STATUS_API_FW_UPGRADE_REQUIRED", Api;
    ApiNotConnectedToTarget = 0x4F, "ADI_STATUS_API_NOT_CONNECTED_TO_TARGET", Api;
    ApiTargetMustBeHalted = 0x50, "ADI_STATUS_API_TARGET_MUST_BE_HALTED", Api;
    ApiFlashVerifyFailed = 0x51, "ADI_STATUS_API_FLASH_VERIFY_FAILED", Api;
    HwifDeviceNotFound = 0x80, "ADI_STATUS_HWIF_DEVICE_NOT_FOUND", Transport;
    HwifDeviceNotOpened = 0x81, "ADI_STATUS_HWIF_DEVICE_NOT_OPENED", Transport;
    HwifDeviceError = 0x82, "ADI_STATUS_HWIF_DEVICE_ERROR", Transport;
    HwifTransferError = 0x83, "ADI_STATUS_HWIF_TRANSFER_ERROR", Transport;
    HwifTransferTimeout = 0x84, "ADI_STATUS_HWIF_TRANSFER_TIMEOUT", Transport;
    SysInvalidResponse = 0xC0, "ADI_STATUS_SYS_INVALID_RESPONSE", Transport;
    SysFlashWriteCrcError = 0xC1, "ADI_STATUS_SYS_FLASH_WRITE_CRC_ERROR", Transport;
    SysReEnumerateDevice = 0xC2, "ADI_STATUS_SYS_RE_ENUMERATE_DEVICE", Transport;
}

impl fmt::Display for AdiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}

/// The debug adapter programming interface.
///
/// Implementations own the adapter handle.  Wire addresses passed to
/// [`Self::queue_read()`] and [`Self::queue_write()`] are DP/AP register
/// offsets within the currently selected bank, with bit 0 set for an Access
/// Port access, exactly as the ADI library expects them (less the read flag).
///
/// Implementations must discard any queued accesses when [`Self::execute()`]
/// fails, and when [`Self::discard()`] is called.  Callers discard after a
/// failed `queue_*` call, so an implementation need not.
pub trait Transport {
    /// Opens the adapter and switches it into ARM debug mode.
    fn open(&mut self) -> Result<(), AdiStatus>;

    /// Closes the adapter.  Callers disconnect first.
    fn close(&mut self) -> Result<(), AdiStatus>;

    /// Returns the adapter's USB VID and PID.
    fn vid_pid(&mut self) -> Result<(u16, u16), AdiStatus>;

    /// Returns the adapter's current firmware mode.
    fn device_mode(&mut self) -> Result<DeviceMode, AdiStatus>;

    /// Connects to the target using the SWJ switching sequence, returning
    /// the Debug Port IDCODE.
    fn connect_swd(&mut self) -> Result<IdCode, AdiStatus>;

    /// Disconnects from the target.
    fn disconnect(&mut self) -> Result<(), AdiStatus>;

    /// Queues a read of the register at wire address `address`.
    fn queue_read(&mut self, address: u8) -> Result<(), AdiStatus>;

    /// Queues a write of `value` to the register at wire address `address`.
    fn queue_write(&mut self, address: u8, value: u32) -> Result<(), AdiStatus>;

    /// Drops any queued accesses without sending them.
    fn discard(&mut self);

    /// Executes all queued accesses as a single transfer.
    ///
    /// Returns:
    /// - `Ok(Vec<u32>)`: one value per queued read, in queue order.
    /// - `Err(AdiStatus)`: the transfer failed and the queue was discarded.
    fn execute(&mut self) -> Result<Vec<u32>, AdiStatus>;

    /// Clears any sticky protocol errors.
    ///
    /// Returns:
    /// - `Ok((before, after))`: the adapter's error state before and after
    ///   the clear.
    fn clear_errors(&mut self) -> Result<(u32, u32), AdiStatus>;

    /// Performs an SWD line reset.
    fn line_reset(&mut self) -> Result<(), AdiStatus>;
}
