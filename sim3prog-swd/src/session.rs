// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Debug adapter session
//!
//! A [`Session`] is one open connection to a debug adapter, and through it
//! to a SiM3 target.  It tracks the connection, the target core's state, and
//! the protocol error counters, and gates the higher level operations in
//! [`crate::control`], [`crate::flash`] and [`crate::loader`] on them.

use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use sim3prog_core::arm::dp::IdCode;

use crate::SwdError;
use crate::control::PollLimit;
use crate::interface::SwdInterface;
use crate::transport::{AdapterModel, AdiStatus, DeviceMode, Transport};

/// State of the connection to the adapter and target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The adapter is not open
    Closed,
    /// The adapter is open, but not connected to a target
    Open,
    /// Connected to the target over SWD
    Connected,
}

/// What is known about the target core.
///
/// ```text
/// Unknown --identify--> Identified --halt_and_reset--> Halted --release--> Running
///                                  \                 /
///                                   bulk_erase -> Reset
/// ```
///
/// `bulk_erase` is possible from any state but `Unknown`, and always leaves
/// the core in `Reset`.  Disconnecting returns to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    /// Nothing is known about the target
    Unknown,
    /// The SiLabs Chip AP has been identified
    Identified,
    /// The core is halted at its reset vector
    Halted,
    /// A system reset has been issued and the core is no longer halted
    Reset,
    /// The core has been released to run loaded code
    Running,
}

impl fmt::Display for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            CoreState::Unknown => "unknown",
            CoreState::Identified => "identified",
            CoreState::Halted => "halted",
            CoreState::Reset => "reset",
            CoreState::Running => "running",
        };
        write!(f, "{state}")
    }
}

/// Protocol error counts accumulated from each error clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCounters {
    /// Number of times errors have been cleared
    pub clears: u32,
    /// Number of clears which found errors outstanding
    pub errors_found: u32,
    /// Number of clears after which errors remained
    pub errors_remaining: u32,
    /// The (before, after) values from the most recent clear
    pub last: Option<(u32, u32)>,
}

impl ErrorCounters {
    pub(crate) fn record(&mut self, before: u32, after: u32) {
        self.clears += 1;
        if before != 0 {
            self.errors_found += 1;
        }
        if after != 0 {
            self.errors_remaining += 1;
        }
        self.last = Some((before, after));
    }
}

/// Debug adapter session object
///
/// Owns the [`Transport`], via an [`SwdInterface`], for its whole life.
/// Every operation takes `&mut self`, so a session cannot be used from two
/// places at once.
///
/// ```rust
/// use sim3prog_swd::Session;
/// use sim3prog_swd::sim::SimTarget;
///
/// let mut session = Session::new(SimTarget::new());
/// session.open().unwrap();
/// let idcode = session.connect().unwrap();
/// session.identify().unwrap();
/// session.halt_and_reset().unwrap();
/// session.close().unwrap();
/// ```
#[derive(Debug)]
pub struct Session<T: Transport> {
    swd: SwdInterface<T>,
    connection: ConnectionState,
    core: CoreState,
    idcode: Option<IdCode>,
    adapter: Option<AdapterModel>,
    errors: ErrorCounters,
    poll_limit: PollLimit,
    clock_enabled: bool,
}

impl<T: Transport> Session<T> {
    /// Creates a new, closed, session using the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            swd: SwdInterface::new(transport),
            connection: ConnectionState::Closed,
            core: CoreState::Unknown,
            idcode: None,
            adapter: None,
            errors: ErrorCounters::default(),
            poll_limit: PollLimit::default(),
            clock_enabled: false,
        }
    }

    /// Opens the adapter.
    ///
    /// Returns:
    /// - `Ok(())`: if the adapter was opened and is in ARM debug mode.
    /// - `Err(SwdError::Api)`: if the adapter is in a different mode, such as
    ///   8051 debug.
    /// - `Err(SwdError)`: if the adapter could not be opened.
    pub fn open(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Open adapter");
        self.swd.transport_mut().open()?;

        // The adapter is open, so must be closed again on any failure
        if let Err(e) = self.check_adapter() {
            if let Err(status) = self.swd.transport_mut().close() {
                warn!("Failed to close adapter: {status}");
            }
            self.adapter = None;
            return Err(e);
        }

        self.connection = ConnectionState::Open;
        Ok(())
    }

    fn check_adapter(&mut self) -> Result<(), SwdError> {
        let (vid, pid) = self.swd.transport_mut().vid_pid()?;
        self.adapter = AdapterModel::from_ids(vid, pid);
        match self.adapter {
            Some(model) => info!("Opened {model}"),
            None => warn!("Opened unrecognised adapter {vid:04X}:{pid:04X}"),
        }

        let mode = self.swd.transport_mut().device_mode()?;
        if mode != DeviceMode::DebugArm {
            warn!("Adapter is in mode {mode:?}, not ARM debug");
            return Err(SwdError::Api(AdiStatus::ApiNotInArmDebugMode));
        }
        Ok(())
    }

    /// Connects to the target over SWD, and clears any errors.
    ///
    /// Returns:
    /// - `Ok(IdCode)`: the Debug Port IDCODE.
    /// - `Err(SwdError)`: if the adapter is not open, or the target did not
    ///   respond.
    pub fn connect(&mut self) -> Result<IdCode, SwdError> {
        if self.connection == ConnectionState::Closed {
            debug!("Attempt to connect before opening the adapter");
            return Err(SwdError::Transport(AdiStatus::HwifDeviceNotOpened));
        }

        trace!("Exec:  Connect SWD");
        let idcode = self.swd.transport_mut().connect_swd()?;
        self.connection = ConnectionState::Connected;
        self.idcode = Some(idcode);
        self.core = CoreState::Unknown;
        self.clock_enabled = false;
        debug!("Value: IDCODE: {idcode:#}");

        self.clear_errors()?;
        Ok(idcode)
    }

    /// Performs an SWD line reset.
    pub fn line_reset(&mut self) -> Result<(), SwdError> {
        self.require_connected()?;
        trace!("Exec:  Line reset");
        self.swd.transport_mut().line_reset()?;
        Ok(())
    }

    /// Disconnects from the target, if connected.  The adapter stays open.
    pub fn disconnect(&mut self) -> Result<(), SwdError> {
        if self.connection == ConnectionState::Connected {
            trace!("Exec:  Disconnect");
            self.connection = ConnectionState::Open;
            self.core = CoreState::Unknown;
            self.idcode = None;
            self.clock_enabled = false;
            self.swd.transport_mut().disconnect()?;
        }
        Ok(())
    }

    /// Disconnects, if connected, and closes the adapter.
    pub fn close(&mut self) -> Result<(), SwdError> {
        self.disconnect()?;
        if self.connection == ConnectionState::Open {
            trace!("Exec:  Close adapter");
            self.connection = ConnectionState::Closed;
            self.swd.transport_mut().close()?;
        }
        Ok(())
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// The IDCODE read when connecting, if connected.
    pub fn idcode(&self) -> Option<IdCode> {
        self.idcode
    }

    /// The adapter model, if the adapter is open and recognised.
    pub fn adapter(&self) -> Option<AdapterModel> {
        self.adapter
    }

    pub fn core_state(&self) -> CoreState {
        self.core
    }

    pub fn error_counters(&self) -> ErrorCounters {
        self.errors
    }

    pub fn poll_limit(&self) -> PollLimit {
        self.poll_limit
    }

    /// Sets how long busy polls (bulk erase, page erase) may run for.
    pub fn set_poll_limit(&mut self, limit: PollLimit) {
        self.poll_limit = limit;
    }

    /// Whether the FLASHCTRL APB clock has been enabled since the last
    /// reset.
    pub fn clock_enabled(&self) -> bool {
        self.clock_enabled
    }

    /// Provides access to the underlying [`SwdInterface`], for register level
    /// operations.
    pub fn swd_if(&mut self) -> &mut SwdInterface<T> {
        &mut self.swd
    }

    /// Consumes the session, returning the transport.  The session is not
    /// closed first.
    pub fn into_transport(self) -> T {
        self.swd.into_transport()
    }

    pub(crate) fn set_core_state(&mut self, state: CoreState) {
        if self.core != state {
            debug!("Core state {} -> {state}", self.core);
            self.core = state;
        }
    }

    pub(crate) fn set_clock_enabled(&mut self, enabled: bool) {
        self.clock_enabled = enabled;
    }

    pub(crate) fn record_clear(&mut self, before: u32, after: u32) {
        self.errors.record(before, after);
    }

    pub(crate) fn require_connected(&self) -> Result<(), SwdError> {
        if self.is_connected() {
            Ok(())
        } else {
            debug!("Attempt to access target before connecting");
            Err(SwdError::NotConnected)
        }
    }

    pub(crate) fn require_identified(&self) -> Result<(), SwdError> {
        self.require_connected()?;
        if self.core == CoreState::Unknown {
            debug!("Attempt to use the Chip AP before identifying it");
            Err(SwdError::NotIdentified)
        } else {
            Ok(())
        }
    }

    pub(crate) fn require_halted(&self) -> Result<(), SwdError> {
        self.require_identified()?;
        if self.core == CoreState::Halted {
            Ok(())
        } else {
            debug!("Attempt to perform operation with core {}", self.core);
            Err(SwdError::NotHalted)
        }
    }
}
