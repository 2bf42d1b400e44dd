// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Interface
//!
//! This module implements register level access to the target, through the
//! debug adapter's queued transaction interface.  It provides `SwdInterface`
//! for queueing and executing transactions, and for reading and writing DP,
//! AP and AHB (memory mapped) registers.

use core::mem;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use sim3prog_core::arm::dp::{
    CtrlStat, CtrlStatRegister, IdCode, IdCodeRegister, Select, SelectRegister,
};
use sim3prog_core::arm::map::{Csw, CswRegister, DrwRegister, TarRegister};
use sim3prog_core::arm::register::{ApRegister, DpRegister, ReadableRegister, WritableRegister};
use sim3prog_core::arm::scs::{CoreRegister, Dcrdr, Dcrsr};

use crate::SwdError;
use crate::transaction::{Direction, RegisterAccess, Transaction};
use crate::transport::Transport;

/// SWD Interface object
///
/// This is used by [`crate::Session`] to perform individual register
/// accesses on the target.  It owns the [`Transport`] and the transaction
/// currently being built.
///
/// Accesses are queued using [`Self::queue_read()`] and
/// [`Self::queue_write()`], and sent to the adapter as one [`Transaction`]
/// by [`Self::execute()`].  The higher level register methods queue and
/// execute in one call.
///
/// Every AP register access re-issues DP SELECT.  The last selected bank is
/// never cached, so an access is always correct regardless of what ran
/// before it.
///
/// ```rust
/// use sim3prog_swd::SwdInterface;
/// use sim3prog_swd::sim::SimTarget;
///
/// let mut swd_if = SwdInterface::new(SimTarget::new());
/// swd_if.transport_mut().open_and_connect();
/// let value = swd_if.read_ahb(0x2000_0000).unwrap();
/// ```
#[derive(Debug)]
pub struct SwdInterface<T: Transport> {
    transport: T,
    pending: Transaction,
}

impl<T: Transport> SwdInterface<T> {
    /// Creates a new SWD interface using the given [`Transport`].
    ///
    /// Arguments:
    /// - `transport`: The debug adapter transport to use.
    ///
    /// Returns:
    /// - A new [`SwdInterface`] with an empty transaction queue.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pending: Transaction::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consumes the interface, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// The accesses queued but not yet executed.
    pub fn pending(&self) -> &Transaction {
        &self.pending
    }

    /// Queues a read of the register at wire address `address`.
    pub fn queue_read(&mut self, address: u8) {
        self.pending.push(RegisterAccess::read(address));
    }

    /// Queues a write of `value` to the register at wire address `address`.
    pub fn queue_write(&mut self, address: u8, value: u32) {
        self.pending.push(RegisterAccess::write(address, value));
    }

    /// Executes all queued accesses as a single transaction.
    ///
    /// The queue is cleared whether or not the transaction succeeds, so a
    /// failure never leads to a partial replay.
    ///
    /// Returns:
    /// - `Ok(Vec<u32>)`: the read results, in the order the reads were
    ///   queued.  Empty if only writes were queued.
    /// - `Err(SwdError)`: the adapter reported a failure, or returned the
    ///   wrong number of results.
    pub fn execute(&mut self) -> Result<Vec<u32>, SwdError> {
        let transaction = mem::take(&mut self.pending);
        if transaction.is_empty() {
            return Ok(Vec::new());
        }

        trace!("Exec:  {transaction}");
        for access in transaction.accesses() {
            let queued = match access.direction() {
                Direction::Read => self.transport.queue_read(access.wire_address()),
                Direction::Write(value) => {
                    self.transport.queue_write(access.wire_address(), value)
                }
            };
            if let Err(status) = queued {
                debug!("Failed to queue {access}: {status}");
                self.transport.discard();
                return Err(status.into());
            }
        }

        let results = self
            .transport
            .execute()
            .inspect_err(|status| debug!("Transaction failed: {status}"))?;

        let expected = transaction.reads();
        if results.len() != expected {
            warn!(
                "Adapter returned {} results for {expected} reads",
                results.len()
            );
            return Err(SwdError::ResultCount {
                expected,
                received: results.len(),
            });
        }

        trace!("OK:    {} result(s)", results.len());
        Ok(results)
    }

    // Executes the queue, returning the result of the last read queued.
    fn execute_read(&mut self) -> Result<u32, SwdError> {
        let mut results = self.execute()?;
        results.pop().ok_or(SwdError::ResultCount {
            expected: 1,
            received: 0,
        })
    }

    /// Reads the register at `address` `count` times, in one transaction.
    /// Used for draining FIFO style registers such as MEM-AP DRW.
    ///
    /// Any accesses already queued are executed in the same transaction, and
    /// their read results precede the repeated reads.
    pub fn repeat_read(&mut self, address: u8, count: usize) -> Result<Vec<u32>, SwdError> {
        for _ in 0..count {
            self.queue_read(address);
        }
        self.execute()
    }

    /// Writes each of `values` to the register at `address`, in one
    /// transaction.
    pub fn repeat_write(&mut self, address: u8, values: &[u32]) -> Result<(), SwdError> {
        for value in values {
            self.queue_write(address, *value);
        }
        self.execute().map(|_| ())
    }

    fn queue_select(&mut self, select: Select) {
        self.queue_write(SelectRegister::WIRE_ADDRESS, select.value());
    }

    /// Reads a register, after first selecting `select` in DP SELECT.
    ///
    /// Arguments:
    /// - `select`: The DP SELECT value, choosing the AP and its bank.
    /// - `address`: The wire address of the register within the bank.
    ///
    /// Returns:
    /// - `Ok(u32)`: the value read.
    /// - `Err(SwdError)`: if the transaction failed.
    pub fn read_register(&mut self, select: Select, address: u8) -> Result<u32, SwdError> {
        self.queue_select(select);
        self.queue_read(address);
        self.execute_read()
    }

    /// Writes a register, after first selecting `select` in DP SELECT.
    ///
    /// Arguments:
    /// - `select`: The DP SELECT value, choosing the AP and its bank.
    /// - `address`: The wire address of the register within the bank.
    /// - `value`: The value to write.
    pub fn write_register(
        &mut self,
        select: Select,
        address: u8,
        value: u32,
    ) -> Result<(), SwdError> {
        self.queue_select(select);
        self.queue_write(address, value);
        self.execute().map(|_| ())
    }

    /// Read a Debug Port register
    ///
    /// DP registers other than those banked by DPBANKSEL do not depend on
    /// SELECT, so none is written.
    ///
    /// Arguments:
    /// - `reg`: The register to read, which must implement the `DpRegister`
    ///   trait.
    ///
    /// Returns:
    /// - `Ok(value)` if the register was read successfully.
    /// - `Err(SwdError)` if there was an error reading the register.
    ///
    /// ```ignore
    /// use sim3prog_core::arm::dp::CtrlStatRegister;
    /// let value = swd_if.read_dp_register(CtrlStatRegister)?;
    /// println!("DP CTRL/STAT value: {value}");
    /// ```
    pub fn read_dp_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        self.queue_read(R::WIRE_ADDRESS);
        let raw = self.execute_read()?;
        Ok(R::from_raw(raw))
    }

    /// Write a Debug Port register
    ///
    /// Arguments:
    /// - `reg`: The register to write, which must implement the `DpRegister`
    ///   trait.
    /// - `value`: The value to write.
    pub fn write_dp_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + DpRegister,
        R::Value: Into<u32>,
    {
        self.queue_write(R::WIRE_ADDRESS, R::to_raw(value));
        self.execute().map(|_| ())
    }

    /// Read an Access Port register
    ///
    /// DP SELECT is written with the register's AP and bank first.
    ///
    /// Arguments:
    /// - `reg`: The register to read, which must implement the `ApRegister`
    ///   trait.
    ///
    /// Returns:
    /// - `Ok(value)` if the register was read successfully.
    /// - `Err(SwdError)` if there was an error reading the register.
    ///
    /// ```ignore
    /// use sim3prog_core::chipap::IdRegister;
    /// let id = swd_if.read_ap_register(IdRegister)?;
    /// assert!(id.is_silabs());
    /// ```
    pub fn read_ap_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let raw = self.read_register(R::bank_select(), R::WIRE_ADDRESS)?;
        Ok(R::from_raw(raw))
    }

    /// Write an Access Port register
    ///
    /// DP SELECT is written with the register's AP and bank first.
    ///
    /// Arguments:
    /// - `reg`: The register to write, which must implement the `ApRegister`
    ///   trait.
    /// - `value`: The value to write.
    ///
    /// ```ignore
    /// use sim3prog_core::chipap::{Ctrl1, Ctrl1Register};
    /// swd_if.write_ap_register(Ctrl1Register, Ctrl1::core_reset())?;
    /// ```
    pub fn write_ap_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + ApRegister,
        R::Value: Into<u32>,
    {
        self.write_register(R::bank_select(), R::WIRE_ADDRESS, R::to_raw(value))
    }

    /// Reads the Debug Port IDCODE.
    pub fn read_idcode(&mut self) -> Result<IdCode, SwdError> {
        self.read_dp_register(IdCodeRegister)
    }

    /// Reads the Debug Port CTRL/STAT register.
    pub fn read_ctrl_stat(&mut self) -> Result<CtrlStat, SwdError> {
        self.read_dp_register(CtrlStatRegister)
    }

    /// Requests debug and system power up, by writing CSYSPWRUPREQ and
    /// CDBGPWRUPREQ to CTRL/STAT (`0x50000000`).
    pub fn power_up_debug_domain(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Power up debug domain");
        self.write_register(
            CswRegister::bank_select(),
            CtrlStatRegister::WIRE_ADDRESS,
            CtrlStat::power_up().value(),
        )
    }

    /// Clears all power up requests in CTRL/STAT.
    pub fn power_down_debug_domain(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Power down debug domain");
        self.write_register(
            CswRegister::bank_select(),
            CtrlStatRegister::WIRE_ADDRESS,
            CtrlStat::power_down().value(),
        )
    }

    fn check_aligned(address: u32) -> Result<(), SwdError> {
        if address & 0x3 != 0 {
            warn!("Unaligned address 0x{address:08X}");
            return Err(SwdError::InvalidArgument(format!(
                "address 0x{address:08X} is not word aligned"
            )));
        }
        Ok(())
    }

    // Queues MEM-AP bank 0 selection, CSW and TAR.
    fn queue_mem_ap_setup(&mut self, csw: Csw, address: u32) {
        self.queue_select(CswRegister::bank_select());
        self.queue_write(CswRegister::WIRE_ADDRESS, csw.value());
        self.queue_write(TarRegister::WIRE_ADDRESS, address);
    }

    /// Sets up the MEM-AP for DRW accesses: selects bank 0, programs CSW
    /// and points TAR at `address`, as one transaction.
    ///
    /// Use [`Self::write_drw()`] to then write to the target.
    pub fn configure_mem_ap(&mut self, csw: Csw, address: u32) -> Result<(), SwdError> {
        Self::check_aligned(address)?;
        trace!(
            "Exec:  MEM-AP {} at 0x{address:08X}",
            csw.transfer_config()
        );
        self.queue_mem_ap_setup(csw, address);
        self.execute().map(|_| ())
    }

    /// Writes each of `values` to MEM-AP DRW, as one transaction.  The
    /// MEM-AP must already have been set up with [`Self::configure_mem_ap()`].
    pub fn write_drw(&mut self, values: &[u32]) -> Result<(), SwdError> {
        self.repeat_write(DrwRegister::WIRE_ADDRESS, values)
    }

    /// Reads a 32-bit word from the target's AHB bus.
    ///
    /// Arguments:
    /// - `address`: The word aligned address to read.
    ///
    /// Returns:
    /// - `Ok(u32)`: The word read.
    /// - `Err(SwdError)`: if the read failed.
    pub fn read_ahb(&mut self, address: u32) -> Result<u32, SwdError> {
        Self::check_aligned(address)?;
        self.queue_mem_ap_setup(Csw::word(), address);
        self.queue_read(DrwRegister::WIRE_ADDRESS);
        self.execute_read()
    }

    /// Writes a 32-bit word to the target's AHB bus.
    ///
    /// Arguments:
    /// - `address`: The word aligned address to write.
    /// - `value`: The word to write.
    pub fn write_ahb(&mut self, address: u32, value: u32) -> Result<(), SwdError> {
        Self::check_aligned(address)?;
        self.queue_mem_ap_setup(Csw::word(), address);
        self.queue_write(DrwRegister::WIRE_ADDRESS, value);
        self.execute().map(|_| ())
    }

    /// Reads `count` consecutive words starting at `address`.
    ///
    /// TAR is written once, with CSW set to auto-increment.  The set-up goes
    /// in the same transaction as the first read, and each further word is
    /// read in its own transaction.
    ///
    /// Returns:
    /// - `Ok(Vec<u32>)`: The words read.
    /// - `Err(SwdError)`: if any read failed.
    pub fn read_block(&mut self, address: u32, count: usize) -> Result<Vec<u32>, SwdError> {
        Self::check_aligned(address)?;
        trace!("Exec:  Read {count} words from 0x{address:08X}");

        let mut words = Vec::with_capacity(count);
        if count == 0 {
            return Ok(words);
        }

        self.queue_mem_ap_setup(Csw::word_auto_increment(), address);
        for _ in 0..count {
            self.queue_read(DrwRegister::WIRE_ADDRESS);
            words.push(self.execute_read()?);
        }

        trace!("OK:    Read {count} words from 0x{address:08X}");
        Ok(words)
    }

    /// Writes `words` to consecutive addresses starting at `address`.
    ///
    /// TAR is written once, with CSW set to auto-increment.  The set-up goes
    /// in the same transaction as the first write, and each further word is
    /// written in its own transaction.
    pub fn write_block(&mut self, address: u32, words: &[u32]) -> Result<(), SwdError> {
        Self::check_aligned(address)?;
        trace!("Exec:  Write {} words to 0x{address:08X}", words.len());

        if words.is_empty() {
            return Ok(());
        }

        self.queue_mem_ap_setup(Csw::word_auto_increment(), address);
        for word in words {
            self.queue_write(DrwRegister::WIRE_ADDRESS, *word);
            self.execute()?;
        }

        trace!("OK:    Write {} words to 0x{address:08X}", words.len());
        Ok(())
    }

    /// Writes a core register.  The core must be halted.
    ///
    /// The value is written to DCRDR, along with the MEM-AP set-up, in one
    /// transaction.  DCRSR is then written, with REGWNR set, in a second.
    pub fn write_core_register(&mut self, reg: CoreRegister, value: u32) -> Result<(), SwdError> {
        trace!("Exec:  Write core register {reg} <- 0x{value:08X}");
        self.queue_mem_ap_setup(Csw::word(), Dcrdr::ADDRESS);
        self.queue_write(DrwRegister::WIRE_ADDRESS, value);
        self.execute()?;

        self.queue_write(TarRegister::WIRE_ADDRESS, Dcrsr::ADDRESS);
        self.queue_write(DrwRegister::WIRE_ADDRESS, Dcrsr::write(reg).into());
        self.execute()?;
        Ok(())
    }

    /// Reads a core register.  The core must be halted.
    ///
    /// DCRSR is written, along with the MEM-AP set-up, in one transaction.
    /// DCRDR is then read in a second.
    pub fn read_core_register(&mut self, reg: CoreRegister) -> Result<u32, SwdError> {
        trace!("Exec:  Read core register {reg}");
        self.queue_mem_ap_setup(Csw::word(), Dcrsr::ADDRESS);
        self.queue_write(DrwRegister::WIRE_ADDRESS, Dcrsr::read(reg).into());
        self.execute()?;

        self.queue_write(TarRegister::WIRE_ADDRESS, Dcrdr::ADDRESS);
        self.queue_read(DrwRegister::WIRE_ADDRESS);
        let value = self.execute_read()?;
        trace!("OK:    Core register {reg} = 0x{value:08X}");
        Ok(value)
    }
}
