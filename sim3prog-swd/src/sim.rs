// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Simulated SiM3 target
//!
//! [`SimTarget`] implements [`Transport`] by modelling a SiLabs debug adapter
//! connected to a SiM3 device.  It decodes each register access the way the
//! target's DP, MEM-AP and Chip AP would, and backs the AHB bus with
//! simulated flash, SRAM, FLASHCTRL, CLKCTRL and core debug registers.
//!
//! It is used by this crate's tests and by the `sim3prog` binary.  Every
//! executed [`Transaction`] is logged so that tests can check exactly what
//! was sent on the wire.
//!
//! Behaviour which is modelled:
//! - Flash can only be changed through FLASHCTRL, once unlocked with the key
//!   sequence, and only with its APB clock enabled.  Programming ANDs
//!   half-words into flash, as real flash can only clear bits.
//! - Page and bulk erase report busy for a configurable number of polls.
//! - The core halts at its reset vector if reset vector catch is enabled
//!   when it leaves reset.
//! - Core registers can only be accessed while the core is halted.
//!
//! Addresses outside flash, SRAM and the peripheral and system regions read
//! as zero and ignore writes.

use std::collections::BTreeMap;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use sim3prog_core::arm::dp::IdCode;
use sim3prog_core::arm::map::{Csw, MEM_AP_APSEL};
use sim3prog_core::arm::scs::{Aircr, CoreRegister, Dcrdr, Dcrsr, Demcr, Dfsr, Dhcsr, Vtor};
use sim3prog_core::chipap::{CHIP_AP_APSEL, ChipApId, Ctrl1};
use sim3prog_core::sim3::{
    self, ApbClkG0, FlashConfig, FlashWriteAddress, FlashWriteData, SIM3_FLASH_BASE,
    SIM3_FLASH_PAGE_SIZE, SIM3_SRAM_BASE, SIM3_SRAM_TOP,
};

use crate::transaction::{Direction, Port, RegisterAccess, Transaction};
use crate::transport::{ADI_READ_FLAG, AdiClass, AdiStatus, DeviceMode, SLAB_VID, Transport, UDA_PID};

/// Size of the simulated flash
pub const SIM_FLASH_SIZE: u32 = 32 * 1024;

/// Number of CONFIG or CTRL1 reads for which an erase reports busy, unless
/// changed with [`SimTarget::set_erase_busy_reads()`]
pub const DEFAULT_ERASE_BUSY_READS: u32 = 2;

// Peripheral and system regions, backed by a sparse map
const PERIPHERAL_BASE: u32 = 0x4000_0000;
const PERIPHERAL_END: u32 = 0x6000_0000;
const SYSTEM_BASE: u32 = 0xE000_0000;

// MEM-AP IDR, an AHB-AP
const MEM_AP_IDR: u32 = 0x2477_0011;

// DP register offsets
const DP_IDCODE: u8 = 0x0;
const DP_CTRL_STAT: u8 = 0x4;
const DP_SELECT: u8 = 0x8;
const DP_RDBUFF: u8 = 0xC;

// CTRL/STAT power up request bits, each acknowledged one bit higher
const CTRL_STAT_REQ_BITS: u32 = (1 << 28) | (1 << 30);

// Sticky error flag set by a failed transaction
const ERROR_FLAG_PROTOCOL: u32 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Locked,
    FirstKey,
    UnlockedOnce,
    UnlockedAll,
}

#[derive(Debug)]
struct FlashCtrl {
    config: u32,
    write_address: u32,
    key: KeyState,
    busy_reads: u32,
    locked_writes: u32,
}

impl FlashCtrl {
    fn new() -> Self {
        Self {
            config: 0,
            write_address: 0,
            key: KeyState::Locked,
            busy_reads: 0,
            locked_writes: 0,
        }
    }

    fn write_key(&mut self, value: u32) {
        self.key = match (self.key, value) {
            (_, sim3::FlashKey::LOCK) => KeyState::Locked,
            (KeyState::Locked, sim3::FlashKey::KEY1) => KeyState::FirstKey,
            (KeyState::FirstKey, sim3::FlashKey::UNLOCK_NEXT) => KeyState::UnlockedOnce,
            (KeyState::FirstKey, sim3::FlashKey::UNLOCK_ALL) => KeyState::UnlockedAll,
            (KeyState::UnlockedOnce, _) | (KeyState::UnlockedAll, _) => self.key,
            _ => {
                trace!("Sim: bad flash key 0x{value:02X}, locking");
                KeyState::Locked
            }
        };
    }

    fn unlocked(&self) -> bool {
        matches!(self.key, KeyState::UnlockedOnce | KeyState::UnlockedAll)
    }
}

#[derive(Debug)]
struct Core {
    reset_held: bool,
    halted: bool,
    debugen: bool,
    demcr: u32,
    dfsr: u32,
    dcrdr: u32,
    vtor: u32,
    regs: [u32; 17],
}

impl Core {
    fn new() -> Self {
        Self {
            reset_held: false,
            halted: false,
            debugen: false,
            demcr: 0,
            dfsr: 0,
            dcrdr: 0,
            vtor: 0,
            regs: [0; 17],
        }
    }

    fn dhcsr(&self) -> u32 {
        let mut value = Dhcsr::S_REGRDY;
        if self.debugen {
            value |= Dhcsr::C_DEBUGEN;
        }
        if self.halted {
            value |= Dhcsr::C_HALT | Dhcsr::S_HALT;
        }
        value
    }

    fn write_dhcsr(&mut self, value: u32) {
        if value & 0xFFFF_0000 != Dhcsr::DBGKEY {
            trace!("Sim: DHCSR write without key ignored");
            return;
        }
        self.debugen = value & Dhcsr::C_DEBUGEN != 0;
        if self.debugen && value & Dhcsr::C_HALT != 0 {
            if !self.halted {
                self.dfsr |= Dfsr::HALTED;
            }
            self.halted = true;
        } else {
            self.halted = false;
        }
    }

    fn write_dcrsr(&mut self, value: u32) {
        if !self.halted {
            trace!("Sim: DCRSR write with core running ignored");
            return;
        }
        let (index, write) = Dcrsr::decode(value);
        let Some(reg) = CoreRegister::from_index(index) else {
            return;
        };
        let slot = reg.index() as usize;
        if write {
            self.regs[slot] = self.dcrdr;
        } else {
            self.dcrdr = self.regs[slot];
        }
    }

    // The core leaves reset, loading SP and PC from the vector table.
    fn leave_reset(&mut self, sp: u32, pc: u32) {
        self.regs = [0; 17];
        self.regs[CoreRegister::Sp.index() as usize] = sp;
        self.regs[CoreRegister::Pc.index() as usize] = pc & !1;
        self.vtor = 0;
        if self.debugen && self.demcr & Demcr::VC_CORERESET != 0 {
            self.halted = true;
            self.dfsr |= Dfsr::VCATCH;
        } else {
            self.halted = false;
        }
    }
}

/// Simulated debug adapter and SiM3 target
///
/// ```rust
/// use sim3prog_swd::Transport;
/// use sim3prog_swd::sim::SimTarget;
///
/// let mut target = SimTarget::new();
/// target.open().unwrap();
/// let idcode = target.connect_swd().unwrap();
/// target.queue_read(0x00).unwrap();
/// assert_eq!(target.execute().unwrap(), vec![idcode.data()]);
/// ```
#[derive(Debug)]
pub struct SimTarget {
    open: bool,
    connected: bool,
    mode: DeviceMode,
    queue: Vec<RegisterAccess>,
    log: Vec<Transaction>,
    fail_next: Option<AdiStatus>,
    fail_vid_pid: Option<AdiStatus>,
    extra_results: usize,
    error_flags: u32,

    ctrl_stat: u32,
    select: u32,
    rdbuff: u32,
    csw: u32,
    tar: u32,

    chip_ap_id: u32,
    ctrl1: u32,
    ctrl2: u32,
    lock: u32,
    dap_in: u32,
    erase_busy_reads: u32,
    bulk_busy_reads: u32,

    flash: Vec<u32>,
    sram: Vec<u32>,
    stuck_sram: BTreeMap<u32, u32>,
    flashctrl: FlashCtrl,
    apb_clk: u32,
    core: Core,
    other: BTreeMap<u32, u32>,
}

impl Default for SimTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTarget {
    /// Creates a closed adapter, attached to an erased SiM3 in ARM debug
    /// mode.
    pub fn new() -> Self {
        Self {
            open: false,
            connected: false,
            mode: DeviceMode::DebugArm,
            queue: Vec::new(),
            log: Vec::new(),
            fail_next: None,
            fail_vid_pid: None,
            extra_results: 0,
            error_flags: 0,

            ctrl_stat: 0,
            select: 0,
            rdbuff: 0,
            csw: 0,
            tar: 0,

            chip_ap_id: ChipApId::EXPECTED.data(),
            ctrl1: 0,
            ctrl2: 0,
            lock: 0,
            dap_in: 0,
            erase_busy_reads: DEFAULT_ERASE_BUSY_READS,
            bulk_busy_reads: 0,

            flash: vec![0xFFFF_FFFF; (SIM_FLASH_SIZE / 4) as usize],
            sram: vec![0; ((SIM3_SRAM_TOP - SIM3_SRAM_BASE) / 4) as usize],
            stuck_sram: BTreeMap::new(),
            flashctrl: FlashCtrl::new(),
            apb_clk: 0,
            core: Core::new(),
            other: BTreeMap::new(),
        }
    }

    /// Opens and connects, for tests which start from a connected target.
    pub fn open_and_connect(&mut self) {
        self.open = true;
        self.connected = true;
    }

    /// Makes the SRAM word at `address` always read as `value`, whatever is
    /// written to it.
    pub fn set_stuck_sram(&mut self, address: u32, value: u32) {
        self.stuck_sram.insert(address, value);
    }

    /// Makes the next [`Transport::vid_pid()`] fail with `status`.
    pub fn fail_next_vid_pid(&mut self, status: AdiStatus) {
        self.fail_vid_pid = Some(status);
    }

    /// Makes the next [`Transport::execute()`] fail with `status`.
    pub fn fail_next_execute(&mut self, status: AdiStatus) {
        self.fail_next = Some(status);
    }

    /// Makes the next [`Transport::execute()`] return `count` more results
    /// than reads were queued.
    pub fn extra_results_next_execute(&mut self, count: usize) {
        self.extra_results = count;
    }

    /// Every successfully executed transaction, oldest first.
    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    pub fn clear_transactions(&mut self) {
        self.log.clear();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_device_mode(&mut self, mode: DeviceMode) {
        self.mode = mode;
    }

    /// Sets the value the Chip AP ID register reads as.
    pub fn set_chip_ap_id(&mut self, id: u32) {
        self.chip_ap_id = id;
    }

    /// Sets how many polls page and bulk erases report busy for.
    pub fn set_erase_busy_reads(&mut self, reads: u32) {
        self.erase_busy_reads = reads;
    }

    pub fn core_halted(&self) -> bool {
        self.core.halted
    }

    pub fn core_register(&self, reg: CoreRegister) -> u32 {
        self.core.regs[reg.index() as usize]
    }

    pub fn vtor(&self) -> u32 {
        self.core.vtor
    }

    /// Whether the FLASHCTRL APB clock is on.
    pub fn flash_clock_enabled(&self) -> bool {
        self.apb_clk != 0
    }

    /// Whether FLASHCTRL is locked.
    pub fn flash_locked(&self) -> bool {
        !self.flashctrl.unlocked()
    }

    /// Number of WRITE_DATA writes ignored because FLASHCTRL was locked.
    pub fn locked_write_count(&self) -> u32 {
        self.flashctrl.locked_writes
    }

    /// Reads `count` words of flash directly, bypassing SWD.
    pub fn flash(&self, address: u32, count: usize) -> Vec<u32> {
        (0..count as u32)
            .map(|ii| self.flash_word(address + ii * 4))
            .collect()
    }

    /// Presets flash contents, bypassing FLASHCTRL.
    pub fn load_flash(&mut self, address: u32, words: &[u32]) {
        for (ii, word) in words.iter().enumerate() {
            if let Some(slot) = Self::flash_index(address + ii as u32 * 4) {
                self.flash[slot] = *word;
            }
        }
    }

    /// Reads `count` words of SRAM directly, bypassing SWD.
    pub fn sram(&self, address: u32, count: usize) -> Vec<u32> {
        (0..count as u32)
            .map(|ii| {
                Self::sram_index(address + ii * 4)
                    .map(|slot| self.sram[slot])
                    .unwrap_or(0)
            })
            .collect()
    }

    fn flash_index(address: u32) -> Option<usize> {
        let offset = address.checked_sub(SIM3_FLASH_BASE)?;
        (offset < SIM_FLASH_SIZE).then_some((offset / 4) as usize)
    }

    fn sram_index(address: u32) -> Option<usize> {
        (SIM3_SRAM_BASE..SIM3_SRAM_TOP)
            .contains(&address)
            .then_some(((address - SIM3_SRAM_BASE) / 4) as usize)
    }

    fn flash_word(&self, address: u32) -> u32 {
        Self::flash_index(address)
            .map(|slot| self.flash[slot])
            .unwrap_or(0)
    }

    //
    // Debug Port
    //

    fn dp_read(&mut self, offset: u8) -> u32 {
        match offset {
            DP_IDCODE => IdCode::SIM3_SW_DP.data(),
            DP_CTRL_STAT => {
                let reqs = self.ctrl_stat & CTRL_STAT_REQ_BITS;
                self.ctrl_stat | (reqs << 1)
            }
            DP_SELECT => self.select,
            DP_RDBUFF => self.rdbuff,
            _ => 0,
        }
    }

    fn dp_write(&mut self, offset: u8, value: u32) {
        match offset {
            // ABORT
            DP_IDCODE => self.error_flags = 0,
            DP_CTRL_STAT => self.ctrl_stat = value & CTRL_STAT_REQ_BITS,
            DP_SELECT => self.select = value,
            _ => (),
        }
    }

    //
    // Access Ports
    //

    fn ap_address(&self, offset: u8) -> (u8, u8) {
        let apsel = (self.select >> 24) as u8;
        let bank = ((self.select >> 4) & 0xF) as u8;
        (apsel, (bank << 4) | offset)
    }

    fn ap_read(&mut self, offset: u8) -> u32 {
        let value = match self.ap_address(offset) {
            (MEM_AP_APSEL, address) => self.mem_ap_read(address),
            (CHIP_AP_APSEL, address) => self.chip_ap_read(address),
            _ => 0,
        };
        self.rdbuff = value;
        value
    }

    fn ap_write(&mut self, offset: u8, value: u32) {
        match self.ap_address(offset) {
            (MEM_AP_APSEL, address) => self.mem_ap_write(address, value),
            (CHIP_AP_APSEL, address) => self.chip_ap_write(address, value),
            (apsel, _) => trace!("Sim: write to absent AP {apsel}"),
        }
    }

    fn advance_tar(&mut self) {
        if Csw::from(self.csw).auto_increment() {
            self.tar = self.tar.wrapping_add(4);
        }
    }

    fn mem_ap_read(&mut self, address: u8) -> u32 {
        match address {
            0x00 => self.csw,
            0x04 => self.tar,
            0x0C => {
                let value = self.bus_read(self.tar);
                self.advance_tar();
                value
            }
            0x10..=0x1C => self.bus_read((self.tar & !0xF) | (address as u32 & 0xC)),
            0xFC => MEM_AP_IDR,
            _ => 0,
        }
    }

    fn mem_ap_write(&mut self, address: u8, value: u32) {
        match address {
            0x00 => self.csw = value,
            0x04 => self.tar = value,
            0x0C => {
                self.bus_write(self.tar, value);
                self.advance_tar();
            }
            0x10..=0x1C => self.bus_write((self.tar & !0xF) | (address as u32 & 0xC), value),
            _ => (),
        }
    }

    fn chip_ap_read(&mut self, address: u8) -> u32 {
        match address {
            0x00 => {
                let mut value = self.ctrl1 & Ctrl1::CORE_RESET_AP;
                if self.bulk_busy_reads > 0 {
                    self.bulk_busy_reads -= 1;
                    value |= Ctrl1::USER_ERASE;
                }
                value
            }
            0x04 => self.ctrl2,
            0x08 => self.lock,
            0x14 => self.dap_in,
            0xFC => self.chip_ap_id,
            _ => 0,
        }
    }

    fn chip_ap_write(&mut self, address: u8, value: u32) {
        match address {
            0x00 => self.write_ctrl1(value),
            0x04 => self.ctrl2 = value,
            0x08 => self.lock = value,
            0x14 => self.dap_in = value,
            _ => (),
        }
    }

    fn write_ctrl1(&mut self, value: u32) {
        if value & Ctrl1::USER_ERASE != 0 {
            debug!("Sim: bulk erase");
            self.flash.fill(0xFFFF_FFFF);
            self.bulk_busy_reads = self.erase_busy_reads;
        }
        if value & Ctrl1::SYSRESET_REQ_AP != 0 {
            self.system_reset();
        }

        let hold = value & Ctrl1::CORE_RESET_AP != 0;
        if hold {
            self.core.reset_held = true;
            self.core.halted = false;
        } else if self.core.reset_held {
            self.core.reset_held = false;
            self.release_core_reset();
        }
        self.ctrl1 = value & Ctrl1::CORE_RESET_AP;
    }

    // Resets the peripherals and, unless held, the core.  Debug state
    // survives, as on any Cortex-M system reset.
    fn system_reset(&mut self) {
        debug!("Sim: system reset");
        self.flashctrl.config = 0;
        self.flashctrl.key = KeyState::Locked;
        self.flashctrl.busy_reads = 0;
        self.apb_clk = 0;
        if !self.core.reset_held {
            self.release_core_reset();
        }
    }

    fn release_core_reset(&mut self) {
        let sp = self.flash_word(SIM3_FLASH_BASE);
        let pc = self.flash_word(SIM3_FLASH_BASE + 4);
        self.core.leave_reset(sp, pc);
        debug!(
            "Sim: core left reset {}",
            if self.core.halted { "halted" } else { "running" }
        );
    }

    //
    // AHB bus
    //

    fn bus_read(&mut self, address: u32) -> u32 {
        if let Some(slot) = Self::flash_index(address) {
            return self.flash[slot];
        }
        if let Some(slot) = Self::sram_index(address) {
            return self
                .stuck_sram
                .get(&address)
                .copied()
                .unwrap_or(self.sram[slot]);
        }
        match address {
            FlashConfig::ADDRESS => {
                let mut value = self.flashctrl.config;
                if self.flashctrl.busy_reads > 0 {
                    self.flashctrl.busy_reads -= 1;
                    value |= FlashConfig::BUSY_MASK;
                }
                value
            }
            FlashWriteAddress::ADDRESS => self.flashctrl.write_address,
            ApbClkG0::ADDRESS => self.apb_clk,
            Dhcsr::ADDRESS => self.core.dhcsr(),
            Dcrdr::ADDRESS => self.core.dcrdr,
            Demcr::ADDRESS => self.core.demcr,
            Vtor::ADDRESS => self.core.vtor,
            Dfsr::ADDRESS => self.core.dfsr,
            address if Self::sparse(address) => self.other.get(&address).copied().unwrap_or(0),
            _ => 0,
        }
    }

    fn bus_write(&mut self, address: u32, value: u32) {
        if Self::flash_index(address).is_some() {
            trace!("Sim: direct flash write to 0x{address:08X} ignored");
            return;
        }
        if let Some(slot) = Self::sram_index(address) {
            self.sram[slot] = value;
            return;
        }
        match address {
            FlashConfig::ADDRESS
            | FlashConfig::SET_ADDRESS
            | FlashConfig::CLR_ADDRESS
            | FlashWriteAddress::ADDRESS
            | FlashWriteData::ADDRESS
            | sim3::FlashKey::ADDRESS => self.flashctrl_write(address, value),
            ApbClkG0::ADDRESS => self.apb_clk = value,
            ApbClkG0::SET_ADDRESS => self.apb_clk |= value,
            ApbClkG0::CLR_ADDRESS => self.apb_clk &= !value,
            Dhcsr::ADDRESS => self.core.write_dhcsr(value),
            Dcrsr::ADDRESS => self.core.write_dcrsr(value),
            Dcrdr::ADDRESS => self.core.dcrdr = value,
            Demcr::ADDRESS => self.core.demcr = value,
            Aircr::ADDRESS => {
                if value == Aircr::SYSTEM_RESET {
                    self.system_reset();
                }
            }
            Vtor::ADDRESS => self.core.vtor = value & !0x7F,
            Dfsr::ADDRESS => self.core.dfsr &= !value,
            address if Self::sparse(address) => {
                self.other.insert(address, value);
            }
            _ => (),
        }
    }

    fn sparse(address: u32) -> bool {
        (PERIPHERAL_BASE..PERIPHERAL_END).contains(&address) || address >= SYSTEM_BASE
    }

    fn flashctrl_write(&mut self, address: u32, value: u32) {
        if self.apb_clk == 0 {
            trace!("Sim: FLASHCTRL write with clock gated ignored");
            return;
        }
        match address {
            FlashConfig::ADDRESS => self.flashctrl.config = value,
            FlashConfig::SET_ADDRESS => self.flashctrl.config |= value,
            FlashConfig::CLR_ADDRESS => self.flashctrl.config &= !value,
            FlashWriteAddress::ADDRESS => self.flashctrl.write_address = value,
            FlashWriteData::ADDRESS => self.flash_write_data(value),
            _ => self.flashctrl.write_key(value),
        }
    }

    fn flash_write_data(&mut self, value: u32) {
        if !self.flashctrl.unlocked() {
            trace!("Sim: WRITE_DATA with FLASHCTRL locked ignored");
            self.flashctrl.locked_writes += 1;
            return;
        }

        let config = FlashConfig::from(self.flashctrl.config);
        let address = self.flashctrl.write_address;
        if config.erase_enabled() {
            let page = sim3::page_base(address);
            debug!("Sim: erase page 0x{page:08X}");
            for offset in (0..SIM3_FLASH_PAGE_SIZE).step_by(4) {
                if let Some(slot) = Self::flash_index(page + offset) {
                    self.flash[slot] = 0xFFFF_FFFF;
                }
            }
            self.flashctrl.busy_reads = self.erase_busy_reads;
        } else {
            if let Some(slot) = Self::flash_index(address) {
                let shift = (address & 0x2) * 8;
                let keep = !(FlashWriteData::HALF_WORD_MASK << shift);
                let half = (value & FlashWriteData::HALF_WORD_MASK) << shift;
                self.flash[slot] &= keep | half;
            }
            if config.sequential() {
                self.flashctrl.write_address = address.wrapping_add(2);
            }
        }

        // A single unlock covers one erase, or one sequential run
        if self.flashctrl.key == KeyState::UnlockedOnce
            && (config.erase_enabled() || !config.sequential())
        {
            self.flashctrl.key = KeyState::Locked;
        }
    }

    fn apply(&mut self, access: &RegisterAccess) -> Option<u32> {
        match (access.port(), access.direction()) {
            (Port::Dp, Direction::Read) => Some(self.dp_read(access.offset())),
            (Port::Dp, Direction::Write(value)) => {
                self.dp_write(access.offset(), value);
                None
            }
            (Port::Ap, Direction::Read) => Some(self.ap_read(access.offset())),
            (Port::Ap, Direction::Write(value)) => {
                self.ap_write(access.offset(), value);
                None
            }
        }
    }

    fn require_open(&self) -> Result<(), AdiStatus> {
        if self.open {
            Ok(())
        } else {
            Err(AdiStatus::HwifDeviceNotOpened)
        }
    }

    fn require_connected(&self) -> Result<(), AdiStatus> {
        self.require_open()?;
        if self.connected {
            Ok(())
        } else {
            Err(AdiStatus::ProtDpNotConnected)
        }
    }
}

impl Transport for SimTarget {
    fn open(&mut self) -> Result<(), AdiStatus> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), AdiStatus> {
        self.open = false;
        self.connected = false;
        self.queue.clear();
        Ok(())
    }

    fn vid_pid(&mut self) -> Result<(u16, u16), AdiStatus> {
        self.require_open()?;
        if let Some(status) = self.fail_vid_pid.take() {
            return Err(status);
        }
        Ok((SLAB_VID, UDA_PID))
    }

    fn device_mode(&mut self) -> Result<DeviceMode, AdiStatus> {
        self.require_open()?;
        Ok(self.mode)
    }

    fn connect_swd(&mut self) -> Result<IdCode, AdiStatus> {
        self.require_open()?;
        self.connected = true;
        Ok(IdCode::SIM3_SW_DP)
    }

    fn disconnect(&mut self) -> Result<(), AdiStatus> {
        self.require_open()?;
        self.connected = false;
        Ok(())
    }

    fn queue_read(&mut self, address: u8) -> Result<(), AdiStatus> {
        if let Err(status) = self.require_open() {
            self.queue.clear();
            return Err(status);
        }
        self.queue.push(RegisterAccess::read(address & !ADI_READ_FLAG));
        Ok(())
    }

    fn queue_write(&mut self, address: u8, value: u32) -> Result<(), AdiStatus> {
        if let Err(status) = self.require_open() {
            self.queue.clear();
            return Err(status);
        }
        self.queue.push(RegisterAccess::write(address, value));
        Ok(())
    }

    fn discard(&mut self) {
        self.queue.clear();
    }

    fn execute(&mut self) -> Result<Vec<u32>, AdiStatus> {
        let accesses = std::mem::take(&mut self.queue);
        self.require_connected()?;

        if let Some(status) = self.fail_next.take() {
            if status.class() == AdiClass::Protocol {
                self.error_flags |= ERROR_FLAG_PROTOCOL;
            }
            return Err(status);
        }

        let mut transaction = Transaction::new();
        let mut results = Vec::new();
        for access in accesses {
            if let Some(value) = self.apply(&access) {
                results.push(value);
            }
            transaction.push(access);
        }
        self.log.push(transaction);

        for _ in 0..std::mem::take(&mut self.extra_results) {
            results.push(0);
        }
        Ok(results)
    }

    fn clear_errors(&mut self) -> Result<(u32, u32), AdiStatus> {
        self.require_connected()?;
        let before = self.error_flags;
        self.error_flags = 0;
        Ok((before, 0))
    }

    fn line_reset(&mut self) -> Result<(), AdiStatus> {
        self.require_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn connected() -> SimTarget {
        let mut target = SimTarget::new();
        target.open_and_connect();
        target
    }

    fn run(target: &mut SimTarget, accesses: &[RegisterAccess]) -> Vec<u32> {
        for access in accesses {
            match access.direction() {
                Direction::Read => target.queue_read(access.wire_address()).unwrap(),
                Direction::Write(value) => target.queue_write(access.wire_address(), value).unwrap(),
            }
        }
        target.execute().unwrap()
    }

    fn write_ahb(target: &mut SimTarget, address: u32, value: u32) {
        run(
            target,
            &[
                RegisterAccess::write(0x08, 0),
                RegisterAccess::write(0x01, Csw::word().value()),
                RegisterAccess::write(0x05, address),
                RegisterAccess::write(0x0D, value),
            ],
        );
    }

    #[test]
    fn closed_adapter_rejects() {
        let mut target = SimTarget::new();
        assert_eq!(target.queue_read(0), Err(AdiStatus::HwifDeviceNotOpened));
        assert_eq!(target.connect_swd(), Err(AdiStatus::HwifDeviceNotOpened));
        target.open().unwrap();
        target.queue_read(0).unwrap();
        assert_eq!(target.execute(), Err(AdiStatus::ProtDpNotConnected));
        target.connect_swd().unwrap();
        // The failed queue was discarded
        assert_eq!(target.execute().unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn read_flag_ignored() {
        let mut target = connected();
        target.queue_read(ADI_READ_FLAG).unwrap();
        assert_eq!(target.execute().unwrap(), vec![IdCode::SIM3_SW_DP.data()]);
    }

    #[test]
    fn flashctrl_needs_clock_and_key() {
        let mut target = connected();
        write_ahb(&mut target, FlashWriteAddress::ADDRESS, 0x100);
        assert_eq!(
            run(
                &mut target,
                &[
                    RegisterAccess::write(0x05, FlashWriteAddress::ADDRESS),
                    RegisterAccess::read(0x0D),
                ]
            ),
            vec![0]
        );

        write_ahb(&mut target, ApbClkG0::SET_ADDRESS, ApbClkG0::ENABLE_ALL);
        write_ahb(&mut target, FlashWriteAddress::ADDRESS, 0x100);
        write_ahb(&mut target, FlashWriteData::ADDRESS, 0x1234);
        assert_eq!(target.locked_write_count(), 1);
        assert_eq!(target.flash(0x100, 1), vec![0xFFFF_FFFF]);

        write_ahb(&mut target, sim3::FlashKey::ADDRESS, 0xA5);
        write_ahb(&mut target, sim3::FlashKey::ADDRESS, 0xF1);
        write_ahb(&mut target, FlashWriteData::ADDRESS, 0x1234);
        assert_eq!(target.flash(0x100, 1), vec![0xFFFF_1234]);
        // Single unlock consumed
        assert!(target.flash_locked());
    }

    #[test]
    fn programming_only_clears_bits() {
        let mut target = connected();
        target.load_flash(0x200, &[0x0000_FF00]);
        write_ahb(&mut target, ApbClkG0::SET_ADDRESS, ApbClkG0::ENABLE_ALL);
        write_ahb(&mut target, FlashWriteAddress::ADDRESS, 0x202);
        write_ahb(&mut target, sim3::FlashKey::ADDRESS, 0xA5);
        write_ahb(&mut target, sim3::FlashKey::ADDRESS, 0xF2);
        write_ahb(&mut target, FlashWriteData::ADDRESS, 0xFFFF);
        write_ahb(&mut target, FlashWriteAddress::ADDRESS, 0x200);
        write_ahb(&mut target, FlashWriteData::ADDRESS, 0x0FF0);
        assert_eq!(target.flash(0x200, 1), vec![0x0000_0F00]);
    }

    #[test]
    fn reset_vector_catch() {
        let mut target = connected();
        target.load_flash(0, &[0x2000_8000, 0x0000_0201]);
        write_ahb(&mut target, Dhcsr::ADDRESS, 0xA05F_0001);
        write_ahb(&mut target, Demcr::ADDRESS, Demcr::VC_CORERESET);
        write_ahb(&mut target, Aircr::ADDRESS, Aircr::SYSTEM_RESET);
        assert!(target.core_halted());
        assert_eq!(target.core_register(CoreRegister::Pc), 0x200);
        assert_eq!(target.core_register(CoreRegister::Sp), 0x2000_8000);

        write_ahb(&mut target, Demcr::ADDRESS, 0);
        write_ahb(&mut target, Aircr::ADDRESS, Aircr::SYSTEM_RESET);
        assert!(!target.core_halted());
    }

    #[test]
    fn dhcsr_needs_key() {
        let mut target = connected();
        write_ahb(&mut target, Dhcsr::ADDRESS, 0x0000_0003);
        assert!(!target.core_halted());
        write_ahb(&mut target, Dhcsr::ADDRESS, 0xA05F_0003);
        assert!(target.core_halted());
    }
}
