// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SRAM image loading
//!
//! Loads a Cortex-M vector table and code image into SRAM, verifies it,
//! points VTOR at it, and starts the core at the image's reset handler.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use sim3prog_core::arm::scs::{CoreRegister, Dhcsr, Vtor};

use crate::SwdError;
use crate::config::ProgrammerConfig;
use crate::session::Session;
use crate::transport::Transport;

/// A firmware image: a word array to be placed at a base address.
///
/// Word 0 is the initial stack pointer and word 1 the reset vector, as in any
/// Cortex-M vector table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    base: u32,
    words: Vec<u32>,
}

impl MemoryImage {
    /// Creates an image from words.
    ///
    /// Returns:
    /// - `Err(SwdError::InvalidImage)`: if the image is too short to hold a
    ///   reset vector, `base` is not word aligned, or the image runs past the
    ///   end of the address space.
    pub fn new(base: u32, words: Vec<u32>) -> Result<Self, SwdError> {
        if base & 0x3 != 0 {
            return Err(SwdError::InvalidImage(format!(
                "base 0x{base:08X} is not word aligned"
            )));
        }
        if words.len() < 2 {
            return Err(SwdError::InvalidImage(format!(
                "{} words is too short for a vector table",
                words.len()
            )));
        }
        if word_address(base, words.len()).is_none() {
            return Err(SwdError::InvalidImage(format!(
                "{} words at 0x{base:08X} runs past the end of the address space",
                words.len()
            )));
        }
        Ok(Self { base, words })
    }

    /// Creates an image from a little-endian binary, such as the output of
    /// `objcopy -O binary`.
    pub fn from_bytes(base: u32, bytes: &[u8]) -> Result<Self, SwdError> {
        if bytes.len() % 4 != 0 {
            return Err(SwdError::InvalidImage(format!(
                "{} bytes is not a whole number of words",
                bytes.len()
            )));
        }
        let words = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::new(base, words)
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The reset handler address, with the Thumb bit cleared.
    pub fn reset_handler(&self) -> u32 {
        self.words[1] & !1
    }
}

// The address `index` words on from `base`, if it is addressable.
fn word_address(base: u32, index: usize) -> Option<u32> {
    u32::try_from(index)
        .ok()
        .and_then(|index| index.checked_mul(4))
        .and_then(|offset| base.checked_add(offset))
}

/// Splits `len` words into chunks of at most `chunk` words.
pub fn chunk_sizes(len: usize, chunk: usize) -> Vec<usize> {
    if chunk == 0 {
        return Vec::new();
    }
    (0..len)
        .step_by(chunk)
        .map(|start| chunk.min(len - start))
        .collect()
}

/// A word which read back differently to how it was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Word index within the image
    pub index: usize,
    pub expected: u32,
    pub read: u32,
}

/// Result of an SRAM load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub words_written: usize,
    pub chunks: usize,
    /// Total number of words which failed verification
    pub mismatch_count: usize,
    /// The first mismatches found, up to the configured report limit
    pub mismatches: Vec<Mismatch>,
    pub reset_handler: u32,
    /// PC as read back after being set
    pub pc_readback: u32,
    /// DHCSR as read after releasing the core
    pub dhcsr_readback: u32,
}

impl LoadReport {
    /// Whether the image verified, and PC was set correctly.
    pub fn verified(&self) -> bool {
        self.mismatch_count == 0 && self.pc_readback == self.reset_handler
    }
}

/// SRAM image loader
///
/// Borrows a [`Session`], whose core must be halted.  On success the core
/// has been released and is running the image.
#[derive(Debug)]
pub struct ImageLoader<'a, T: Transport> {
    session: &'a mut Session<T>,
    config: ProgrammerConfig,
}

impl<'a, T: Transport> ImageLoader<'a, T> {
    pub fn new(session: &'a mut Session<T>) -> Self {
        Self {
            session,
            config: ProgrammerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: &ProgrammerConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Loads `image` into SRAM and starts it.
    ///
    /// The image is written in chunks, each read back and compared.
    /// Verification failures are reported in the returned [`LoadReport`],
    /// rather than as an error, and the load continues.
    ///
    /// Once written, VTOR is pointed at the image base, PC set to the reset
    /// handler, SP to the configured initial value, and the core released.
    ///
    /// Returns:
    /// - `Ok(LoadReport)`: the load completed.  Check
    ///   [`LoadReport::verified()`].
    /// - `Err(SwdError::NotHalted)`: if the core was not halted.
    /// - `Err(SwdError)`: if any access failed.
    pub fn load(&mut self, image: &MemoryImage) -> Result<LoadReport, SwdError> {
        self.session.require_halted()?;
        if self.config.chunk_words == 0 {
            return Err(SwdError::InvalidArgument(
                "chunk_words must be non-zero".to_string(),
            ));
        }

        info!(
            "Loading {} words to SRAM at 0x{:08X}",
            image.len(),
            image.base()
        );
        let mut report = LoadReport {
            reset_handler: image.reset_handler(),
            ..Default::default()
        };

        let mut start = 0;
        for size in chunk_sizes(image.len(), self.config.chunk_words) {
            let words = &image.words()[start..start + size];
            let address = word_address(image.base(), start).ok_or_else(|| {
                SwdError::InvalidImage(format!("word {start} is beyond the address space"))
            })?;
            debug!("Writing chunk of {size} words at 0x{address:08X}");

            let swd = self.session.swd_if();
            swd.write_block(address, words)?;
            let read = swd.read_block(address, size)?;
            self.verify_chunk(&mut report, start, words, &read);

            report.words_written += size;
            report.chunks += 1;
            start += size;
        }

        if report.mismatch_count > 0 {
            warn!(
                "{} of {} words failed verification",
                report.mismatch_count, report.words_written
            );
        }

        let swd = self.session.swd_if();
        debug!("Setting VTOR to 0x{:08X}", image.base());
        swd.write_block(Vtor::ADDRESS, &[image.base()])?;

        debug!("Setting PC to 0x{:08X}", report.reset_handler);
        swd.write_core_register(CoreRegister::Pc, report.reset_handler)?;
        report.pc_readback = swd.read_core_register(CoreRegister::Pc)?;
        if report.pc_readback != report.reset_handler {
            warn!(
                "PC read back as 0x{:08X}, expected 0x{:08X}",
                report.pc_readback, report.reset_handler
            );
        }

        swd.write_core_register(CoreRegister::Sp, self.config.initial_sp)?;

        self.session.release_core()?;
        let dhcsr = Dhcsr::from(self.session.swd_if().read_ahb(Dhcsr::ADDRESS)?);
        debug!("Value: DHCSR after release: {dhcsr:#}");
        report.dhcsr_readback = dhcsr.into();

        info!("Image loaded, core started at 0x{:08X}", report.reset_handler);
        Ok(report)
    }

    fn verify_chunk(&self, report: &mut LoadReport, start: usize, written: &[u32], read: &[u32]) {
        for (offset, (expected, read)) in written.iter().zip(read).enumerate() {
            if expected == read {
                continue;
            }
            let index = start + offset;
            report.mismatch_count += 1;
            if report.mismatches.len() < self.config.mismatch_report_limit {
                warn!("Word {index}: wrote 0x{expected:08X}, read 0x{read:08X}");
                report.mismatches.push(Mismatch {
                    index,
                    expected: *expected,
                    read: *read,
                });
            }
        }
    }
}
