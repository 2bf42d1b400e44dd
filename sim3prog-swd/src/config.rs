// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Programmer configuration
//!
//! The defaults suit all SiM3U/C/L parts.  Any field may be overridden from
//! JSON, with missing fields taking their default value:
//!
//! ```json
//! {
//!     "chunk_words": 256,
//!     "flash_key": "unlock_next",
//!     "poll_limit": { "attempts": 100000 }
//! }
//! ```

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use sim3prog_core::sim3::{SIM3_SRAM_BASE, SIM3_SRAM_TOP};

use crate::SwdError;
use crate::control::PollLimit;
use crate::flash::FlashKey;

/// Default number of words written per SRAM load chunk
pub const DEFAULT_CHUNK_WORDS: usize = 1024;

/// Default number of verification mismatches reported individually
pub const DEFAULT_MISMATCH_REPORT_LIMIT: usize = 100;

/// Programming parameters used by [`crate::FlashEngine`] and
/// [`crate::ImageLoader`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgrammerConfig {
    /// Address SRAM images are loaded at, also written to VTOR
    pub sram_base: u32,

    /// Words written, then verified, per SRAM load chunk
    pub chunk_words: usize,

    /// Stack pointer value set before starting a loaded image
    pub initial_sp: u32,

    /// Second FLASHCTRL unlock key
    pub flash_key: FlashKey,

    /// How long to poll erase busy flags for
    pub poll_limit: PollLimit,

    /// Maximum number of verification mismatches reported individually
    pub mismatch_report_limit: usize,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            sram_base: SIM3_SRAM_BASE,
            chunk_words: DEFAULT_CHUNK_WORDS,
            initial_sp: SIM3_SRAM_TOP,
            flash_key: FlashKey::default(),
            poll_limit: PollLimit::default(),
            mismatch_report_limit: DEFAULT_MISMATCH_REPORT_LIMIT,
        }
    }
}

impl ProgrammerConfig {
    /// Parses a configuration from JSON.  The result is not validated.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Checks the configuration can be used.
    ///
    /// Returns:
    /// - `Ok(())`: if valid.
    /// - `Err(SwdError::InvalidArgument)`: describing the first problem
    ///   found.
    pub fn validate(&self) -> Result<(), SwdError> {
        if self.chunk_words == 0 {
            return Err(SwdError::InvalidArgument(
                "chunk_words must be non-zero".to_string(),
            ));
        }
        if self.sram_base & 0x3 != 0 {
            return Err(SwdError::InvalidArgument(format!(
                "sram_base 0x{:08X} is not word aligned",
                self.sram_base
            )));
        }
        // VTOR ignores its low 7 bits
        if self.sram_base & 0x7F != 0 {
            warn!(
                "sram_base 0x{:08X} is not 128 byte aligned, VTOR will be truncated",
                self.sram_base
            );
        }
        if self.initial_sp & 0x3 != 0 {
            return Err(SwdError::InvalidArgument(format!(
                "initial_sp 0x{:08X} is not word aligned",
                self.initial_sp
            )));
        }
        if self.poll_limit == PollLimit::Attempts(0) {
            return Err(SwdError::InvalidArgument(
                "poll_limit attempts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn defaults() {
        let config = ProgrammerConfig::default();
        assert_eq!(config.sram_base, 0x2000_0000);
        assert_eq!(config.initial_sp, 0x2000_8000);
        assert_eq!(config.chunk_words, 1024);
        assert_eq!(config.flash_key, FlashKey::UnlockAll);
        assert_eq!(config.poll_limit, PollLimit::Unbounded);
        assert_eq!(config.mismatch_report_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json() {
        let config = ProgrammerConfig::from_json(
            r#"{"chunk_words": 256, "flash_key": "unlock_next", "poll_limit": {"attempts": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.chunk_words, 256);
        assert_eq!(config.flash_key, FlashKey::UnlockNext);
        assert_eq!(config.poll_limit, PollLimit::Attempts(10));
        assert_eq!(config.sram_base, 0x2000_0000);
    }

    #[test]
    fn bad_json() {
        assert!(ProgrammerConfig::from_json(r#"{"flash_key": "unlock_some"}"#).is_err());
    }

    #[test_case(r#"{"chunk_words": 0}"#; "zero chunk")]
    #[test_case(r#"{"sram_base": 536870914}"#; "unaligned base")]
    #[test_case(r#"{"initial_sp": 536903681}"#; "unaligned sp")]
    #[test_case(r#"{"poll_limit": {"attempts": 0}}"#; "zero attempts")]
    fn invalid(json: &str) {
        let config = ProgrammerConfig::from_json(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(SwdError::InvalidArgument(_))
        ));
    }
}
