//! Crash signature for the ath10k_pci firmware failure.
//!
//! Matching runs over raw read chunks rather than parsed kmsg records. A chunk
//! can hold any number of records, and the signature only has to appear
//! somewhere inside it.

use regex::bytes::Regex;

use crate::core::errors::Result;

/// Subsystem marker (`;` separates the kmsg prefix from the message) followed
/// on the same line by one of the two known failure phrases. Unicode mode is
/// off so `.` also steps over bytes that are not valid UTF-8.
pub const CRASH_PATTERN: &str =
    r"(?i-u);ath10k_pci.*(?:could not init core|failed to pop paddr list)";

/// Compiled crash signature. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct CrashDetector {
    signature: Regex,
}

impl CrashDetector {
    /// Compile the crash signature.
    pub fn new() -> Result<Self> {
        Ok(Self {
            signature: Regex::new(CRASH_PATTERN)?,
        })
    }

    /// Whether `chunk` contains the crash signature.
    #[must_use]
    pub fn matches(&self, chunk: &[u8]) -> bool {
        self.signature.is_match(chunk)
    }
}
