//! Kernel log monitoring: non-blocking kmsg reader and crash signature.

pub mod kmsg;
pub mod signature;
