//! Raw libunwind bindings for the local (same-process) unwind interface.
//!
//! libunwind prefixes its entry points per architecture, so each supported
//! architecture gets its own binding module with identical shape.

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "x86_64")]
mod x86_64;

#[cfg(target_arch = "aarch64")]
pub use self::aarch64::*;
#[cfg(target_arch = "x86_64")]
pub use self::x86_64::*;

/// `unw_init_local2` flag marking the context as a signal frame.
pub const UNW_INIT_SIGNAL_FRAME: i32 = 1;

/// `unw_step` / `unw_get_reg` error: no unwind info found for the address.
pub const UNW_ENOINFO: i32 = 10;
