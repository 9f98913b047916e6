//! The stack walker of the `retrace` workspace.
//!
//! This crate captures machine-level call stacks as sequences of [`Address`]
//! values, one per physical stack frame, in caller-closest order. Capturing
//! works from the current point of execution ([`capture`]) as well as from a
//! caller-supplied machine context ([`capture_from_context`]), such as the
//! `ucontext_t` delivered to a signal handler.
//!
//! Unwinding is driven by libunwind's local cursor API over the DWARF call
//! frame information of the loaded modules. Frames without unwind info are
//! handled with a leaf-frame fallback that reads the return address off the
//! top of the stack.
//!
//! The emitted addresses are *reporting addresses*: one less than the return
//! address, so that they point into the calling instruction. Signal frames
//! are exempt from this adjustment since their instruction pointer is the
//! interrupted instruction itself.
//!
//! # Examples
//!
//! ```
//! let entries = retrace_unwind::capture(0);
//! assert!(!entries.is_empty());
//! ```
//!
//! [`Address`]: struct.Address.html
//! [`capture`]: fn.capture.html
//! [`capture_from_context`]: fn.capture_from_context.html

#![warn(missing_docs)]

mod capture;
mod cursor;
mod sys;

pub use retrace_common::Address;

pub use crate::capture::*;

/// The platform-defined machine context consumed by the walker.
///
/// On the supported platforms this is `libc::ucontext_t`, which is both what
/// a signal handler receives and what `libc::getcontext` fills in.
pub type NativeContext = libc::ucontext_t;
