//! `retrace` captures machine-level call stacks of native processes and
//! resolves them back to source.
//!
//! # What's in the package
//!
//! The workspace consists of largely independent crates, all re-exported
//! from here:
//!
//! - [`common`]: The [`Address`] primitive, symbol [`Name`]s, and memory
//!   mapped binary data.
//! - [`unwind`]: The stack walker. [`capture`] walks the current context,
//!   [`capture_from_context`] walks a supplied one (such as the `ucontext_t`
//!   delivered to a signal handler).
//! - [`symbolize`]: The [`Symbolizer`], which expands each captured address
//!   into logical frames (one per inlined function) with demangled names
//!   and source coordinates. Works for the current process and, via
//!   [`Symbolizer::for_process`] or [`Symbolizer::from_maps_file`], for a
//!   foreign one.
//! - [`demangle`]: Demangling for C++ and Rust symbols.
//!
//! # Usage
//!
//! ```
//! for entry in retrace::capture(0) {
//!     for frame in retrace::resolve(entry) {
//!         println!("{}: {} ({}:{})", entry, frame.symbol, frame.source.file, frame.source.line);
//!     }
//! }
//! ```
//!
//! Capture is signal-safe; resolution is not (it allocates and takes locks).
//! An out-of-process crash handler therefore captures in the dying process
//! and ships the raw addresses to a watchdog, which resolves them with a
//! symbolizer bound to the crashed process.
//!
//! [`common`]: mod@common
//! [`unwind`]: mod@unwind
//! [`symbolize`]: mod@symbolize
//! [`demangle`]: mod@demangle

#![warn(missing_docs)]

#[doc(inline)]
pub use retrace_common as common;
#[doc(inline)]
pub use retrace_demangle as demangle;
#[doc(inline)]
pub use retrace_symbolize as symbolize;
#[doc(inline)]
pub use retrace_unwind as unwind;

pub use retrace_common::{Address, Language, Name, NameMangling};
pub use retrace_symbolize::{
    resolve, resolve_into, resolve_with, LogicalFrame, SourceLocation, Symbolizer,
};
pub use retrace_unwind::{
    capture, capture_from_context, capture_from_context_into, capture_from_context_with,
    capture_from_mutable_context, capture_from_mutable_context_with, capture_from_signal_context,
    capture_from_signal_context_with, capture_into, capture_with, NativeContext,
};
