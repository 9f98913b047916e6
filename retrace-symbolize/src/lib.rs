//! The symbolizer of the `retrace` workspace.
//!
//! This crate translates physical stack addresses, as produced by the
//! `retrace-unwind` walker, into *logical* frames: one entry per inlined
//! function contributing to the instruction, each with a demangled symbol
//! name and source coordinates.
//!
//! Resolution runs through three cooperating parts:
//!
//!  - a [module map](ModuleMap) locates the code module owning an address,
//!    either in the current process or in a foreign one;
//!  - a [session cache](SessionCache) opens at most one
//!    [debug session](ModuleSession) per module, holding its memory-mapped
//!    file, DWARF readers and symbol table;
//!  - the [`Symbolizer`] drives both, walks the DWARF inline chain at the
//!    address and hands each logical frame to a caller-supplied sink.
//!
//! Failures never surface as errors: an address that cannot be resolved
//! yields a single *bare* frame carrying only the input address.
//!
//! # Examples
//!
//! ```
//! use retrace_symbolize::Symbolizer;
//!
//! let symbolizer = Symbolizer::new();
//! for frame in symbolizer.resolve(retrace_symbolize::Address::NULL) {
//!     println!("{} {}:{}", frame.symbol, frame.source.file, frame.source.line);
//! }
//! ```

#![warn(missing_docs)]

mod cache;
mod dwarf;
mod elf;
mod frame;
mod modmap;
mod symbolizer;
mod symbols;

pub use retrace_common::Address;

pub use crate::cache::{ModuleSession, SessionCache, SessionError};
pub use crate::dwarf::{Dwarf, DwarfError, DwarfErrorKind, DwarfSection, Endian};
pub use crate::elf::{ElfError, ElfObject};
pub use crate::frame::{LogicalFrame, SourceLocation};
pub use crate::modmap::{LocalModuleMap, ModuleMap, ModuleRecord, RemoteModuleMap};
pub use crate::symbolizer::{resolve, resolve_into, resolve_with, Symbolizer};
pub use crate::symbols::{Symbol, SymbolMap};
