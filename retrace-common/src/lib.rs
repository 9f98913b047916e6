//! Common functionality for `retrace`.
//!
//! This crate exposes a set of key types:
//!
//!  - [`Address`]: An opaque machine address captured from a call stack.
//!  - [`Name`]: A symbol name that can be demangled with the `retrace-demangle` crate.
//!  - [`ByteView`]: Gives access to binary data in-memory or on the file system.
//!  - [`SelfCell`]: Allows to create self-referential types.
//!
//! This crate is part of the `retrace` workspace.
//!
//! [`Address`]: struct.Address.html
//! [`Name`]: struct.Name.html
//! [`ByteView`]: struct.ByteView.html
//! [`SelfCell`]: struct.SelfCell.html

#![warn(missing_docs)]

mod byteview;
mod cell;
mod types;

pub use crate::byteview::*;
pub use crate::cell::*;
pub use crate::types::*;
