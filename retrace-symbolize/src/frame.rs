//! Logical stack frames produced by the symbolizer.

use retrace_common::Address;

/// A source coordinate within a file.
///
/// Any field may be empty or zero when the corresponding information is not
/// present in the debug info. Line and column numbers are clamped to the
/// `u32` range; zero means "unknown".
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct SourceLocation {
    /// Path of the source file, joined with the compilation directory.
    pub file: String,
    /// Line number, starting at 1. Zero means no line number.
    pub line: u32,
    /// Column number, starting at 1. Zero means no column number.
    pub column: u32,
}

/// One logical call-chain entry expanded from a physical frame.
///
/// A physical frame (one return address) expands into one or more logical
/// frames: one per inlined function contributing to the instruction, plus the
/// containing physical function. Logical frames own their strings and stay
/// valid after the symbolizer that produced them is dropped.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LogicalFrame {
    /// The physical address this frame was expanded from.
    pub physical: Address,
    /// `true` for an inlined call site, `false` for the innermost physical
    /// function body.
    pub inlined: bool,
    /// Human-readable (demangled if possible) symbol name; possibly empty.
    pub symbol: String,
    /// Source coordinates of this frame.
    pub source: SourceLocation,
}

impl LogicalFrame {
    /// Creates a bare frame that carries only the physical address.
    ///
    /// Bare frames are emitted when no debug information could be applied to
    /// an address.
    pub(crate) fn bare(physical: Address) -> Self {
        LogicalFrame {
            physical,
            ..Default::default()
        }
    }
}
