//! Rust demangling tests.

#![cfg(feature = "rust")]

#[macro_use]
mod utils;

use retrace_common::Language;
use retrace_demangle::DemangleOptions;

#[test]
fn test_demangle_rust_legacy() {
    assert_demangle!(Language::Rust, DemangleOptions::complete(), {
        "_ZN3std2io4Read11read_to_end17hb85a0f6802e14499E" => "std::io::Read::read_to_end",
        "__ZN3std2io4Read11read_to_end17hb85a0f6802e14499E" => "std::io::Read::read_to_end",
        "_ZN4core3fmt9Arguments6new_v117h19dc45414b348708E" => "core::fmt::Arguments::new_v1",
    });
}
