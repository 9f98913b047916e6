//! C++ Itanium demangling tests.
//!
//! `cpp_demangle` runs the libiberty test suite; these are basic regression
//! tests to detect demangling differences.

#![cfg(feature = "cpp")]

#[macro_use]
mod utils;

use retrace_common::Language;
use retrace_demangle::DemangleOptions;

#[test]
fn test_demangle_cpp() {
    assert_demangle!(Language::Cpp, DemangleOptions::name_only().parameters(true), {
        "_ZN3foo3barEv" => "foo::bar()",
        "_ZN12_GLOBAL__N_15startEv" => "(anonymous namespace)::start()",
        "__ZN12_GLOBAL__N_15startEv" => "(anonymous namespace)::start()",
        "_ZZN12_GLOBAL__N_15helloEvENK3$_0clEv" => "(anonymous namespace)::hello()::$_0::operator()() const",
    });
}

#[test]
fn test_demangle_cpp_no_args() {
    assert_demangle!(Language::Cpp, DemangleOptions::name_only(), {
        "_ZN3foo3barEv" => "foo::bar",
        "_ZN12_GLOBAL__N_15startEv" => "(anonymous namespace)::start",
    });
}

#[test]
fn test_demangle_cpp_hash_suffix() {
    assert_demangle!(Language::Cpp, DemangleOptions::name_only().parameters(true), {
        "_ZN3foo3barEv$0123456789abcdef0123456789abcdef" => "foo::bar()",
    });
}
