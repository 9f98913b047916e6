//! Language detection tests.

use retrace_common::{Language, Name, NameMangling};
use retrace_demangle::Demangle;

fn name(mangled: &str) -> Name<'_> {
    Name::new(mangled, NameMangling::Unknown, Language::Unknown)
}

#[test]
fn test_detect_cpp() {
    assert_eq!(name("_ZN3foo3barEv").detect_language(), Language::Cpp);
}

#[test]
fn test_detect_msvc_as_cpp() {
    assert_eq!(name("?square@@YAHH@Z").detect_language(), Language::Cpp);
}

#[cfg(feature = "rust")]
#[test]
fn test_detect_rust() {
    assert_eq!(
        name("_ZN3std2io4Read11read_to_end17hb85a0f6802e14499E").detect_language(),
        Language::Rust
    );
}

#[test]
fn test_detect_objc() {
    assert_eq!(name("-[UIApplication run]").detect_language(), Language::ObjC);
}

#[test]
fn test_detect_none() {
    assert_eq!(name("main").detect_language(), Language::Unknown);
    assert_eq!(name("").detect_language(), Language::Unknown);
}

#[test]
fn test_explicit_language_wins() {
    let name = Name::new("_ZN3foo3barEv", NameMangling::Mangled, Language::Rust);
    assert_eq!(name.detect_language(), Language::Rust);
}
