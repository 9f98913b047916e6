//! Value types shared across the `retrace` crates.

use std::borrow::Cow;
use std::fmt;
use std::mem;
use std::str;

/// An opaque machine address captured from a call stack.
///
/// An `Address` wraps a pointer-sized unsigned integer. The zero value means
/// "no address" and compares equal only to another zero-valued address. Apart
/// from that, addresses are totally ordered and hashable by their numeric
/// value; no arithmetic is exposed.
///
/// The `Display` implementation prints the address in lowercase hexadecimal
/// with a `0x` prefix, zero-padded to the pointer width of the running
/// architecture (10 characters on 32-bit targets, 18 on 64-bit ones).
/// Formatting never allocates.
///
/// # Examples
///
/// ```
/// use retrace_common::Address;
///
/// let addr = Address::from_native_handle(0x7f01_2345);
/// assert_eq!(addr.native_handle(), 0x7f01_2345);
/// assert!(!addr.is_null());
///
/// #[cfg(target_pointer_width = "64")]
/// assert_eq!(addr.to_string(), "0x000000007f012345");
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

impl Address {
    /// The "no address" value.
    pub const NULL: Address = Address(0);

    /// The width of a formatted address: one character per 4 bits, plus two
    /// characters for the `0x` prefix.
    const DISPLAY_WIDTH: usize = 2 + mem::size_of::<usize>() * 2;

    /// Creates an address from its native integer representation.
    #[inline]
    pub const fn from_native_handle(handle: usize) -> Self {
        Address(handle)
    }

    /// Returns the native integer representation of this address.
    #[inline]
    pub const fn native_handle(self) -> usize {
        self.0
    }

    /// Returns `true` if this is the zero address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<usize> for Address {
    fn from(handle: usize) -> Self {
        Address(handle)
    }
}

impl From<Address> for usize {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#0width$x}", self.0, width = Self::DISPLAY_WIDTH)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address")
            .field(&format_args!("{:#x}", self.0))
            .finish()
    }
}

/// An error returned for an invalid [`Language`](enum.Language.html).
#[derive(Debug)]
pub struct UnknownLanguageError;

impl fmt::Display for UnknownLanguageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown language")
    }
}

impl std::error::Error for UnknownLanguageError {}

/// A programming language declared in debugging information.
///
/// In the context of function names, the language helps to determine the
/// appropriate strategy for demangling. See the [`Name`] type, which declares
/// a function name with an optional language.
///
/// [`Name`]: struct.Name.html
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Language {
    #[default]
    Unknown,
    C,
    Cpp,
    D,
    Go,
    ObjC,
    ObjCpp,
    Rust,
    Swift,
}

impl Language {
    /// Returns the name of the language.
    ///
    /// The name is always given in lower case without special characters or
    /// spaces, suitable for serialization and parsing. For a human readable
    /// name, use the `Display` implementation, instead.
    pub fn name(self) -> &'static str {
        match self {
            Language::Unknown => "unknown",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::D => "d",
            Language::Go => "go",
            Language::ObjC => "objc",
            Language::ObjCpp => "objcpp",
            Language::Rust => "rust",
            Language::Swift => "swift",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = match *self {
            Language::Unknown => "unknown",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::D => "D",
            Language::Go => "Go",
            Language::ObjC => "Objective-C",
            Language::ObjCpp => "Objective-C++",
            Language::Rust => "Rust",
            Language::Swift => "Swift",
        };

        write!(f, "{}", formatted)
    }
}

impl str::FromStr for Language {
    type Err = UnknownLanguageError;

    fn from_str(string: &str) -> Result<Language, UnknownLanguageError> {
        Ok(match string {
            "unknown" => Language::Unknown,
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "d" => Language::D,
            "go" => Language::Go,
            "objc" => Language::ObjC,
            "objcpp" => Language::ObjCpp,
            "rust" => Language::Rust,
            "swift" => Language::Swift,
            _ => return Err(UnknownLanguageError),
        })
    }
}

/// The mangling state of a [`Name`].
///
/// [`Name`]: struct.Name.html
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum NameMangling {
    /// The [`Name`] is definitely mangled.
    Mangled,
    /// The [`Name`] is not mangled and can be used verbatim.
    Unmangled,
    /// The mangling state of the [`Name`] is unknown; demanglers should be
    /// run and may fall back to the raw name.
    #[default]
    Unknown,
}

/// The name of a potentially mangled symbol.
///
/// Debugging information often only contains mangled names in its symbol and
/// debug records. The mangling schema depends on the compiler and programming
/// language. `Name` is a wrapper type for potentially mangled names, their
/// mangling state, and an optionally declared language. To demangle a name,
/// use the `Demangle` trait from the `retrace-demangle` crate.
///
/// Not all sources declare a programming language. In such a case, the
/// [`language`] will be `Unknown`; it may still be inferred for demangling by
/// inspecting the mangled string.
///
/// # Examples
///
/// ```
/// use retrace_common::{Language, Name, NameMangling};
///
/// let name = Name::new("_ZN3foo3barEv", NameMangling::Mangled, Language::Cpp);
/// assert_eq!(name.to_string(), "_ZN3foo3barEv");
/// assert_eq!(format!("{:#}", name), "_ZN3foo3barEv [C++]");
/// ```
///
/// [`language`]: struct.Name.html#method.language
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Name<'a> {
    string: Cow<'a, str>,
    mangling: NameMangling,
    lang: Language,
}

impl<'a> Name<'a> {
    /// Constructs a new name with the given mangling state and language.
    #[inline]
    pub fn new<S>(string: S, mangling: NameMangling, lang: Language) -> Self
    where
        S: Into<Cow<'a, str>>,
    {
        Name {
            string: string.into(),
            mangling,
            lang,
        }
    }

    /// Returns the raw, possibly mangled string of the name.
    pub fn as_str(&self) -> &str {
        &self.string
    }

    /// Returns whether the name is mangled, not mangled, or unspecified.
    pub fn mangling(&self) -> NameMangling {
        self.mangling
    }

    /// The language of the symbol, or `Language::Unknown` if undeclared.
    pub fn language(&self) -> Language {
        self.lang
    }

    /// Converts this name into a `String`, dropping language and mangling.
    pub fn into_string(self) -> String {
        self.string.into_owned()
    }
}

impl AsRef<str> for Name<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<Name<'_>> for String {
    fn from(name: Name<'_>) -> Self {
        name.string.into()
    }
}

impl fmt::Display for Name<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;

        if f.alternate() && self.lang != Language::Unknown {
            write!(f, " [{}]", self.lang)?;
        }

        Ok(())
    }
}

macro_rules! impl_eq {
    ($lhs:ty, $rhs: ty) => {
        impl<'a, 'b> PartialEq<$rhs> for $lhs {
            #[inline]
            fn eq(&self, other: &$rhs) -> bool {
                PartialEq::eq(&self.string, other)
            }
        }

        impl<'a, 'b> PartialEq<$lhs> for $rhs {
            #[inline]
            fn eq(&self, other: &$lhs) -> bool {
                PartialEq::eq(self, &other.string)
            }
        }
    };
}

impl_eq! { Name<'a>, str }
impl_eq! { Name<'a>, &'b str }
impl_eq! { Name<'a>, String }
impl_eq! { Name<'a>, std::borrow::Cow<'b, str> }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_width() {
        let addr = Address::from_native_handle(0xbeef);

        #[cfg(target_pointer_width = "64")]
        assert_eq!(addr.to_string(), "0x000000000000beef");
        #[cfg(target_pointer_width = "32")]
        assert_eq!(addr.to_string(), "0x0000beef");
    }

    #[test]
    fn test_address_display_round_trip() {
        let addr = Address::from_native_handle(0x7fff_1234_5678);
        let formatted = addr.to_string();

        assert!(formatted.starts_with("0x"));
        let parsed = usize::from_str_radix(&formatted[2..], 16).unwrap();
        assert_eq!(parsed, addr.native_handle());
    }

    #[test]
    fn test_address_null() {
        assert!(Address::NULL.is_null());
        assert_eq!(Address::NULL, Address::from_native_handle(0));
        assert_ne!(Address::NULL, Address::from_native_handle(1));
    }

    #[test]
    fn test_address_ordering() {
        let low = Address::from_native_handle(0x1000);
        let high = Address::from_native_handle(0x2000);
        assert!(low < high);
    }
}
