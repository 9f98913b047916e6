//! Symbol tables used as a fallback when no debug info covers an address.

use std::borrow::Cow;
use std::fmt;
use std::iter::FromIterator;
use std::ops::Deref;

/// A symbol from a module's symbol table.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Symbol<'data> {
    /// The name of the symbol, generally mangled.
    pub name: Option<Cow<'data, str>>,

    /// The address of this symbol, relative to the linked load address.
    pub address: u64,

    /// The size of this symbol, if known.
    pub size: u64,
}

impl<'data> Symbol<'data> {
    /// Returns the name of this symbol as string.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Determines whether the given address is covered by this symbol.
    ///
    /// If the symbol size has not been computed, the address is assumed to be
    /// covered if it is greater than the symbol address. Otherwise, the
    /// address must be in the half-open interval `[address, address + size)`.
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && (self.size == 0 || address < self.address + self.size)
    }
}

impl fmt::Debug for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name().unwrap_or("<unknown>"))
            .field("address", &format_args!("{:#x}", self.address))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

/// A sorted list of symbols, suitable for quick address lookups.
///
/// Symbols in the map are guaranteed to have a `size` set, except for the
/// last symbol, whose size is computed from the offset to the subsequent
/// symbol.
///
/// ## Example
///
/// ```rust
/// use retrace_symbolize::{Symbol, SymbolMap};
///
/// let map = SymbolMap::from(vec![
///     Symbol { name: Some("A".into()), address: 0x4400, size: 0 },
///     Symbol { name: Some("B".into()), address: 0x4200, size: 0 },
/// ]);
///
/// assert_eq!(map.lookup(0x4300).unwrap().name(), Some("B"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct SymbolMap<'data> {
    symbols: Vec<Symbol<'data>>,
}

impl<'data> SymbolMap<'data> {
    /// Creates a new, empty symbol map.
    pub fn new() -> Self {
        SymbolMap {
            symbols: Vec::new(),
        }
    }

    /// Looks up the symbol covering the given address.
    pub fn lookup(&self, address: u64) -> Option<&Symbol<'data>> {
        match self.symbols.binary_search_by_key(&address, Self::key) {
            Ok(index) => Some(&self.symbols[index]),
            Err(0) => None,
            Err(next_index) => {
                let symbol = &self.symbols[next_index - 1];
                symbol.contains(address).then_some(symbol)
            }
        }
    }

    /// Returns the lookup key for a symbol, which is the symbol's address.
    #[inline(always)]
    fn key(symbol: &Symbol<'data>) -> u64 {
        symbol.address
    }
}

impl<'d> Deref for SymbolMap<'d> {
    type Target = [Symbol<'d>];

    fn deref(&self) -> &Self::Target {
        &self.symbols
    }
}

impl<'d> From<Vec<Symbol<'d>>> for SymbolMap<'d> {
    fn from(mut symbols: Vec<Symbol<'d>>) -> Self {
        if !symbols.is_empty() {
            // Multiple symbols may point at the same location, such as
            // equivalent destructor variants sharing one body. Any of them
            // names the location equally well, so keep the first.
            dmsort::sort_by_key(&mut symbols, Self::key);

            symbols.dedup_by(|next, symbol| {
                if symbol.size == 0 {
                    symbol.size = next.address - symbol.address;
                }
                symbol.address == next.address
            })
        }

        SymbolMap { symbols }
    }
}

impl<'d> FromIterator<Symbol<'d>> for SymbolMap<'d> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Symbol<'d>>,
    {
        Vec::from_iter(iter).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, address: u64, size: u64) -> Symbol<'_> {
        Symbol {
            name: Some(name.into()),
            address,
            size,
        }
    }

    #[test]
    fn test_lookup_fills_sizes() {
        let map = SymbolMap::from(vec![
            symbol("c", 0x3000, 0),
            symbol("a", 0x1000, 0),
            symbol("b", 0x2000, 0),
        ]);

        assert_eq!(map[0].size, 0x1000);
        assert_eq!(map.lookup(0x1fff).unwrap().name(), Some("a"));
        assert_eq!(map.lookup(0x2000).unwrap().name(), Some("b"));
    }

    #[test]
    fn test_lookup_below_first() {
        let map = SymbolMap::from(vec![symbol("a", 0x1000, 0x10)]);
        assert!(map.lookup(0xfff).is_none());
    }

    #[test]
    fn test_lookup_respects_size_of_last() {
        let map = SymbolMap::from(vec![symbol("a", 0x1000, 0x10)]);
        assert!(map.lookup(0x100f).is_some());
        assert!(map.lookup(0x1010).is_none());
    }
}
