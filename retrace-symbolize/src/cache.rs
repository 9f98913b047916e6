//! Per-module debug sessions and the cache that shares them.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use retrace_common::{Address, AsSelf, ByteView, Name, NameMangling, SelfCell};

use crate::dwarf::{DwarfError, DwarfInfo, DwarfSections, RawFrame};
use crate::elf::{ElfError, ElfObject};
use crate::symbols::SymbolMap;

/// Applies the address bias, translating a runtime address into the module's
/// linked address space.
///
/// This function does not panic but would wrap around if too large or small
/// numbers are passed.
fn unbias(addr: u64, bias: i64) -> u64 {
    (addr as i64).wrapping_sub(bias) as u64
}

/// An error opening a module's debug session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The module file could not be read or mapped.
    #[error("failed to map module file")]
    Io(#[from] std::io::Error),
    /// The module file is not a usable object.
    #[error(transparent)]
    Elf(#[from] ElfError),
    /// The module's debug info is malformed.
    #[error(transparent)]
    Dwarf(#[from] DwarfError),
}

/// Everything derived from a module's mapped file data.
struct SessionInner<'d> {
    load_address: u64,
    symbols: SymbolMap<'d>,
    dwarf: SelfCell<Box<DwarfSections<'d>>, DwarfInfo<'d>>,
}

impl<'slf, 'd: 'slf> AsSelf<'slf> for SessionInner<'d> {
    type Ref = SessionInner<'slf>;

    fn as_self(&'slf self) -> &Self::Ref {
        // The contained caches use interior mutability, which makes the
        // lifetime invariant; they never store borrows below 'd.
        unsafe { std::mem::transmute(self) }
    }
}

/// An opened debug-info session for one module.
///
/// The session owns the memory mapping of the module file, the parsed debug
/// information and the symbol table, together with the address bias that
/// translates runtime addresses into the module's linked address space.
/// Sessions are shared behind an [`Arc`] and are thread-safe for queries.
pub struct ModuleSession {
    path: PathBuf,
    base: usize,
    bias: i64,
    inner: SelfCell<ByteView<'static>, SessionInner<'static>>,
}

impl ModuleSession {
    /// Opens the debug session for a module file loaded at `base`.
    pub fn open(path: &Path, base: usize) -> Result<Self, SessionError> {
        let view = ByteView::open(path)?;

        let inner = SelfCell::try_new::<SessionError, _>(view, |data| {
            let data = unsafe { &*data };
            let object = ElfObject::parse(data)?;
            let load_address = object.load_address();
            let symbols = object.symbol_map();

            let sections = Box::new(DwarfSections::from_dwarf(&object));
            let dwarf = SelfCell::try_new(sections, |sections| {
                DwarfInfo::parse(unsafe { &*sections })
            })?;

            Ok(SessionInner {
                load_address,
                symbols,
                dwarf,
            })
        })?;

        let bias = base as i64 - inner.get().load_address as i64;

        Ok(ModuleSession {
            path: path.to_owned(),
            base,
            bias,
            inner,
        })
    }

    /// The on-disk path of the module.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The runtime load address this session is biased for.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Produces the inline expansion of a runtime address, innermost first.
    pub(crate) fn frames_for_address(&self, addr: Address) -> Vec<RawFrame<'_>> {
        let relative = unbias(addr.native_handle() as u64, self.bias);
        self.inner.get().dwarf.get().frames_for_address(relative)
    }

    /// Looks up a runtime address in the module's symbol table.
    pub(crate) fn symbol_for_address(&self, addr: Address) -> Option<Name<'_>> {
        let relative = unbias(addr.native_handle() as u64, self.bias);
        let symbol = self.inner.get().symbols.lookup(relative)?;
        let name = symbol.name.clone()?;
        Some(Name::new(name, NameMangling::Mangled, Default::default()))
    }
}

impl fmt::Debug for ModuleSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSession")
            .field("path", &self.path)
            .field("base", &format_args!("{:#x}", self.base))
            .field("bias", &format_args!("{:#x}", self.bias))
            .finish()
    }
}

/// A thread-safe cache of debug sessions, keyed by module path.
///
/// At most one session is opened per module path. Reads proceed in parallel;
/// opening a missing session happens under the writer lock, which may block
/// other resolvers briefly. That is acceptable since the first resolve per
/// module dominates the cost anyway.
#[derive(Debug, Default)]
pub struct SessionCache {
    sessions: RwLock<HashMap<PathBuf, Arc<ModuleSession>>>,
}

impl SessionCache {
    /// Creates a new, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached session for `path`, opening it if necessary.
    ///
    /// On any failure during the open, nothing is inserted and `None` is
    /// returned, so a later call can attempt a fresh open.
    pub fn get_or_open(&self, path: &Path, base: usize) -> Option<Arc<ModuleSession>> {
        if let Some(session) = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Some(session.clone());
        }

        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Racing resolvers may have opened the session in the meantime.
        if let Some(session) = sessions.get(path) {
            return Some(session.clone());
        }

        let session = match ModuleSession::open(path, base) {
            Ok(session) => Arc::new(session),
            Err(error) => {
                log::debug!("failed to open debug session for {:?}: {}", path, error);
                return None;
            }
        };

        sessions.insert(path.to_owned(), session.clone());
        Some(session)
    }

    /// Runs `f` while holding the writer lock of this cache.
    ///
    /// Used to serialize module-list updates against concurrent resolvers.
    pub(crate) fn with_writer<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Drops all cached sessions.
    pub fn clear(&self) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_shared() {
        let cache = SessionCache::new();
        let path = std::env::current_exe().unwrap();

        let first = cache.get_or_open(&path, 0).unwrap();
        let second = cache.get_or_open(&path, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_open_failure_inserts_nothing() {
        let cache = SessionCache::new();
        let path = Path::new("/nonexistent/module.so");

        assert!(cache.get_or_open(path, 0).is_none());
        assert!(cache
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = SessionCache::new();
        let path = std::env::current_exe().unwrap();

        cache.get_or_open(&path, 0).unwrap();
        cache.clear();
        assert!(cache
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty());
    }
}
