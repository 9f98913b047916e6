//! The symbolizer: expanding physical addresses into logical frames.

use std::fs::File;
use std::sync::OnceLock;

use retrace_common::{Address, Name};
use retrace_demangle::{Demangle, DemangleOptions};

use crate::cache::SessionCache;
use crate::frame::{LogicalFrame, SourceLocation};
use crate::modmap::ModuleMap;

/// Tracks what has been handed to the sink during one resolve call.
///
/// Guarantees that exactly one bare frame is emitted when nothing better
/// could be produced, and that nothing is emitted after the sink reported
/// "done".
struct EmitState<S> {
    physical: Address,
    sink: S,
    issued: bool,
    done: bool,
}

impl<S> EmitState<S>
where
    S: FnMut(LogicalFrame) -> bool,
{
    fn submit(&mut self, frame: LogicalFrame) {
        if !self.done {
            self.done = (self.sink)(frame);
            self.issued = true;
        }
    }

    fn on_failure(&mut self) {
        if !self.issued {
            let bare = LogicalFrame::bare(self.physical);
            self.submit(bare);
        }
    }
}

/// Translates captured stack addresses into logical frames.
///
/// A symbolizer combines a module map (current or foreign process), a cache
/// of per-module debug sessions, and the demangler. It is thread-safe for
/// concurrent [`resolve`](Self::resolve) calls.
///
/// Construction never fails: a target whose modules cannot be interrogated
/// yields a degraded instance that produces bare frames.
///
/// # Examples
///
/// ```
/// use retrace_symbolize::Symbolizer;
///
/// let symbolizer = Symbolizer::new();
/// let frames = symbolizer.resolve(retrace_symbolize::Address::NULL);
/// assert_eq!(frames.len(), 1);
/// assert!(frames[0].symbol.is_empty());
/// ```
#[derive(Debug)]
pub struct Symbolizer {
    modmap: ModuleMap,
    cache: SessionCache,
}

impl Symbolizer {
    /// Creates a symbolizer for the current process.
    pub fn new() -> Self {
        Symbolizer {
            modmap: ModuleMap::local(),
            cache: SessionCache::new(),
        }
    }

    /// Creates a symbolizer for the foreign process with the given id.
    pub fn for_process(pid: u32) -> Self {
        Symbolizer {
            modmap: ModuleMap::for_process(pid),
            cache: SessionCache::new(),
        }
    }

    /// Creates a symbolizer from a readable snapshot of a foreign process's
    /// address-space mapping, such as a descriptor received over a
    /// crash-handler pipe.
    pub fn from_maps_file(file: File) -> Self {
        Symbolizer {
            modmap: ModuleMap::from_maps_file(file),
            cache: SessionCache::new(),
        }
    }

    /// Resolves an address, reporting each logical frame to `sink`.
    ///
    /// Frames are emitted innermost-first: the instruction's immediate
    /// enclosing body comes first, then each successively outer inlined call
    /// site, ending with the containing physical function. The sink returns
    /// `true` to signal "I have enough, stop".
    ///
    /// An address that cannot be resolved produces exactly one bare frame
    /// carrying only the input address; this is not an error.
    pub fn resolve_with<S>(&self, entry: Address, sink: S)
    where
        S: FnMut(LogicalFrame) -> bool,
    {
        let mut state = EmitState {
            physical: entry,
            sink,
            issued: false,
            done: false,
        };
        self.resolve_impl(&mut state);
    }

    /// Resolves an address into a vector of logical frames.
    ///
    /// The result is never empty: unresolvable addresses yield a single bare
    /// frame.
    pub fn resolve(&self, entry: Address) -> Vec<LogicalFrame> {
        let mut frames = Vec::new();
        self.resolve_with(entry, |frame| {
            frames.push(frame);
            false
        });
        frames
    }

    /// Resolves an address into `buffer`, returning the filled prefix.
    ///
    /// An empty buffer resolves nothing.
    pub fn resolve_into<'b>(
        &self,
        entry: Address,
        buffer: &'b mut [LogicalFrame],
    ) -> &'b mut [LogicalFrame] {
        let mut filled = 0;
        if !buffer.is_empty() {
            self.resolve_with(entry, |frame| {
                buffer[filled] = frame;
                filled += 1;
                filled == buffer.len()
            });
        }
        &mut buffer[..filled]
    }

    fn resolve_impl<S>(&self, state: &mut EmitState<S>)
    where
        S: FnMut(LogicalFrame) -> bool,
    {
        let entry = state.physical;

        let record = self.modmap.lookup(entry).or_else(|| {
            // The foreign process may have loaded the module after the last
            // enumeration. Refresh once, serialized against other resolvers.
            if self.cache.with_writer(|| self.modmap.rescan()) {
                self.modmap.lookup(entry)
            } else {
                None
            }
        });

        let record = match record {
            Some(record) => record,
            None => return state.on_failure(),
        };

        let session = match self.cache.get_or_open(&record.path, record.base) {
            Some(session) => session,
            None => return state.on_failure(),
        };

        for frame in session.frames_for_address(entry) {
            let symbol = frame.name.map(format_symbol).unwrap_or_default();
            state.submit(LogicalFrame {
                physical: entry,
                inlined: frame.inlined,
                symbol,
                source: SourceLocation {
                    file: frame.file.unwrap_or_default(),
                    line: frame.line,
                    column: frame.column,
                },
            });
            if state.done {
                return;
            }
        }

        if state.issued {
            return;
        }

        // No function DIE covers the address; fall back to the symbol table
        // for a name-only frame.
        if let Some(name) = session.symbol_for_address(entry) {
            state.submit(LogicalFrame {
                physical: entry,
                inlined: false,
                symbol: format_symbol(name),
                source: SourceLocation::default(),
            });
            return;
        }

        state.on_failure();
    }
}

impl Default for Symbolizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Demangles a resolved name into its human-readable form.
///
/// Names that cannot be demangled are passed through verbatim.
fn format_symbol(name: Name<'_>) -> String {
    name.try_demangle(DemangleOptions::complete()).into_owned()
}

/// Returns the process-wide default symbolizer, built on first use.
///
/// The instance lives until process exit; its sessions are never torn down.
fn default_symbolizer() -> &'static Symbolizer {
    static DEFAULT: OnceLock<Symbolizer> = OnceLock::new();
    DEFAULT.get_or_init(Symbolizer::new)
}

/// Resolves an address through the process-wide default symbolizer.
///
/// See [`Symbolizer::resolve`] for the contract.
pub fn resolve(entry: Address) -> Vec<LogicalFrame> {
    default_symbolizer().resolve(entry)
}

/// Resolves an address through the process-wide default symbolizer,
/// reporting each logical frame to `sink`.
///
/// See [`Symbolizer::resolve_with`] for the contract.
pub fn resolve_with<S>(entry: Address, sink: S)
where
    S: FnMut(LogicalFrame) -> bool,
{
    default_symbolizer().resolve_with(entry, sink)
}

/// Resolves an address through the process-wide default symbolizer into
/// `buffer`, returning the filled prefix.
///
/// See [`Symbolizer::resolve_into`] for the contract.
pub fn resolve_into(entry: Address, buffer: &mut [LogicalFrame]) -> &mut [LogicalFrame] {
    default_symbolizer().resolve_into(entry, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_null_address_is_bare() {
        let symbolizer = Symbolizer::new();
        let frames = symbolizer.resolve(Address::NULL);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].physical, Address::NULL);
        assert!(!frames[0].inlined);
        assert!(frames[0].symbol.is_empty());
        assert!(frames[0].source.file.is_empty());
        assert_eq!(frames[0].source.line, 0);
    }

    #[test]
    fn test_resolve_into_empty_buffer() {
        let symbolizer = Symbolizer::new();
        let mut buffer = [];
        let filled = symbolizer.resolve_into(Address::NULL, &mut buffer);
        assert!(filled.is_empty());
    }

    #[test]
    fn test_resolve_sink_done_stops() {
        let symbolizer = Symbolizer::new();
        let mut count = 0;
        symbolizer.resolve_with(Address::from_native_handle(test_resolve_sink_done_stops as usize), |_| {
            count += 1;
            true
        });
        assert_eq!(count, 1);
    }
}
