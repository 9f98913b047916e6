//! Module maps: finding the code module that owns an address.
//!
//! A module map answers one question: given an address, which loaded
//! executable or shared object contains it, where is it loaded, and what is
//! its on-disk path. Two variants exist: the [local](LocalModuleMap) map asks
//! the loader of the current process, the [remote](RemoteModuleMap) map
//! interrogates the address-space mapping of a foreign process.

mod local;
mod remote;

use std::fs::File;
use std::path::PathBuf;

use retrace_common::Address;

pub use self::local::LocalModuleMap;
pub use self::remote::RemoteModuleMap;

/// A loaded code module within a process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleRecord {
    /// Load address of the module in the target process.
    pub base: usize,
    /// Bytes occupied by the module's loadable segments.
    pub size: usize,
    /// Absolute filesystem path of the executable or shared object.
    pub path: PathBuf,
}

impl ModuleRecord {
    /// Determines whether the given address lies within this module.
    pub fn contains(&self, addr: Address) -> bool {
        let addr = addr.native_handle();
        addr >= self.base && addr - self.base < self.size
    }
}

/// A module map for either the current or a foreign process.
///
/// The set of variants is closed; dispatch is a match on the variant.
#[derive(Debug)]
pub enum ModuleMap {
    /// Queries the loader of the current process.
    Local(LocalModuleMap),
    /// Queries a snapshot of a foreign process's address-space mapping.
    Remote(RemoteModuleMap),
}

impl ModuleMap {
    /// Creates a module map for the current process.
    pub fn local() -> Self {
        ModuleMap::Local(LocalModuleMap)
    }

    /// Creates a module map for the foreign process with the given id.
    pub fn for_process(pid: u32) -> Self {
        ModuleMap::Remote(RemoteModuleMap::for_process(pid))
    }

    /// Creates a module map from a readable snapshot of a foreign process's
    /// address-space mapping, such as a `/proc/<pid>/maps` handle received
    /// over a crash-handler pipe.
    pub fn from_maps_file(file: File) -> Self {
        ModuleMap::Remote(RemoteModuleMap::from_maps_file(file))
    }

    /// Returns the module containing the given address, if any.
    ///
    /// Every failure is reported as `None`; the caller decides whether that
    /// is fatal.
    pub fn lookup(&self, addr: Address) -> Option<ModuleRecord> {
        match self {
            ModuleMap::Local(map) => map.lookup(addr),
            ModuleMap::Remote(map) => map.lookup(addr),
        }
    }

    /// Refreshes the module list from the underlying source.
    ///
    /// Returns `true` if a fresh enumeration was taken. The local variant has
    /// nothing to refresh since it queries the loader on every lookup.
    pub(crate) fn rescan(&self) -> bool {
        match self {
            ModuleMap::Local(_) => false,
            ModuleMap::Remote(map) => map.rescan(),
        }
    }
}
