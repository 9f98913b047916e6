//! Module lookup in the current process via `dl_iterate_phdr`.

use std::ffi::{CStr, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::slice;

use retrace_common::Address;

use super::ModuleRecord;

/// A module map querying the loader of the current process.
///
/// Lookups are cheap and non-blocking; nothing is cached between calls.
#[derive(Debug)]
pub struct LocalModuleMap;

struct CallbackState {
    addr: usize,
    index: usize,
    found: Option<ModuleRecord>,
}

impl LocalModuleMap {
    /// Returns the module containing the given address, if any.
    pub fn lookup(&self, addr: Address) -> Option<ModuleRecord> {
        let mut state = CallbackState {
            addr: addr.native_handle(),
            index: 0,
            found: None,
        };

        unsafe {
            libc::dl_iterate_phdr(Some(callback), &mut state as *mut _ as *mut libc::c_void);
        }

        state.found
    }
}

unsafe extern "C" fn callback(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    data: *mut libc::c_void,
) -> libc::c_int {
    let state = &mut *(data as *mut CallbackState);
    let info = &*info;

    let is_main_executable = state.index == 0;
    state.index += 1;

    let headers = slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize);
    let mut min_vaddr = usize::MAX;
    let mut max_vaddr = 0usize;
    for header in headers {
        if header.p_type == libc::PT_LOAD {
            min_vaddr = min_vaddr.min(header.p_vaddr as usize);
            max_vaddr = max_vaddr.max((header.p_vaddr + header.p_memsz) as usize);
        }
    }

    if min_vaddr > max_vaddr {
        return 0;
    }

    let base = (info.dlpi_addr as usize).wrapping_add(min_vaddr);
    let size = max_vaddr - min_vaddr;
    if state.addr < base || state.addr - base >= size {
        return 0;
    }

    // The main executable reports an empty name; resolve it through the
    // filesystem instead.
    let path = if info.dlpi_name.is_null() || *info.dlpi_name == 0 {
        if !is_main_executable {
            return 0;
        }
        match std::env::current_exe() {
            Ok(path) => path,
            Err(_) => return 0,
        }
    } else {
        let bytes = CStr::from_ptr(info.dlpi_name).to_bytes();
        PathBuf::from(OsStr::from_bytes(bytes))
    };

    state.found = Some(ModuleRecord { base, size, path });
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn probe() {}

    #[test]
    fn test_lookup_own_function() {
        let map = LocalModuleMap;
        let addr = Address::from_native_handle(probe as usize);

        let record = map.lookup(addr).expect("own function must be mapped");
        assert!(record.contains(addr));
        assert_eq!(record.path, std::env::current_exe().unwrap());
    }

    #[test]
    fn test_lookup_is_monotone() {
        let map = LocalModuleMap;
        let first = map
            .lookup(Address::from_native_handle(probe as usize))
            .unwrap();
        let second = map
            .lookup(Address::from_native_handle(test_lookup_is_monotone as usize))
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_lookup_unmapped() {
        let map = LocalModuleMap;
        assert_eq!(map.lookup(Address::from_native_handle(1)), None);
    }
}
