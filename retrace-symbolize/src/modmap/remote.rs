//! Module lookup in a foreign process via its address-space mapping.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use retrace_common::Address;

use super::ModuleRecord;

// Enumerating the mapping of another process is unreliable while that
// process is loading or unloading modules: reads can fail or observe a
// half-updated mapping. Failed enumerations are retried with a growing
// back-off before giving up.

const LOOKUP_RETRY_COUNT: u32 = 10;

fn wait_before_retry(retry_idx: u32) {
    const WAIT_STEP: Duration = Duration::from_millis(10);
    const MAX_WAIT: Duration = Duration::from_millis(100);

    match retry_idx {
        0 => thread::yield_now(),
        1 => thread::sleep(Duration::from_millis(1)),
        2 => thread::sleep(WAIT_STEP),
        _ => thread::sleep((WAIT_STEP * (retry_idx - 2)).min(MAX_WAIT)),
    }
}

/// Where the mapping of the foreign process is read from.
enum MapsSource {
    /// The process id; `/proc/<pid>/maps` is opened on every enumeration.
    Process(u32),
    /// An already-open mapping handle, rewound and re-read on enumeration.
    Snapshot(Mutex<File>),
}

impl MapsSource {
    fn read(&self) -> std::io::Result<String> {
        match self {
            MapsSource::Process(pid) => std::fs::read_to_string(format!("/proc/{}/maps", pid)),
            MapsSource::Snapshot(file) => {
                let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
                file.seek(SeekFrom::Start(0))?;
                let mut content = String::new();
                file.read_to_string(&mut content)?;
                Ok(content)
            }
        }
    }
}

impl fmt::Debug for MapsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapsSource::Process(pid) => f.debug_tuple("Process").field(pid).finish(),
            MapsSource::Snapshot(_) => f.debug_tuple("Snapshot").finish(),
        }
    }
}

/// A module map over the address-space mapping of a foreign process.
///
/// The mapping is enumerated once at construction and served from a
/// snapshot; [`rescan`](Self::rescan) refreshes the snapshot, e.g. after a
/// lookup miss caused by a module loaded since.
#[derive(Debug)]
pub struct RemoteModuleMap {
    source: MapsSource,
    modules: RwLock<Vec<ModuleRecord>>,
}

impl RemoteModuleMap {
    /// Creates a map for the foreign process with the given id.
    ///
    /// An unreadable process yields a degraded map whose lookups fail until a
    /// rescan succeeds.
    pub fn for_process(pid: u32) -> Self {
        let map = RemoteModuleMap {
            source: MapsSource::Process(pid),
            modules: RwLock::new(Vec::new()),
        };
        map.rescan();
        map
    }

    /// Creates a map from a readable handle to a foreign process's mapping.
    pub fn from_maps_file(file: File) -> Self {
        let map = RemoteModuleMap {
            source: MapsSource::Snapshot(Mutex::new(file)),
            modules: RwLock::new(Vec::new()),
        };
        map.rescan();
        map
    }

    /// Returns the module containing the given address, if any.
    pub fn lookup(&self, addr: Address) -> Option<ModuleRecord> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|module| module.contains(addr))
            .cloned()
    }

    /// Re-enumerates the foreign mapping, retrying transient failures.
    ///
    /// Returns `true` if a fresh snapshot was taken.
    pub fn rescan(&self) -> bool {
        for retry_idx in 0..LOOKUP_RETRY_COUNT {
            match self.source.read() {
                Ok(content) => {
                    let modules = parse_maps(&content);
                    // An empty module list should never happen for a live
                    // process and is treated as a racy read.
                    if !modules.is_empty() {
                        *self.modules.write().unwrap_or_else(PoisonError::into_inner) = modules;
                        return true;
                    }
                }
                Err(error) => {
                    log::debug!("reading foreign mapping failed: {}", error);
                }
            }
            wait_before_retry(retry_idx);
        }

        log::debug!("giving up on foreign mapping after {} attempts", LOOKUP_RETRY_COUNT);
        false
    }
}

/// Parses the contents of a `/proc/<pid>/maps` file into module records.
///
/// All file-backed mappings of the same path are merged into one record
/// spanning from the lowest to the highest mapped address, mirroring how the
/// loader places a module's segments.
fn parse_maps(content: &str) -> Vec<ModuleRecord> {
    let mut modules: Vec<ModuleRecord> = Vec::new();

    for line in content.lines() {
        // Everything from the first slash on is the pathname; mappings
        // without one ([heap], [vdso], anonymous) are not modules.
        let path_start = match line.find('/') {
            Some(start) => start,
            None => continue,
        };
        let path = line[path_start..].trim_end();
        let path = path.strip_suffix(" (deleted)").unwrap_or(path);

        let mut parts = line.split_whitespace();
        let range = match parts.next() {
            Some(range) => range,
            None => continue,
        };
        let (start, end) = match range.split_once('-') {
            Some(bounds) => bounds,
            None => continue,
        };
        let (start, end) = match (
            usize::from_str_radix(start, 16),
            usize::from_str_radix(end, 16),
        ) {
            (Ok(start), Ok(end)) if start < end => (start, end),
            _ => continue,
        };

        match modules
            .iter_mut()
            .find(|module| module.path.as_os_str() == path)
        {
            Some(module) => {
                let merged_end = (module.base + module.size).max(end);
                module.base = module.base.min(start);
                module.size = merged_end - module.base;
            }
            None => modules.push(ModuleRecord {
                base: start,
                size: end - start,
                path: PathBuf::from(path),
            }),
        }
    }

    modules
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d88f012000-55d88f016000 r--p 00000000 08:01 1834790 /usr/bin/app
55d88f016000-55d88f020000 r-xp 00004000 08:01 1834790 /usr/bin/app
55d88f020000-55d88f024000 rw-p 0000e000 08:01 1834790 /usr/bin/app
7f1c5e200000-7f1c5e222000 r--p 00000000 08:01 264241  /usr/lib/libc.so.6
7f1c5e222000-7f1c5e39e000 r-xp 00022000 08:01 264241  /usr/lib/libc.so.6
7ffd1c9c0000-7ffd1c9e1000 rw-p 00000000 00:00 0       [stack]
7ffd1c9f3000-7ffd1c9f5000 r-xp 00000000 00:00 0       [vdso]
";

    #[test]
    fn test_parse_maps_groups_by_path() {
        let modules = parse_maps(MAPS);
        assert_eq!(modules.len(), 2);

        assert_eq!(modules[0].path, PathBuf::from("/usr/bin/app"));
        assert_eq!(modules[0].base, 0x55d8_8f01_2000);
        assert_eq!(modules[0].size, 0x12000);

        assert_eq!(modules[1].path, PathBuf::from("/usr/lib/libc.so.6"));
        assert_eq!(modules[1].base, 0x7f1c_5e20_0000);
        assert_eq!(modules[1].size, 0x19e000);
    }

    #[test]
    fn test_parse_maps_skips_special_mappings() {
        let modules = parse_maps(MAPS);
        assert!(modules.iter().all(|m| m.path.is_absolute()));
    }

    #[test]
    fn test_parse_maps_strips_deleted_suffix() {
        let modules = parse_maps("55d88f012000-55d88f016000 r-xp 00000000 08:01 1 /tmp/gone (deleted)\n");
        assert_eq!(modules[0].path, PathBuf::from("/tmp/gone"));
    }

    #[test]
    fn test_lookup_in_snapshot() {
        let map = RemoteModuleMap {
            source: MapsSource::Process(0),
            modules: RwLock::new(parse_maps(MAPS)),
        };

        let record = map
            .lookup(Address::from_native_handle(0x55d8_8f01_7000))
            .unwrap();
        assert_eq!(record.path, PathBuf::from("/usr/bin/app"));

        assert!(map.lookup(Address::from_native_handle(0x1000)).is_none());
    }

    #[test]
    fn test_lookup_self_through_maps_file() {
        let file = File::open("/proc/self/maps").unwrap();
        let map = RemoteModuleMap::from_maps_file(file);

        let addr = Address::from_native_handle(test_lookup_self_through_maps_file as usize);
        let record = map.lookup(addr).expect("own code must be mapped");
        assert!(record.contains(addr));
    }
}
