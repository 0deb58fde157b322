//! C3 — the watch set: a 32-bit inode key pushed into a kernel-visible map
//! so probes can skip emitting events for inodes nobody is watching.
//! Write-mostly from user space; `contains` is deliberately not exposed
//! (§4.3 — kernel is the only required reader).

use aya::maps::{HashMap as AyaHashMap, Map, MapData};
use log::warn;

use crate::error::FsProbeError;

pub struct InodeFilterMap {
    map: AyaHashMap<MapData, u32, u8>,
}

impl InodeFilterMap {
    pub fn new(map: Map) -> Result<Self, FsProbeError> {
        let map = AyaHashMap::try_from(map)
            .map_err(|e| FsProbeError::Config(format!("INODE_FILTER map: {e}")))?;
        Ok(Self { map })
    }

    /// Pushes `inode` into the watch set. `path` is accepted only for the
    /// caller's logging context (§4.3's `add(inode, path)` signature); the
    /// kernel-side value is a single unused byte.
    pub fn add(&mut self, inode: u32, path: &str) {
        if let Err(e) = self.map.insert(inode, 0u8, 0) {
            warn!("failed to add inode {inode} ({path}) to watch set: {e}");
        }
    }

    /// Removes `inode` from the watch set. A missing key is not an error.
    pub fn remove(&mut self, inode: u32) {
        if let Err(e) = self.map.remove(&inode) {
            warn!("failed to remove inode {inode} from watch set: {e}");
        }
    }
}
