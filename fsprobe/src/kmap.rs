//! Thin map abstractions so the dentry-resolution algorithms (C4) can be
//! exercised against an in-memory double in tests, while the binary wires
//! them to the real kernel-backed `aya` maps at runtime.

use aya::maps::{HashMap as AyaHashMap, Map, MapData};
use fsprobe_common::{PathFragmentsKey, PathFragmentsValue, SINGLE_FRAGMENT_LEN};
use std::collections::{HashMap as StdHashMap, HashSet};

use crate::error::FsProbeError;

/// Backing store for the Fragments strategy's dentry chain
/// (`PATH_FRAGMENTS`, §6).
pub trait FragmentsMap {
    fn get(&self, key: PathFragmentsKey) -> Option<PathFragmentsValue>;
    fn remove(&mut self, key: PathFragmentsKey);
}

pub struct LiveFragmentsMap(AyaHashMap<MapData, PathFragmentsKey, PathFragmentsValue>);

impl LiveFragmentsMap {
    pub fn new(map: Map) -> Result<Self, FsProbeError> {
        let inner = AyaHashMap::try_from(map)
            .map_err(|e| FsProbeError::Config(format!("PATH_FRAGMENTS map: {e}")))?;
        Ok(Self(inner))
    }
}

impl FragmentsMap for LiveFragmentsMap {
    fn get(&self, key: PathFragmentsKey) -> Option<PathFragmentsValue> {
        self.0.get(&key, 0).ok()
    }

    fn remove(&mut self, key: PathFragmentsKey) {
        if let Err(e) = self.0.remove(&key) {
            log::warn!("failed to remove PATH_FRAGMENTS entry {key:?}: {e}");
        }
    }
}

/// In-memory double for unit tests; keyed directly by `PathFragmentsKey`
/// since it already derives `Hash`/`Eq`.
#[derive(Default)]
pub struct TestFragmentsMap(pub StdHashMap<PathFragmentsKey, PathFragmentsValue>);

impl FragmentsMap for TestFragmentsMap {
    fn get(&self, key: PathFragmentsKey) -> Option<PathFragmentsValue> {
        self.0.get(&key).copied()
    }

    fn remove(&mut self, key: PathFragmentsKey) {
        self.0.remove(&key);
    }
}

/// Backing store for the SingleFragment strategy's whole-path buffer
/// (`SINGLE_FRAGMENT`, §6).
pub trait SingleFragmentMap {
    fn get(&self, key: u32) -> Option<[u8; SINGLE_FRAGMENT_LEN]>;
    fn remove(&mut self, key: u32);
}

pub struct LiveSingleFragmentMap(AyaHashMap<MapData, u32, [u8; SINGLE_FRAGMENT_LEN]>);

impl LiveSingleFragmentMap {
    pub fn new(map: Map) -> Result<Self, FsProbeError> {
        let inner = AyaHashMap::try_from(map)
            .map_err(|e| FsProbeError::Config(format!("SINGLE_FRAGMENT map: {e}")))?;
        Ok(Self(inner))
    }
}

impl SingleFragmentMap for LiveSingleFragmentMap {
    fn get(&self, key: u32) -> Option<[u8; SINGLE_FRAGMENT_LEN]> {
        self.0.get(&key, 0).ok()
    }

    fn remove(&mut self, key: u32) {
        if let Err(e) = self.0.remove(&key) {
            log::warn!("failed to remove SINGLE_FRAGMENT entry {key}: {e}");
        }
    }
}

#[derive(Default)]
pub struct TestSingleFragmentMap(pub StdHashMap<u32, [u8; SINGLE_FRAGMENT_LEN]>);

impl SingleFragmentMap for TestSingleFragmentMap {
    fn get(&self, key: u32) -> Option<[u8; SINGLE_FRAGMENT_LEN]> {
        self.0.get(&key).copied()
    }

    fn remove(&mut self, key: u32) {
        self.0.remove(&key);
    }
}

/// Backing store for the kernel-visible "cached inodes" set (`CACHED_INODES`,
/// §6), shared by the PerfBuffer strategy's LRU and the SingleFragment
/// strategy's `add_cache_entry`.
pub trait InodeSet {
    fn add(&mut self, inode: u32);
    fn remove(&mut self, inode: u32);
    #[cfg(test)]
    fn contains(&self, inode: u32) -> bool;
}

pub struct LiveInodeSet(AyaHashMap<MapData, u32, u8>);

impl LiveInodeSet {
    pub fn new(map: Map) -> Result<Self, FsProbeError> {
        let inner = AyaHashMap::try_from(map)
            .map_err(|e| FsProbeError::Config(format!("CACHED_INODES map: {e}")))?;
        Ok(Self(inner))
    }
}

impl InodeSet for LiveInodeSet {
    fn add(&mut self, inode: u32) {
        if let Err(e) = self.0.insert(inode, 0u8, 0) {
            log::warn!("failed to add {inode} to CACHED_INODES: {e}");
        }
    }

    fn remove(&mut self, inode: u32) {
        if let Err(e) = self.0.remove(&inode) {
            log::warn!("failed to remove {inode} from CACHED_INODES: {e}");
        }
    }

    #[cfg(test)]
    fn contains(&self, inode: u32) -> bool {
        self.0.get(&inode, 0).is_ok()
    }
}

#[derive(Default)]
pub struct TestInodeSet(pub HashSet<u32>);

impl InodeSet for TestInodeSet {
    fn add(&mut self, inode: u32) {
        self.0.insert(inode);
    }

    fn remove(&mut self, inode: u32) {
        self.0.remove(&inode);
    }

    #[cfg(test)]
    fn contains(&self, inode: u32) -> bool {
        self.0.contains(&inode)
    }
}
