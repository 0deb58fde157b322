//! C4 — the dentry resolver. Three interchangeable strategies behind one
//! tagged enum (§9: "realise as a tagged variant whose arms hold
//! strategy-specific fields, not as a virtual dispatch through a base
//! type"). Each strategy struct is generic over its map backend so the
//! resolution algorithms are unit-testable against an in-memory double
//! (`kmap::Test*`); the binary wires the `Resolver` enum to the live
//! `aya`-backed maps (`kmap::Live*`).

use std::num::NonZeroUsize;

use fsprobe_common::{PathFragmentsKey, PathFragmentsValue, ROOT_INODE, RESOLVED_CACHE_CAPACITY};
use lru::LruCache;

use crate::codec::{EventKind, RawEvent};
use crate::error::FsProbeError;
use crate::kmap::{
    FragmentsMap, InodeSet, LiveFragmentsMap, LiveInodeSet, LiveSingleFragmentMap,
    SingleFragmentMap,
};
use crate::path::decode_path;

/// Result of resolving one event's path(s) (§4.8's pre-invalidation step).
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub src: String,
    pub target: Option<String>,
    pub error: Option<FsProbeError>,
}

fn cstring_from_fixed(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// §4.4.1 — pathnames stored as a linked dentry chain keyed by (mount_id,
/// inode).
pub struct FragmentsResolver<M: FragmentsMap> {
    map: M,
}

impl<M: FragmentsMap> FragmentsResolver<M> {
    pub fn new(map: M) -> Self {
        Self { map }
    }

    /// Walks the chain; any missing link short-circuits with a single
    /// `*ERROR*` prefix on what has been collected so far, never raises.
    pub fn resolve_inode(&self, mount_id: u32, inode: u64) -> String {
        let mut key = PathFragmentsKey::new(mount_id, inode);
        let mut out = String::new();
        loop {
            match self.map.get(key) {
                None => {
                    out = format!("*ERROR*{out}");
                    break;
                }
                Some(value) => {
                    let fragment = cstring_from_fixed(&value.fragment);
                    if fragment != "/" {
                        out = format!("/{fragment}{out}");
                    }
                    if value.parent.is_empty_inode() {
                        break;
                    }
                    key = value.parent;
                }
            }
        }
        if out.is_empty() {
            "/".to_string()
        } else {
            out
        }
    }

    pub fn remove_inode(&mut self, mount_id: u32, inode: u64) {
        self.map.remove(PathFragmentsKey::new(mount_id, inode));
    }
}

/// §4.4.2 — one hash map keyed by an opaque 32-bit hash storing a complete
/// path as a single null-separated buffer.
pub struct SingleFragmentResolver<M: SingleFragmentMap> {
    map: M,
}

impl<M: SingleFragmentMap> SingleFragmentResolver<M> {
    pub fn new(map: M) -> Self {
        Self { map }
    }

    pub fn resolve_key(&self, key: u32, length: u32) -> Result<String, FsProbeError> {
        if key == 0 {
            return Err(FsProbeError::Resolution(format!(
                "invalid SingleFragment key {key}"
            )));
        }
        let buf = self.map.get(key).ok_or_else(|| {
            FsProbeError::Resolution(format!("missing SINGLE_FRAGMENT entry for key {key}"))
        })?;
        let len = if length == 0 {
            buf.len()
        } else {
            (length as usize).min(buf.len())
        };
        let decoded = decode_path(&buf[..len]);
        Ok(if decoded.is_empty() {
            "/".to_string()
        } else {
            decoded
        })
    }

    pub fn remove_entry(&mut self, key: u32) {
        self.map.remove(key);
    }
}

/// §4.4.3 — the kernel streams path fragments inline; only a prefix cache
/// key crosses the wire when the prefix is already resolved. Resolution
/// reads/writes the user-space LRU, whose eviction hook is the only place
/// that deletes kernel `CACHED_INODES` entries (§9).
pub struct PerfBufferResolver<S: InodeSet> {
    lru: LruCache<u32, String>,
    cached_inodes: S,
}

impl<S: InodeSet> PerfBufferResolver<S> {
    pub fn new(cached_inodes: S) -> Self {
        Self::with_capacity(cached_inodes, RESOLVED_CACHE_CAPACITY)
    }

    pub fn with_capacity(cached_inodes: S, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).expect("resolved-inode cache capacity must be > 0");
        Self {
            lru: LruCache::new(cap),
            cached_inodes,
        }
    }

    /// Inserts `key -> value` into the LRU, writing the key into the kernel
    /// set. If capacity eviction displaces a different key, that key is
    /// also deleted from the kernel set (the LRU's eviction hook).
    pub fn add_cache_entry(&mut self, key: u32, value: &str) {
        let evicted = self.lru.push(key, value.to_string());
        self.cached_inodes.add(key);
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                self.cached_inodes.remove(evicted_key);
            }
        }
    }

    /// Explicit deletion on both sides at once (Unlink invalidation, §4.8).
    pub fn remove_entry(&mut self, key: u32) {
        self.lru.pop(&key);
        self.cached_inodes.remove(key);
    }

    fn resolve_one(&mut self, key: u32, length: u32, leaf_bytes: &[u8]) -> (String, Option<FsProbeError>) {
        let leaf = if length > 0 {
            decode_path(leaf_bytes)
        } else {
            String::new()
        };

        if key == 0 {
            return (leaf, None);
        }

        let prefix = if key as u64 == ROOT_INODE {
            Some("/".to_string())
        } else {
            self.lru.get(&key).cloned()
        };

        match prefix {
            Some(p) if leaf.is_empty() => (p, None),
            Some(p) if p == "/" => (leaf, None),
            Some(p) => (format!("{p}{leaf}"), None),
            None => (
                leaf,
                Some(FsProbeError::Resolution(format!(
                    "missing resolved-inode cache entry for prefix key {key}"
                ))),
            ),
        }
    }

    /// Resolves both src and (for Link/Rename) target paths, performing the
    /// LRU insertion side effect described in §4.4.3 along the way.
    pub fn resolve_paths(&mut self, evt: &RawEvent, trailing: &[u8]) -> ResolvedPaths {
        let src_len = evt.src_pathname_length as usize;
        let target_len = evt.target_pathname_length as usize;
        let src_bytes = trailing.get(0..src_len).unwrap_or(&[]);
        let target_bytes = trailing.get(src_len..src_len + target_len).unwrap_or(&[]);

        let (src, src_err) = self.resolve_one(evt.src_pathname_key, evt.src_pathname_length, src_bytes);
        if evt.src_pathname_length > 0 && !matches!(evt.event_type, EventKind::Link) {
            self.add_cache_entry(evt.src_inode as u32, &src);
        }

        let mut target = None;
        let mut target_err = None;
        if matches!(evt.event_type, EventKind::Link | EventKind::Rename) {
            let (t, err) =
                self.resolve_one(evt.target_pathname_key, evt.target_pathname_length, target_bytes);
            if evt.target_pathname_length > 0 && !matches!(evt.event_type, EventKind::Link) {
                self.add_cache_entry(evt.target_inode as u32, &t);
            }
            target = Some(t);
            target_err = err;
        }

        ResolvedPaths {
            src,
            target,
            error: src_err.or(target_err),
        }
    }
}

/// The construction-time strategy tag (§4.4). Dispatch through inherent
/// methods, not a trait object: each strategy's no-op arms (e.g. Link under
/// PerfBuffer) return silently rather than erroring.
pub enum Resolver {
    Fragments(FragmentsResolver<LiveFragmentsMap>),
    SingleFragment(SingleFragmentResolver<LiveSingleFragmentMap>),
    PerfBuffer(PerfBufferResolver<LiveInodeSet>),
}

impl Resolver {
    pub fn resolve_paths(&mut self, raw: &RawEvent, trailing: &[u8]) -> ResolvedPaths {
        match self {
            Resolver::Fragments(r) => {
                let src = r.resolve_inode(raw.src_mount_id, raw.src_inode);
                let target = match raw.event_type {
                    EventKind::Link | EventKind::Rename => {
                        Some(r.resolve_inode(raw.target_mount_id, raw.target_inode))
                    }
                    _ => None,
                };
                ResolvedPaths {
                    src,
                    target,
                    error: None,
                }
            }
            Resolver::SingleFragment(r) => {
                let (src, src_err) =
                    match r.resolve_key(raw.src_pathname_key, raw.src_pathname_length) {
                        Ok(p) => (p, None),
                        Err(e) => (String::new(), Some(e)),
                    };
                let mut target = None;
                let mut target_err = None;
                if matches!(raw.event_type, EventKind::Link | EventKind::Rename) {
                    match r.resolve_key(raw.target_pathname_key, raw.target_pathname_length) {
                        Ok(p) => target = Some(p),
                        Err(e) => target_err = Some(e),
                    }
                }
                ResolvedPaths {
                    src,
                    target,
                    error: src_err.or(target_err),
                }
            }
            Resolver::PerfBuffer(r) => r.resolve_paths(raw, trailing),
        }
    }

    /// Fragments-only (no-op elsewhere): deletes one dentry-chain entry.
    pub fn remove_inode(&mut self, mount_id: u32, inode: u64) {
        if let Resolver::Fragments(r) = self {
            r.remove_inode(mount_id, inode);
        }
    }

    /// SingleFragment and PerfBuffer (no-op for Fragments): deletes one
    /// cache row, keyed the way each strategy names its rows (the caller
    /// picks the right id per §4.8's invalidation table).
    pub fn remove_entry(&mut self, key: u32) {
        match self {
            Resolver::SingleFragment(r) => r.remove_entry(key),
            Resolver::PerfBuffer(r) => r.remove_entry(key),
            Resolver::Fragments(_) => {}
        }
    }

    /// PerfBuffer-only (no-op elsewhere): seeds the resolved-inode LRU, used
    /// by the watch-set seeder (C7) when it primes the initial watch set.
    pub fn add_cache_entry(&mut self, key: u32, value: &str) {
        if let Resolver::PerfBuffer(r) = self {
            r.add_cache_entry(key, value);
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Resolver::Fragments(_) => "fragments",
            Resolver::SingleFragment(_) => "single_fragment",
            Resolver::PerfBuffer(_) => "perf_buffer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmap::{TestFragmentsMap, TestInodeSet, TestSingleFragmentMap};

    fn fragment_value(parent: PathFragmentsKey, fragment: &str) -> PathFragmentsValue {
        let mut buf = [0u8; fsprobe_common::PATH_FRAGMENT_LEN];
        buf[..fragment.len()].copy_from_slice(fragment.as_bytes());
        PathFragmentsValue {
            parent,
            fragment: buf,
        }
    }

    // Scenario 2: decoded fragment chain.
    #[test]
    fn fragments_resolves_a_full_chain() {
        let mut map = TestFragmentsMap::default();
        let root_key = PathFragmentsKey::new(1, 2);
        let a_key = PathFragmentsKey::new(1, 5);
        let b_key = PathFragmentsKey::new(1, 9);
        map.0.insert(b_key, fragment_value(a_key, "b"));
        map.0.insert(a_key, fragment_value(root_key, "a"));
        map.0.insert(root_key, fragment_value(PathFragmentsKey::default(), "/"));

        let resolver = FragmentsResolver::new(map);
        assert_eq!(resolver.resolve_inode(1, 9), "/a/b");
    }

    // Scenario 3: broken chain.
    #[test]
    fn fragments_broken_chain_yields_error_prefix() {
        let mut map = TestFragmentsMap::default();
        let b_key = PathFragmentsKey::new(1, 9);
        let missing_parent = PathFragmentsKey::new(1, 5);
        map.0.insert(b_key, fragment_value(missing_parent, "b"));

        let resolver = FragmentsResolver::new(map);
        assert_eq!(resolver.resolve_inode(1, 9), "*ERROR*/b");
    }

    #[test]
    fn fragments_remove_inode_deletes_the_entry() {
        let mut map = TestFragmentsMap::default();
        let key = PathFragmentsKey::new(1, 9);
        map.0.insert(key, fragment_value(PathFragmentsKey::default(), "b"));
        let mut resolver = FragmentsResolver::new(map);
        resolver.remove_inode(1, 9);
        assert_eq!(resolver.resolve_inode(1, 9), "*ERROR*");
    }

    #[test]
    fn single_fragment_resolves_a_stored_path() {
        let mut map = TestSingleFragmentMap::default();
        let mut buf = [0u8; fsprobe_common::SINGLE_FRAGMENT_LEN];
        let encoded = b"b\0a\0/\0";
        buf[..encoded.len()].copy_from_slice(encoded);
        map.0.insert(7, buf);

        let resolver = SingleFragmentResolver::new(map);
        assert_eq!(resolver.resolve_key(7, encoded.len() as u32).unwrap(), "/a/b");
    }

    #[test]
    fn single_fragment_null_key_is_invalid() {
        let map = TestSingleFragmentMap::default();
        let resolver = SingleFragmentResolver::new(map);
        assert!(resolver.resolve_key(0, 10).is_err());
    }

    #[test]
    fn single_fragment_missing_key_errors() {
        let map = TestSingleFragmentMap::default();
        let resolver = SingleFragmentResolver::new(map);
        assert!(resolver.resolve_key(42, 10).is_err());
    }

    // Scenario 1: simple open, PerfBuffer.
    #[test]
    fn perf_buffer_open_caches_the_resolved_path() {
        let mut resolver = PerfBufferResolver::with_capacity(TestInodeSet::default(), 8);
        resolver.add_cache_entry(10, "/tmp/a");

        let mut raw = blank_raw_event(EventKind::Open);
        raw.src_inode = 20;
        raw.src_pathname_key = 10;
        raw.src_pathname_length = 2;
        let resolved = resolver.resolve_paths(&raw, b"b\0");

        assert_eq!(resolved.src, "/tmp/a/b");
        assert!(resolved.error.is_none());
        assert!(resolver.cached_inodes.contains(20));
    }

    // Scenario 4: unlink invalidation.
    #[test]
    fn perf_buffer_unlink_removes_from_lru_and_kernel_set() {
        let mut resolver = PerfBufferResolver::with_capacity(TestInodeSet::default(), 8);
        resolver.add_cache_entry(17, "/etc/hosts");
        assert!(resolver.cached_inodes.contains(17));

        resolver.remove_entry(17);

        assert!(resolver.lru.get(&17).is_none());
        assert!(!resolver.cached_inodes.contains(17));
    }

    // Scenario 5: rename resolves both sides before any invalidation.
    #[test]
    fn perf_buffer_rename_resolves_both_sides_without_invalidating() {
        let mut resolver = PerfBufferResolver::with_capacity(TestInodeSet::default(), 8);
        resolver.add_cache_entry(100, "/src");
        resolver.add_cache_entry(200, "/dst");

        let mut raw = blank_raw_event(EventKind::Rename);
        raw.src_inode = 100;
        raw.target_inode = 200;
        raw.src_pathname_key = 0;
        raw.target_pathname_key = 0;

        let resolved = resolver.resolve_paths(&raw, b"");
        assert_eq!(resolved.src, "");
        assert_eq!(resolved.target, Some(String::new()));
        assert!(resolver.cached_inodes.contains(100));
        assert!(resolver.cached_inodes.contains(200));
    }

    #[test]
    fn perf_buffer_root_inode_resolves_without_lookup() {
        let mut resolver = PerfBufferResolver::with_capacity(TestInodeSet::default(), 8);
        let mut raw = blank_raw_event(EventKind::Open);
        raw.src_pathname_key = fsprobe_common::ROOT_INODE as u32;
        raw.src_pathname_length = 2;
        let resolved = resolver.resolve_paths(&raw, b"a\0");
        assert_eq!(resolved.src, "/a");
    }

    #[test]
    fn perf_buffer_missing_prefix_key_surfaces_error_but_still_resolves_leaf() {
        let mut resolver = PerfBufferResolver::with_capacity(TestInodeSet::default(), 8);
        let mut raw = blank_raw_event(EventKind::Open);
        raw.src_pathname_key = 999;
        raw.src_pathname_length = 2;
        let resolved = resolver.resolve_paths(&raw, b"a\0");
        assert_eq!(resolved.src, "/a");
        assert!(resolved.error.is_some());
    }

    #[test]
    fn perf_buffer_eviction_deletes_the_kernel_entry() {
        let mut resolver = PerfBufferResolver::with_capacity(TestInodeSet::default(), 2);
        resolver.add_cache_entry(1, "/a");
        resolver.add_cache_entry(2, "/b");
        assert!(resolver.cached_inodes.contains(1));
        resolver.add_cache_entry(3, "/c");
        // capacity 2: inserting a third key evicts the least-recently-used
        // entry (1, since 2 was touched more recently via the add above).
        assert!(!resolver.cached_inodes.contains(1));
        assert!(resolver.cached_inodes.contains(2));
        assert!(resolver.cached_inodes.contains(3));
    }

    fn blank_raw_event(kind: EventKind) -> RawEvent {
        RawEvent {
            timestamp_ns: 0,
            pid: 0,
            tid: 0,
            uid: 0,
            gid: 0,
            tty: [0; 16],
            comm: [0; 16],
            flags: 0,
            mode: 0,
            src_pathname_key: 0,
            target_pathname_key: 0,
            src_inode: 0,
            src_pathname_length: 0,
            src_mount_id: 0,
            target_inode: 0,
            target_pathname_length: 0,
            target_mount_id: 0,
            retval: 0,
            event_type: kind,
        }
    }
}
