#![cfg_attr(not(feature = "user"), no_std)]

//! Types shared between the `fsprobe-ebpf` kernel program and the
//! `fsprobe` userspace consumer: the wire layout of one event record, the
//! map key/value shapes, and the small set of constants both sides must
//! agree on.

use bytemuck::{Pod, Zeroable};
#[cfg(feature = "user")]
use serde::{Deserialize, Serialize};

/// Bytes in the fixed event header, before any trailing path data.
pub const HEADER_LEN: usize = 112;
/// Capacity of one `PathFragmentsValue.fragment` slot.
pub const PATH_FRAGMENT_LEN: usize = 256;
/// Capacity of a `SingleFragment` map value (a whole null-separated path).
pub const SINGLE_FRAGMENT_LEN: usize = 4351;
/// Bound on the PerfBuffer strategy's user-space resolved-path LRU.
pub const RESOLVED_CACHE_CAPACITY: usize = 120_000;
/// Inode number the kernel reserves for the filesystem root.
pub const ROOT_INODE: u64 = 2;

/// Map names, kept in one place so the loader and the BPF program can't
/// drift apart.
pub mod maps {
    pub const PATH_FRAGMENTS: &str = "PATH_FRAGMENTS";
    pub const SINGLE_FRAGMENT: &str = "SINGLE_FRAGMENT";
    pub const CACHED_INODES: &str = "CACHED_INODES";
    pub const INODE_FILTER: &str = "INODE_FILTER";
    pub const FS_EVENTS: &str = "FS_EVENTS";
}

/// Tag carried in the event header's `event_type` field.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "user", derive(Serialize, Deserialize))]
pub enum EventType {
    Open = 0,
    Mkdir = 1,
    Link = 2,
    Rename = 3,
    Unlink = 4,
    Rmdir = 5,
    Modify = 6,
    SetAttr = 7,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::Open,
        EventType::Mkdir,
        EventType::Link,
        EventType::Rename,
        EventType::Unlink,
        EventType::Rmdir,
        EventType::Modify,
        EventType::SetAttr,
    ];

    /// Every event kind except `Modify`, the default watch set when the
    /// caller names no explicit `--event` flags.
    pub const DEFAULT_SET: [EventType; 7] = [
        EventType::Open,
        EventType::Mkdir,
        EventType::Link,
        EventType::Rename,
        EventType::Unlink,
        EventType::Rmdir,
        EventType::SetAttr,
    ];

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(EventType::Open),
            1 => Some(EventType::Mkdir),
            2 => Some(EventType::Link),
            3 => Some(EventType::Rename),
            4 => Some(EventType::Unlink),
            5 => Some(EventType::Rmdir),
            6 => Some(EventType::Modify),
            7 => Some(EventType::SetAttr),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "open" => Some(EventType::Open),
            "mkdir" => Some(EventType::Mkdir),
            "link" => Some(EventType::Link),
            "rename" => Some(EventType::Rename),
            "unlink" => Some(EventType::Unlink),
            "rmdir" => Some(EventType::Rmdir),
            "modify" => Some(EventType::Modify),
            "setattr" => Some(EventType::SetAttr),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventType::Open => "open",
            EventType::Mkdir => "mkdir",
            EventType::Link => "link",
            EventType::Rename => "rename",
            EventType::Unlink => "unlink",
            EventType::Rmdir => "rmdir",
            EventType::Modify => "modify",
            EventType::SetAttr => "setattr",
        }
    }

    /// kprobe/kretprobe attach point for this event kind, mirroring the
    /// original project's static VFS symbol table.
    pub fn probe_symbol(&self) -> &'static str {
        match self {
            EventType::Open => "vfs_open",
            EventType::Mkdir => "vfs_mkdir",
            EventType::Link => "vfs_link",
            EventType::Rename => "vfs_rename",
            EventType::Unlink => "vfs_unlink",
            EventType::Rmdir => "vfs_rmdir",
            EventType::Modify => "__fsnotify_parent",
            EventType::SetAttr => "security_inode_setattr",
        }
    }
}

/// A dentry-chain key: (mount_id, inode). Serialises to 16 bytes so the
/// trailing 4 bytes of padding are explicit rather than relying on
/// struct layout to line up the same way across toolchains.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PathFragmentsKey {
    pub inode: u64,
    pub mount_id: u32,
    pub _pad: u32,
}

impl PathFragmentsKey {
    pub fn new(mount_id: u32, inode: u64) -> Self {
        Self {
            inode,
            mount_id,
            _pad: 0,
        }
    }

    /// True for the zero key used nowhere but as an absent/null marker.
    pub fn is_null(&self) -> bool {
        self.inode == 0 && self.mount_id == 0
    }

    /// True for a key that terminates a fragment chain (root's parent).
    pub fn is_empty_inode(&self) -> bool {
        self.inode == 0
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        bytemuck::bytes_of(self).try_into().unwrap()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 16 {
            return None;
        }
        Some(*bytemuck::from_bytes(&bytes[..16]))
    }
}

/// One link in the Fragments strategy's dentry chain: a parent key plus
/// this dentry's own leaf-first path fragment.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct PathFragmentsValue {
    pub parent: PathFragmentsKey,
    pub fragment: [u8; PATH_FRAGMENT_LEN],
}

impl core::fmt::Debug for PathFragmentsValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PathFragmentsValue")
            .field("parent", &self.parent)
            .field("fragment_len", &self.fragment.len())
            .finish()
    }
}

/// The fixed-size wire layout of one event header, as the kernel program
/// writes it and as a `PerfEventArray` sample begins. Trailing path bytes
/// (if any) follow immediately after these 112 bytes in the same sample.
///
/// Userspace does not read this type by direct cast; see `fsprobe`'s
/// `codec` module, which decodes each field at its documented offset
/// according to the byte order probed at startup. This struct exists so
/// the kernel side and any tests constructing raw samples have one
/// agreed-upon, size-checked shape.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct FSEventHeader {
    pub timestamp_ns: u64,
    pub pid: u32,
    pub tid: u32,
    pub uid: u32,
    pub gid: u32,
    pub tty: [u8; 16],
    pub comm: [u8; 16],
    pub flags: u32,
    pub mode: u32,
    pub src_pathname_key: u32,
    pub target_pathname_key: u32,
    pub src_inode: u64,
    pub src_pathname_length: u32,
    pub src_mount_id: u32,
    pub target_inode: u64,
    pub target_pathname_length: u32,
    pub target_mount_id: u32,
    pub retval: i32,
    pub event_type: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matches_documented_layout() {
        assert_eq!(core::mem::size_of::<FSEventHeader>(), HEADER_LEN);
        assert_eq!(core::mem::offset_of!(FSEventHeader, timestamp_ns), 0);
        assert_eq!(core::mem::offset_of!(FSEventHeader, pid), 8);
        assert_eq!(core::mem::offset_of!(FSEventHeader, tid), 12);
        assert_eq!(core::mem::offset_of!(FSEventHeader, uid), 16);
        assert_eq!(core::mem::offset_of!(FSEventHeader, gid), 20);
        assert_eq!(core::mem::offset_of!(FSEventHeader, tty), 24);
        assert_eq!(core::mem::offset_of!(FSEventHeader, comm), 40);
        assert_eq!(core::mem::offset_of!(FSEventHeader, flags), 56);
        assert_eq!(core::mem::offset_of!(FSEventHeader, mode), 60);
        assert_eq!(core::mem::offset_of!(FSEventHeader, src_pathname_key), 64);
        assert_eq!(
            core::mem::offset_of!(FSEventHeader, target_pathname_key),
            68
        );
        assert_eq!(core::mem::offset_of!(FSEventHeader, src_inode), 72);
        assert_eq!(
            core::mem::offset_of!(FSEventHeader, src_pathname_length),
            80
        );
        assert_eq!(core::mem::offset_of!(FSEventHeader, src_mount_id), 84);
        assert_eq!(core::mem::offset_of!(FSEventHeader, target_inode), 88);
        assert_eq!(
            core::mem::offset_of!(FSEventHeader, target_pathname_length),
            96
        );
        assert_eq!(core::mem::offset_of!(FSEventHeader, target_mount_id), 100);
        assert_eq!(core::mem::offset_of!(FSEventHeader, retval), 104);
        assert_eq!(core::mem::offset_of!(FSEventHeader, event_type), 108);
    }

    #[test]
    fn path_fragments_key_round_trips() {
        let k = PathFragmentsKey::new(7, 42);
        let bytes = k.to_bytes();
        assert_eq!(PathFragmentsKey::from_bytes(&bytes), Some(k));
    }

    #[test]
    fn event_type_name_round_trips() {
        for ty in EventType::ALL {
            assert_eq!(EventType::from_name(ty.name()), Some(ty));
        }
    }

    #[test]
    fn default_set_excludes_modify() {
        assert!(!EventType::DEFAULT_SET.contains(&EventType::Modify));
        assert_eq!(EventType::DEFAULT_SET.len(), 7);
    }
}
