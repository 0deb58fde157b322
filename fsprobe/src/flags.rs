//! Bit-table string renderers for the `flags` (Open) and `mode` (SetAttr)
//! header fields (§6).

const OPEN_FLAGS: &[(i32, &str)] = &[
    (libc::O_WRONLY, "O_WRONLY"),
    (libc::O_RDWR, "O_RDWR"),
    (libc::O_CREAT, "O_CREAT"),
    (libc::O_EXCL, "O_EXCL"),
    (libc::O_NOCTTY, "O_NOCTTY"),
    (libc::O_TRUNC, "O_TRUNC"),
    (libc::O_APPEND, "O_APPEND"),
    (libc::O_NONBLOCK, "O_NONBLOCK"),
    (libc::O_DSYNC, "O_DSYNC"),
    (libc::FASYNC, "FASYNC"),
    (libc::O_DIRECT, "O_DIRECT"),
    (libc::O_LARGEFILE, "O_LARGEFILE"),
    (libc::O_DIRECTORY, "O_DIRECTORY"),
    (libc::O_NOFOLLOW, "O_NOFOLLOW"),
    (libc::O_NOATIME, "O_NOATIME"),
    (libc::O_CLOEXEC, "O_CLOEXEC"),
];

/// Renders the `flags` field of an Open event. `O_RDONLY` is 0 and carries
/// no bit, so it's reported only when no other access-mode bit is set.
pub fn open_flags_to_string(flags: u32) -> String {
    let flags = flags as i32;
    let mut parts = Vec::new();

    if flags & libc::O_ACCMODE == 0 {
        parts.push("O_RDONLY".to_string());
    }
    for &(bit, name) in OPEN_FLAGS {
        if bit != 0 && flags & bit == bit {
            parts.push(name.to_string());
        }
    }
    if parts.is_empty() {
        "O_RDONLY".to_string()
    } else {
        parts.join("|")
    }
}

// `libc` doesn't expose the `ATTR_*` inode-attribute bits; they're a VFS
// concept, not a syscall flag.
const ATTR_MODE: u32 = 1 << 0;
const ATTR_UID: u32 = 1 << 1;
const ATTR_GID: u32 = 1 << 2;
const ATTR_SIZE: u32 = 1 << 3;
const ATTR_ATIME: u32 = 1 << 4;
const ATTR_MTIME: u32 = 1 << 5;
const ATTR_CTIME: u32 = 1 << 6;
const ATTR_ATIME_SET: u32 = 1 << 7;
const ATTR_MTIME_SET: u32 = 1 << 8;
const ATTR_FORCE: u32 = 1 << 9;
const ATTR_KILL_SUID: u32 = 1 << 11;
const ATTR_KILL_SGID: u32 = 1 << 12;
const ATTR_FILE: u32 = 1 << 13;
const ATTR_KILL_PRIV: u32 = 1 << 14;
const ATTR_OPEN: u32 = 1 << 15;
const ATTR_TIMES_SET: u32 = 1 << 16;
const ATTR_TOUCH: u32 = 1 << 17;

const SETATTR_FLAGS: &[(u32, &str)] = &[
    (ATTR_MODE, "ATTR_MODE"),
    (ATTR_UID, "ATTR_UID"),
    (ATTR_GID, "ATTR_GID"),
    (ATTR_SIZE, "ATTR_SIZE"),
    (ATTR_ATIME, "ATTR_ATIME"),
    (ATTR_MTIME, "ATTR_MTIME"),
    (ATTR_CTIME, "ATTR_CTIME"),
    (ATTR_ATIME_SET, "ATTR_ATIME_SET"),
    (ATTR_MTIME_SET, "ATTR_MTIME_SET"),
    (ATTR_FORCE, "ATTR_FORCE"),
    (ATTR_KILL_SUID, "ATTR_KILL_SUID"),
    (ATTR_KILL_SGID, "ATTR_KILL_SGID"),
    (ATTR_FILE, "ATTR_FILE"),
    (ATTR_KILL_PRIV, "ATTR_KILL_PRIV"),
    (ATTR_OPEN, "ATTR_OPEN"),
    (ATTR_TIMES_SET, "ATTR_TIMES_SET"),
    (ATTR_TOUCH, "ATTR_TOUCH"),
];

/// Renders the `mode` field of a SetAttr event as the set of `ATTR_*` bits.
pub fn setattr_flags_to_string(mode: u32) -> String {
    let parts: Vec<&str> = SETATTR_FLAGS
        .iter()
        .filter(|&&(bit, _)| mode & bit == bit)
        .map(|&(_, name)| name)
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        parts.join("|")
    }
}
