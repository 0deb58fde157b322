//! C1 — byte-order probe and the fixed 112-byte event header decoder.
//!
//! Field offsets mirror `fsprobe_common::FSEventHeader` exactly; this module
//! decodes by hand at documented offsets (§6) rather than transmuting the
//! wire struct, because the byte order is a runtime fact (probed once at
//! startup) rather than a compile-time one.

use fsprobe_common::HEADER_LEN;
use std::sync::OnceLock;

use crate::error::FsProbeError;

/// Largest sample the PerfBuffer strategy can append a header to: 112 bytes
/// of fixed header plus room for a src and a target path fragment each up
/// to a `PATH_MAX`-sized leaf segment.
pub const MAX_SAMPLE_LEN: usize = HEADER_LEN + 8192;

/// Host byte order, resolved once. Never re-detect per call (§9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

static HOST_BYTE_ORDER: OnceLock<ByteOrder> = OnceLock::new();

/// Probes host byte order from a known constant and caches the result.
/// Idempotent: later calls return the cached value without re-probing.
pub fn host_byte_order() -> ByteOrder {
    *HOST_BYTE_ORDER.get_or_init(|| {
        let probe: u32 = 0x0102_0304;
        let bytes = probe.to_ne_bytes();
        if bytes == probe.to_le_bytes() {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    })
}

fn read_u32(buf: &[u8], order: ByteOrder) -> u32 {
    let arr: [u8; 4] = buf[..4].try_into().unwrap();
    match order {
        ByteOrder::Little => u32::from_le_bytes(arr),
        ByteOrder::Big => u32::from_be_bytes(arr),
    }
}

fn read_u64(buf: &[u8], order: ByteOrder) -> u64 {
    let arr: [u8; 8] = buf[..8].try_into().unwrap();
    match order {
        ByteOrder::Little => u64::from_le_bytes(arr),
        ByteOrder::Big => u64::from_be_bytes(arr),
    }
}

fn read_i32(buf: &[u8], order: ByteOrder) -> i32 {
    read_u32(buf, order) as i32
}

/// Tag carried in the header's `event_type` field, widened with `Unknown`
/// for any value outside 0..7 (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Open,
    Mkdir,
    Link,
    Rename,
    Unlink,
    Rmdir,
    Modify,
    SetAttr,
    Unknown(u32),
}

impl EventKind {
    pub fn from_u32(v: u32) -> Self {
        match fsprobe_common::EventType::from_u32(v) {
            Some(fsprobe_common::EventType::Open) => EventKind::Open,
            Some(fsprobe_common::EventType::Mkdir) => EventKind::Mkdir,
            Some(fsprobe_common::EventType::Link) => EventKind::Link,
            Some(fsprobe_common::EventType::Rename) => EventKind::Rename,
            Some(fsprobe_common::EventType::Unlink) => EventKind::Unlink,
            Some(fsprobe_common::EventType::Rmdir) => EventKind::Rmdir,
            Some(fsprobe_common::EventType::Modify) => EventKind::Modify,
            Some(fsprobe_common::EventType::SetAttr) => EventKind::SetAttr,
            None => EventKind::Unknown(v),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Mkdir => "mkdir",
            EventKind::Link => "link",
            EventKind::Rename => "rename",
            EventKind::Unlink => "unlink",
            EventKind::Rmdir => "rmdir",
            EventKind::Modify => "modify",
            EventKind::SetAttr => "setattr",
            EventKind::Unknown(_) => "unknown",
        }
    }
}

/// One decoded header, before path resolution. `src_filename` /
/// `target_filename` are filled in by the resolver (C4), not here.
#[derive(Debug, Clone)]
pub struct RawEvent {
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
    pub event_type: EventKind,
}

impl RawEvent {
    /// Trims the null padding from a fixed-size ASCII field.
    pub fn comm_str(&self) -> String {
        trim_nul(&self.comm)
    }

    pub fn tty_str(&self) -> String {
        trim_nul(&self.tty)
    }
}

fn trim_nul(buf: &[u8; 16]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Decodes the fixed 112-byte header. Returns the event plus the number of
/// bytes consumed (always `HEADER_LEN`) so callers can locate trailing path
/// data for the PerfBuffer strategy.
pub fn decode(buf: &[u8]) -> Result<(RawEvent, usize), FsProbeError> {
    if buf.len() < HEADER_LEN {
        return Err(FsProbeError::NotEnoughData {
            got: buf.len(),
            want: HEADER_LEN,
        });
    }
    let order = host_byte_order();

    let mut tty = [0u8; 16];
    tty.copy_from_slice(&buf[24..40]);
    let mut comm = [0u8; 16];
    comm.copy_from_slice(&buf[40..56]);

    let event = RawEvent {
        timestamp_ns: read_u64(&buf[0..8], order),
        pid: read_u32(&buf[8..12], order),
        tid: read_u32(&buf[12..16], order),
        uid: read_u32(&buf[16..20], order),
        gid: read_u32(&buf[20..24], order),
        tty,
        comm,
        flags: read_u32(&buf[56..60], order),
        mode: read_u32(&buf[60..64], order),
        src_pathname_key: read_u32(&buf[64..68], order),
        target_pathname_key: read_u32(&buf[68..72], order),
        src_inode: read_u64(&buf[72..80], order),
        src_pathname_length: read_u32(&buf[80..84], order),
        src_mount_id: read_u32(&buf[84..88], order),
        target_inode: read_u64(&buf[88..96], order),
        target_pathname_length: read_u32(&buf[96..100], order),
        target_mount_id: read_u32(&buf[100..104], order),
        retval: read_i32(&buf[104..108], order),
        event_type: EventKind::from_u32(read_u32(&buf[108..112], order)),
    };
    Ok((event, HEADER_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(event_type: u32) -> Vec<u8> {
        let order = host_byte_order();
        let mut buf = vec![0u8; HEADER_LEN];
        let put_u64 = |buf: &mut [u8], off: usize, v: u64| match order {
            ByteOrder::Little => buf[off..off + 8].copy_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => buf[off..off + 8].copy_from_slice(&v.to_be_bytes()),
        };
        let put_u32 = |buf: &mut [u8], off: usize, v: u32| match order {
            ByteOrder::Little => buf[off..off + 4].copy_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => buf[off..off + 4].copy_from_slice(&v.to_be_bytes()),
        };
        put_u64(&mut buf, 0, 123_456_789);
        put_u32(&mut buf, 8, 42); // pid
        put_u32(&mut buf, 12, 7); // tid
        put_u32(&mut buf, 16, 1000); // uid
        put_u32(&mut buf, 20, 1000); // gid
        buf[24..28].copy_from_slice(b"tty1");
        buf[40..44].copy_from_slice(b"cat\0");
        put_u32(&mut buf, 56, 0o100); // flags
        put_u32(&mut buf, 60, 0o644); // mode
        put_u32(&mut buf, 64, 0); // src_pathname_key
        put_u32(&mut buf, 68, 0); // target_pathname_key
        put_u64(&mut buf, 72, 77); // src_inode
        put_u32(&mut buf, 80, 0); // src_pathname_length
        put_u32(&mut buf, 84, 1); // src_mount_id
        put_u64(&mut buf, 88, 0); // target_inode
        put_u32(&mut buf, 96, 0); // target_pathname_length
        put_u32(&mut buf, 100, 0); // target_mount_id
        put_u32(&mut buf, 104, 0); // retval
        put_u32(&mut buf, 108, event_type);
        buf
    }

    #[test]
    fn decodes_known_event_type() {
        let buf = header_bytes(0);
        let (evt, consumed) = decode(&buf).unwrap();
        assert_eq!(consumed, HEADER_LEN);
        assert_eq!(evt.pid, 42);
        assert_eq!(evt.tid, 7);
        assert_eq!(evt.src_inode, 77);
        assert_eq!(evt.comm_str(), "cat");
        assert!(matches!(evt.event_type, EventKind::Open));
    }

    #[test]
    fn unknown_event_type_is_mapped() {
        let buf = header_bytes(99);
        let (evt, _) = decode(&buf).unwrap();
        assert_eq!(evt.event_type.name(), "unknown");
        assert!(matches!(evt.event_type, EventKind::Unknown(99)));
    }

    #[test]
    fn short_buffer_errors() {
        let buf = vec![0u8; 80];
        let err = decode(&buf).unwrap_err();
        assert_eq!(
            err,
            FsProbeError::NotEnoughData {
                got: 80,
                want: HEADER_LEN
            }
        );
    }

    #[test]
    fn byte_order_is_stable_across_calls() {
        assert_eq!(host_byte_order(), host_byte_order());
    }
}
