//! C8 — the event dispatcher. Pulls decoded samples and loss reports off
//! the perf consumer (C5), resolves paths (C4), applies §4.8's
//! per-event-type invalidation policy, then forwards the resolved event to
//! a bounded downstream channel with blocking backpressure (never a silent
//! drop at this layer).

use std::sync::Arc;

use log::warn;
use tokio::sync::{mpsc, Mutex};

use crate::codec::{EventKind, RawEvent};
use crate::perf::{Loss, ResolvedSample, Sample};
use crate::resolver::Resolver;

/// The subset of `Resolver`'s surface the invalidation policy needs,
/// extracted so the per-event-type routing (§4.8 step 3) can be unit
/// tested against a recording double instead of a live kernel map.
pub trait Invalidatable {
    fn tag(&self) -> &'static str;
    fn remove_inode(&mut self, mount_id: u32, inode: u64);
    fn remove_entry(&mut self, key: u32);
}

impl Invalidatable for Resolver {
    fn tag(&self) -> &'static str {
        Resolver::tag(self)
    }

    fn remove_inode(&mut self, mount_id: u32, inode: u64) {
        Resolver::remove_inode(self, mount_id, inode)
    }

    fn remove_entry(&mut self, key: u32) {
        Resolver::remove_entry(self, key)
    }
}

/// §4.8 step 3. Rename never invalidates (both paths resolve first, the
/// target entry is not pre-removed); Link's PerfBuffer arm is a no-op since
/// that strategy never caches a target entry on Link (§4.4.3).
pub fn apply_invalidation<R: Invalidatable>(resolver: &mut R, raw: &RawEvent) {
    match raw.event_type {
        EventKind::Unlink => match resolver.tag() {
            "fragments" => resolver.remove_inode(raw.src_mount_id, raw.src_inode),
            "single_fragment" => resolver.remove_entry(raw.src_pathname_key),
            "perf_buffer" => resolver.remove_entry(raw.src_inode as u32),
            _ => {}
        },
        EventKind::Link => match resolver.tag() {
            "fragments" => resolver.remove_inode(raw.target_mount_id, raw.target_inode),
            "single_fragment" => resolver.remove_entry(raw.target_pathname_key),
            _ => {}
        },
        _ => {}
    }
}

/// The dispatcher's run loop (§5: "one dispatcher task pulls from the
/// consumer and performs §4.8"). Exits once both the sample and loss
/// channels have closed, which happens after `PerfHandle::stop` drains the
/// per-CPU reader tasks.
pub async fn run(
    mut samples: mpsc::Receiver<Sample>,
    mut losses: mpsc::Receiver<Loss>,
    resolver: Arc<Mutex<Resolver>>,
    sink: mpsc::Sender<ResolvedSample>,
    loss_sink: mpsc::Sender<Loss>,
) {
    let mut samples_open = true;
    let mut losses_open = true;

    while samples_open || losses_open {
        tokio::select! {
            sample = samples.recv(), if samples_open => {
                match sample {
                    Some(sample) => dispatch_one(sample, &resolver, &sink).await,
                    None => samples_open = false,
                }
            }
            loss = losses.recv(), if losses_open => {
                match loss {
                    Some(loss) => {
                        warn!(
                            "[fsprobe] lost {} samples on cpu {} (FS_EVENTS)",
                            loss.count, loss.cpu_id
                        );
                        let _ = loss_sink.send(loss).await;
                    }
                    None => losses_open = false,
                }
            }
        }
    }
}

async fn dispatch_one(sample: Sample, resolver: &Arc<Mutex<Resolver>>, sink: &mpsc::Sender<ResolvedSample>) {
    let mut guard = resolver.lock().await;
    let paths = guard.resolve_paths(&sample.raw, &sample.trailing);
    if let Some(err) = &paths.error {
        warn!(
            "[fsprobe] {} event for pid {} (inode {}) resolved with an error: {err}",
            sample.raw.event_type.name(),
            sample.raw.pid,
            sample.raw.src_inode,
        );
    }
    apply_invalidation(&mut *guard, &sample.raw);
    drop(guard);

    // Blocking send: backpressure into the dispatcher, never a silent drop.
    let _ = sink
        .send(ResolvedSample {
            raw: sample.raw,
            paths,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingResolver {
        tag: &'static str,
        calls: Vec<(&'static str, u32, u64)>,
    }

    impl Invalidatable for RecordingResolver {
        fn tag(&self) -> &'static str {
            self.tag
        }

        fn remove_inode(&mut self, mount_id: u32, inode: u64) {
            self.calls.push(("remove_inode", mount_id, inode));
        }

        fn remove_entry(&mut self, key: u32) {
            self.calls.push(("remove_entry", key, 0));
        }
    }

    fn raw_event(event_type: EventKind) -> RawEvent {
        RawEvent {
            timestamp_ns: 0,
            pid: 1,
            tid: 1,
            uid: 0,
            gid: 0,
            tty: [0; 16],
            comm: [0; 16],
            flags: 0,
            mode: 0,
            src_pathname_key: 10,
            target_pathname_key: 20,
            src_inode: 100,
            src_pathname_length: 0,
            src_mount_id: 1,
            target_inode: 200,
            target_pathname_length: 0,
            target_mount_id: 1,
            retval: 0,
            event_type,
        }
    }

    #[test]
    fn unlink_fragments_removes_by_mount_and_inode() {
        let mut r = RecordingResolver {
            tag: "fragments",
            calls: Vec::new(),
        };
        apply_invalidation(&mut r, &raw_event(EventKind::Unlink));
        assert_eq!(r.calls, vec![("remove_inode", 1, 100)]);
    }

    #[test]
    fn unlink_single_fragment_removes_by_src_pathname_key() {
        let mut r = RecordingResolver {
            tag: "single_fragment",
            calls: Vec::new(),
        };
        apply_invalidation(&mut r, &raw_event(EventKind::Unlink));
        assert_eq!(r.calls, vec![("remove_entry", 10, 0)]);
    }

    #[test]
    fn unlink_perf_buffer_removes_by_inode_cast_to_u32() {
        let mut r = RecordingResolver {
            tag: "perf_buffer",
            calls: Vec::new(),
        };
        apply_invalidation(&mut r, &raw_event(EventKind::Unlink));
        assert_eq!(r.calls, vec![("remove_entry", 100, 0)]);
    }

    #[test]
    fn link_fragments_removes_target_by_mount_and_inode() {
        let mut r = RecordingResolver {
            tag: "fragments",
            calls: Vec::new(),
        };
        apply_invalidation(&mut r, &raw_event(EventKind::Link));
        assert_eq!(r.calls, vec![("remove_inode", 1, 200)]);
    }

    #[test]
    fn link_perf_buffer_is_a_no_op() {
        let mut r = RecordingResolver {
            tag: "perf_buffer",
            calls: Vec::new(),
        };
        apply_invalidation(&mut r, &raw_event(EventKind::Link));
        assert!(r.calls.is_empty());
    }

    #[test]
    fn rename_never_invalidates() {
        for tag in ["fragments", "single_fragment", "perf_buffer"] {
            let mut r = RecordingResolver {
                tag,
                calls: Vec::new(),
            };
            apply_invalidation(&mut r, &raw_event(EventKind::Rename));
            assert!(r.calls.is_empty(), "tag {tag} should not invalidate on rename");
        }
    }
}
