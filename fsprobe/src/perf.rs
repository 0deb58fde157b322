//! C5 — reads the kernel `FS_EVENTS` perf ring buffer, one task per online
//! CPU, via `AsyncFd<PerfEventArrayBuffer<MapData>>` and `read_events`.
//!
//! Exposes two lazy sequences, samples and losses, as plain `mpsc`
//! receivers; callers (the monitor) multiplex them against a stop signal
//! with `tokio::select!` rather than this module picking an internal
//! priority between them.

use aya::maps::perf::{PerfEventArray, PerfEventArrayBuffer};
use aya::maps::MapData;
use aya::util::online_cpus;
use bytes::BytesMut;
use log::{error, warn};
use tokio::io::unix::AsyncFd;
use tokio::sync::{mpsc, watch};

use crate::codec::{self, MAX_SAMPLE_LEN};
use crate::error::FsProbeError;
use crate::resolver::ResolvedPaths;

/// One decoded sample plus its still-undecoded trailing path bytes (used
/// only by the PerfBuffer resolver strategy; empty for the other two).
pub struct Sample {
    pub raw: codec::RawEvent,
    pub trailing: Vec<u8>,
}

/// A lost-sample notification for one CPU's ring (§4.5 — reported, never
/// silently dropped).
#[derive(Debug, Clone, Copy)]
pub struct Loss {
    pub cpu_id: u32,
    pub count: u64,
}

/// Owns the stop signal and the per-CPU reader tasks, kept separately from
/// the two receiver channels so the monitor can move the receivers into its
/// dispatcher task while retaining this handle for `stop` at shutdown.
pub struct PerfHandle {
    stop_tx: watch::Sender<bool>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl PerfHandle {
    /// Signals every reader task to exit, then waits for all of them.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("perf reader task panicked: {e}");
            }
        }
    }
}

/// Launches one reader task per online CPU and fans samples/losses into
/// bounded channels. Dropping the returned receivers ends the corresponding
/// sequence from the caller's point of view; `PerfHandle::stop` is the
/// normal shutdown path (§4.6's Monitor Stop transition).
pub fn start(
    perf_array: &mut PerfEventArray<MapData>,
    perf_buffer_pages: usize,
    chan_size: usize,
) -> Result<(mpsc::Receiver<Sample>, mpsc::Receiver<Loss>, PerfHandle), FsProbeError> {
    let (sample_tx, samples) = mpsc::channel(chan_size);
    let (loss_tx, losses) = mpsc::channel(chan_size);
    let (stop_tx, _) = watch::channel(false);

    let cpus =
        online_cpus().map_err(|(msg, e)| FsProbeError::Config(format!("online_cpus ({msg}): {e}")))?;

    let mut handles = Vec::with_capacity(cpus.len());
    for cpu_id in cpus {
        let buf = perf_array
            .open(cpu_id, Some(perf_buffer_pages))
            .map_err(|e| FsProbeError::Config(format!("open perf buffer for cpu {cpu_id}: {e}")))?;
        let sample_tx = sample_tx.clone();
        let loss_tx = loss_tx.clone();
        let mut stop_rx = stop_tx.subscribe();
        handles.push(tokio::spawn(async move {
            if let Err(e) = read_cpu_loop(cpu_id, buf, sample_tx, loss_tx, &mut stop_rx).await {
                error!("perf reader for cpu {cpu_id} exited: {e}");
            }
        }));
    }

    Ok((samples, losses, PerfHandle { stop_tx, handles }))
}

async fn read_cpu_loop(
    cpu_id: u32,
    buf: PerfEventArrayBuffer<MapData>,
    sample_tx: mpsc::Sender<Sample>,
    loss_tx: mpsc::Sender<Loss>,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<(), FsProbeError> {
    let mut async_fd = AsyncFd::new(buf)
        .map_err(|e| FsProbeError::Config(format!("AsyncFd for cpu {cpu_id}: {e}")))?;
    let mut scratch: Vec<BytesMut> = (0..10).map(|_| BytesMut::with_capacity(MAX_SAMPLE_LEN)).collect();

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            guard = async_fd.readable_mut() => {
                let mut guard = match guard {
                    Ok(g) => g,
                    Err(e) => {
                        warn!("cpu {cpu_id} perf fd not readable: {e}");
                        continue;
                    }
                };
                let events = match guard.try_io(|inner| inner.get_mut().read_events(&mut scratch)) {
                    Ok(Ok(events)) => events,
                    Ok(Err(e)) => {
                        warn!("cpu {cpu_id} read_events failed: {e}");
                        continue;
                    }
                    Err(_would_block) => continue,
                };

                if events.lost > 0 {
                    let _ = loss_tx
                        .send(Loss { cpu_id, count: events.lost as u64 })
                        .await;
                }

                for scratch_buf in scratch.iter_mut().take(events.read) {
                    match codec::decode(scratch_buf) {
                        Ok((raw, consumed)) => {
                            let trailing = scratch_buf[consumed..].to_vec();
                            if sample_tx.send(Sample { raw, trailing }).await.is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => warn!("cpu {cpu_id} dropped malformed sample: {e}"),
                    }
                }
            }
        }
    }
    Ok(())
}

/// Convenience used by the dispatcher: pairs a decoded sample with its
/// resolved path(s), the shape delivered to output formatters (§4.8).
pub struct ResolvedSample {
    pub raw: codec::RawEvent,
    pub paths: ResolvedPaths,
}
