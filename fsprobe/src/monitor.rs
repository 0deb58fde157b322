//! C6 — the Monitor. Owns the enabled probe set, the resolver for the
//! selected strategy, the inode-filter map, and the perf consumer; drives
//! the `New -> Configured -> Initialised -> Running -> Stopping -> Stopped`
//! lifecycle (§4.6). `start`/`stop` are idempotent under repeated
//! invocation: the running flag is guarded by a readers-writer lock, and
//! the resolver/filter maps a later `watch()` call touches are guarded by
//! mutexes shared with the dispatcher task (§5's "single-writer; if exposed
//! to other tasks, must be guarded by a mutex").

use std::path::PathBuf;
use std::sync::Arc;

use aya::maps::perf::PerfEventArray;
use aya::maps::MapData;
use aya::programs::KProbe;
use aya::Ebpf;
use fsprobe_common::{maps as map_names, EventType};
use log::info;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::dispatcher;
use crate::error::FsProbeError;
use crate::filter::InodeFilterMap;
use crate::kmap::{LiveFragmentsMap, LiveInodeSet, LiveSingleFragmentMap};
use crate::perf::{self, Loss, PerfHandle, ResolvedSample};
use crate::resolver::{FragmentsResolver, PerfBufferResolver, Resolver, SingleFragmentResolver};
use crate::seeder::{self, SeedMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    New,
    Configured,
    Initialised,
    Running,
    Stopping,
    Stopped,
}

struct RunningState {
    perf_handle: PerfHandle,
    dispatcher_handle: JoinHandle<()>,
    resolver: Arc<Mutex<Resolver>>,
    filter: Arc<Mutex<InodeFilterMap>>,
}

/// Which probe/kretprobe program pair and kernel symbol back one event
/// kind, mirroring `fsprobe-ebpf/src/program.rs`'s `entry_probe!`
/// invocations one-to-one.
fn probe_programs(event: EventType) -> (&'static str, &'static str, &'static str) {
    let symbol = event.probe_symbol();
    match event {
        EventType::Open => ("trace_vfs_open", "trace_vfs_open_ret", symbol),
        EventType::Mkdir => ("trace_vfs_mkdir", "trace_vfs_mkdir_ret", symbol),
        EventType::Link => ("trace_vfs_link", "trace_vfs_link_ret", symbol),
        EventType::Rename => ("trace_vfs_rename", "trace_vfs_rename_ret", symbol),
        EventType::Unlink => ("trace_vfs_unlink", "trace_vfs_unlink_ret", symbol),
        EventType::Rmdir => ("trace_vfs_rmdir", "trace_vfs_rmdir_ret", symbol),
        EventType::Modify => ("trace_fsnotify_parent", "trace_fsnotify_parent_ret", symbol),
        EventType::SetAttr => (
            "trace_security_inode_setattr",
            "trace_security_inode_setattr_ret",
            symbol,
        ),
    }
}

fn attach_kprobe(bpf: &mut Ebpf, program: &str, symbol: &str) -> Result<(), FsProbeError> {
    let probe: &mut KProbe = bpf
        .program_mut(program)
        .ok_or_else(|| FsProbeError::Config(format!("{program} program not found")))?
        .try_into()
        .map_err(|e| FsProbeError::Config(format!("{program} is not a kprobe: {e}")))?;
    probe
        .load()
        .map_err(|e| FsProbeError::Config(format!("failed to load {program}: {e}")))?;
    probe
        .attach(symbol, 0)
        .map_err(|e| FsProbeError::Config(format!("failed to attach {program} to {symbol}: {e}")))?;
    Ok(())
}

fn build_resolver(bpf: &mut Ebpf, mode: &str) -> Result<Resolver, FsProbeError> {
    match mode {
        "fragments" => {
            let map = bpf
                .take_map(map_names::PATH_FRAGMENTS)
                .ok_or_else(|| FsProbeError::Config("PATH_FRAGMENTS map not found".into()))?;
            Ok(Resolver::Fragments(FragmentsResolver::new(LiveFragmentsMap::new(map)?)))
        }
        "single_fragment" => {
            let map = bpf
                .take_map(map_names::SINGLE_FRAGMENT)
                .ok_or_else(|| FsProbeError::Config("SINGLE_FRAGMENT map not found".into()))?;
            Ok(Resolver::SingleFragment(SingleFragmentResolver::new(
                LiveSingleFragmentMap::new(map)?,
            )))
        }
        "perf_buffer" => {
            let map = bpf
                .take_map(map_names::CACHED_INODES)
                .ok_or_else(|| FsProbeError::Config("CACHED_INODES map not found".into()))?;
            Ok(Resolver::PerfBuffer(PerfBufferResolver::new(LiveInodeSet::new(map)?)))
        }
        other => Err(FsProbeError::Config(format!(
            "unknown dentry resolution mode: {other}"
        ))),
    }
}

pub struct Monitor {
    state: RwLock<MonitorState>,
    enabled_events: Vec<EventType>,
    resolver_mode: String,
    perf_buffer_pages: usize,
    chan_size: usize,
    running: Mutex<Option<RunningState>>,
}

impl Monitor {
    /// §4.6 "Configure": resolves the enabled event set (every kind except
    /// `Modify` when `events` is `None`) and records the chosen strategy.
    pub fn configure(
        events: Option<&[String]>,
        resolver_mode: &str,
        perf_buffer_pages: usize,
        chan_size: usize,
    ) -> Result<Self, FsProbeError> {
        let enabled_events = match events {
            None => EventType::DEFAULT_SET.to_vec(),
            Some(names) => {
                let mut out = Vec::with_capacity(names.len());
                for name in names {
                    let ev = EventType::from_name(name)
                        .ok_or_else(|| FsProbeError::Config(format!("unknown event name: {name}")))?;
                    out.push(ev);
                }
                out
            }
        };

        Ok(Monitor {
            state: RwLock::new(MonitorState::Configured),
            enabled_events,
            resolver_mode: resolver_mode.to_string(),
            perf_buffer_pages,
            chan_size,
            running: Mutex::new(None),
        })
    }

    pub fn tag(&self) -> &str {
        &self.resolver_mode
    }

    /// §4.6 "Init" + "Start" collapsed into one call: in this runtime the
    /// kernel object collection (`aya::Ebpf`) can only hand out each map
    /// once, so binding probes/maps and launching the consumer happen
    /// together (see DESIGN.md). Idempotent: a second call on an
    /// already-running monitor is a no-op.
    pub async fn start(
        &self,
        bpf: &mut Ebpf,
        sink: mpsc::Sender<ResolvedSample>,
        loss_sink: mpsc::Sender<Loss>,
    ) -> Result<(), FsProbeError> {
        {
            let state = self.state.read().await;
            if matches!(*state, MonitorState::Running) {
                return Ok(());
            }
        }

        let mut state = self.state.write().await;
        if matches!(*state, MonitorState::Running) {
            return Ok(());
        }

        for event in &self.enabled_events {
            let (kprobe, kretprobe, symbol) = probe_programs(*event);
            attach_kprobe(bpf, kprobe, symbol)?;
            attach_kprobe(bpf, kretprobe, symbol)?;
            info!("[fsprobe] attached probes for {}", event.name());
        }
        *state = MonitorState::Initialised;

        let resolver = Arc::new(Mutex::new(build_resolver(bpf, &self.resolver_mode)?));
        let filter_map = bpf
            .take_map(map_names::INODE_FILTER)
            .ok_or_else(|| FsProbeError::Config("INODE_FILTER map not found".into()))?;
        let filter = Arc::new(Mutex::new(InodeFilterMap::new(filter_map)?));

        let fs_events_map = bpf
            .take_map(map_names::FS_EVENTS)
            .ok_or_else(|| FsProbeError::Config("FS_EVENTS map not found".into()))?;
        let mut perf_array = PerfEventArray::<MapData>::try_from(fs_events_map)
            .map_err(|e| FsProbeError::Config(format!("FS_EVENTS is not a perf array: {e}")))?;
        let (samples, losses, perf_handle) =
            perf::start(&mut perf_array, self.perf_buffer_pages, self.chan_size)?;

        let dispatcher_handle = tokio::spawn(dispatcher::run(
            samples,
            losses,
            resolver.clone(),
            sink,
            loss_sink,
        ));

        *self.running.lock().await = Some(RunningState {
            perf_handle,
            dispatcher_handle,
            resolver,
            filter,
        });
        *state = MonitorState::Running;
        info!("[fsprobe] monitor running ({} strategy)", self.resolver_mode);
        Ok(())
    }

    /// §4.6 "Stop": disables probes (by returning the `Ebpf` guard to the
    /// caller, who drops it at process exit), signals the consumer to
    /// drain, and waits for completion. Idempotent.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if !matches!(*state, MonitorState::Running) {
            return;
        }
        *state = MonitorState::Stopping;

        if let Some(running) = self.running.lock().await.take() {
            running.perf_handle.stop().await;
            if let Err(e) = running.dispatcher_handle.await {
                log::warn!("[fsprobe] dispatcher task panicked: {e}");
            }
        }

        *state = MonitorState::Stopped;
        info!("[fsprobe] monitor stopped");
    }

    /// §4.7: adds `roots` to the watch set. Requires the monitor to already
    /// be running (see DESIGN.md's Open Question Decisions for why `watch`
    /// doesn't implicitly start the monitor itself).
    pub async fn watch(&self, roots: &[PathBuf], mode: SeedMode, follow: bool) -> Result<(), FsProbeError> {
        let state = self.state.read().await;
        if !matches!(*state, MonitorState::Running) {
            return Err(FsProbeError::Config(
                "cannot watch before the monitor is running".into(),
            ));
        }

        let running_guard = self.running.lock().await;
        let running = running_guard
            .as_ref()
            .ok_or_else(|| FsProbeError::Config("monitor has no bound maps".into()))?;
        let mut filter = running.filter.lock().await;
        let mut resolver = running.resolver.lock().await;

        seeder::seed(roots, mode, follow, |inode, path| {
            filter.add(inode, path);
            resolver.add_cache_entry(inode, path);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_defaults_to_every_event_except_modify() {
        let monitor = Monitor::configure(None, "perf_buffer", 128, 1000).unwrap();
        assert_eq!(monitor.enabled_events.len(), 7);
        assert!(!monitor.enabled_events.contains(&EventType::Modify));
    }

    #[test]
    fn configure_honours_explicit_event_list() {
        let monitor =
            Monitor::configure(Some(&["open".to_string(), "unlink".to_string()]), "fragments", 128, 1000)
                .unwrap();
        assert_eq!(monitor.enabled_events, vec![EventType::Open, EventType::Unlink]);
    }

    #[test]
    fn configure_rejects_unknown_event_name() {
        let err = Monitor::configure(Some(&["bogus".to_string()]), "perf_buffer", 128, 1000).unwrap_err();
        assert!(matches!(err, FsProbeError::Config(_)));
    }

    #[tokio::test]
    async fn watch_before_start_is_rejected() {
        let monitor = Monitor::configure(None, "perf_buffer", 128, 1000).unwrap();
        let err = monitor
            .watch(&[PathBuf::from("/tmp")], SeedMode::TopLevel, true)
            .await
            .unwrap_err();
        assert!(matches!(err, FsProbeError::Config(_)));
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let monitor = Monitor::configure(None, "perf_buffer", 128, 1000).unwrap();
        monitor.stop().await;
        assert_eq!(*monitor.state.read().await, MonitorState::Configured);
    }
}
