use std::fs;
use std::path::Path;

use anyhow::Context;
use aya::EbpfLoader;
use aya_log::EbpfLogger;
use caps::{CapSet, Capability};
use clap::Parser;
use log::{info, warn};
use tokio::sync::mpsc;

use fsprobe::cli::Cli;
use fsprobe::config::Config;
use fsprobe::monitor::Monitor;
use fsprobe::output::{EventRecord, OutputWriter};
use fsprobe::seeder::SeedMode;

/// Merges a `Config` file with CLI overrides: every CLI flag wins over the
/// config file's value only when the user actually passed it.
struct Effective {
    dentry_resolution_mode: String,
    recursive: bool,
    paths_filtering: bool,
    follow: bool,
    events: Option<Vec<String>>,
    chan_size: usize,
    perf_buffer_size: usize,
    format: String,
    output: Option<std::path::PathBuf>,
    paths: Vec<std::path::PathBuf>,
}

fn merge(cli: Cli, config: Config) -> Effective {
    Effective {
        dentry_resolution_mode: cli
            .dentry_resolution_mode
            .map(|m| m.as_str().to_string())
            .unwrap_or(config.dentry_resolution_mode),
        recursive: cli.recursive.unwrap_or(config.recursive),
        paths_filtering: cli.paths_filtering.unwrap_or(config.paths_filtering),
        follow: cli.follow.unwrap_or(config.follow),
        events: if cli.events.is_empty() {
            config.events
        } else {
            Some(cli.events)
        },
        chan_size: cli.chan_size.unwrap_or(config.chan_size),
        perf_buffer_size: cli.perf_buffer_size.unwrap_or(config.perf_buffer_size),
        format: cli.format.map(|f| f.as_str().to_string()).unwrap_or(config.format),
        output: cli.output.or_else(|| config.output.map(std::path::PathBuf::from)),
        paths: cli.paths,
    }
}

fn check_capabilities() -> anyhow::Result<()> {
    let required = [
        Capability::CAP_BPF,
        Capability::CAP_PERFMON,
        Capability::CAP_SYS_ADMIN,
    ];
    for cap in &required {
        let has_cap = caps::has_cap(None, CapSet::Effective, *cap)
            .with_context(|| format!("failed to query capability {cap:?}"))?;
        if !has_cap {
            anyhow::bail!(
                "missing {:?} capability. Grant it with `sudo setcap cap_bpf,cap_perfmon,cap_sys_admin+ep $(command -v fsprobe)` and restart.",
                cap
            );
        }
    }
    Ok(())
}

fn parse_kernel_version(raw: &str) -> Option<(u32, u32)> {
    let version_part = raw.trim().split('-').next()?;
    let mut segments = version_part.split('.');
    let major = segments.next()?.parse().ok()?;
    let minor = segments.next().unwrap_or("0").parse().ok()?;
    Some((major, minor))
}

fn check_kernel_version(min_major: u32, min_minor: u32) -> anyhow::Result<()> {
    let release = fs::read_to_string("/proc/sys/kernel/osrelease")
        .context("failed to read /proc/sys/kernel/osrelease")?;
    let version = parse_kernel_version(&release).context("unable to parse kernel release string")?;
    if version < (min_major, min_minor) {
        anyhow::bail!(
            "kernel {}.{} lacks the probe support fsprobe needs; require >= {min_major}.{min_minor}",
            version.0,
            version.1,
        );
    }
    Ok(())
}

fn ensure_environment() -> anyhow::Result<()> {
    check_capabilities()?;
    check_kernel_version(5, 8)?;
    Ok(())
}

/// Best-effort `RLIMIT_MEMLOCK` bump; a failure here only warns (§7's
/// SetupError "warning only" clause).
fn bump_memlock_rlimit() {
    let limit = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &limit) };
    if ret != 0 {
        warn!(
            "[fsprobe] failed to raise RLIMIT_MEMLOCK: {}",
            std::io::Error::last_os_error()
        );
    }
}

fn read_bpf_object() -> anyhow::Result<Vec<u8>> {
    if let Ok(path) = std::env::var("FSPROBE_BPF_PATH") {
        return fs::read(&path).with_context(|| format!("reading {path}"));
    }
    const CANDIDATES: [&str; 6] = [
        "/usr/local/share/fsprobe/fsprobe-ebpf",
        "target/bpfel-unknown-none/release/fsprobe-ebpf",
        "./target/bpfel-unknown-none/release/fsprobe-ebpf",
        "../target/bpfel-unknown-none/release/fsprobe-ebpf",
        "target/bpf/fsprobe-ebpf.o",
        "./target/bpf/fsprobe-ebpf.o",
    ];
    for candidate in CANDIDATES {
        if Path::new(candidate).exists() {
            return fs::read(candidate).with_context(|| format!("reading {candidate}"));
        }
    }
    anyhow::bail!(
        "fsprobe-ebpf object not found; set FSPROBE_BPF_PATH or build it with `cargo xtask build-ebpf`"
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load();
    let eff = merge(cli, config);

    info!("[fsprobe] starting, dentry resolution mode: {}", eff.dentry_resolution_mode);

    ensure_environment().context("environment checks failed")?;

    if eff.paths_filtering && eff.paths.is_empty() {
        anyhow::bail!("paths filtering is activated but no path was provided");
    }

    bump_memlock_rlimit();

    let bpf_bytes = read_bpf_object()?;
    let mut bpf = EbpfLoader::new()
        .load(&bpf_bytes)
        .context("failed to load the fsprobe-ebpf object")?;

    match EbpfLogger::init(&mut bpf) {
        Ok(_logger) => info!("[fsprobe] BPF logger initialized"),
        Err(e) => warn!("[fsprobe] BPF logger not active: {e}"),
    }

    let monitor = Monitor::configure(
        eff.events.as_deref(),
        &eff.dentry_resolution_mode,
        eff.perf_buffer_size,
        eff.chan_size,
    )
    .context("failed to configure the monitor")?;

    let (sink_tx, mut sink_rx) = mpsc::channel(eff.chan_size);
    let (loss_tx, mut loss_rx) = mpsc::channel(eff.chan_size);

    monitor
        .start(&mut bpf, sink_tx, loss_tx)
        .await
        .context("failed to start the monitor")?;

    if !eff.paths.is_empty() {
        let seed_mode = if eff.recursive {
            SeedMode::Recursive
        } else {
            SeedMode::TopLevel
        };
        monitor
            .watch(&eff.paths, seed_mode, eff.follow)
            .await
            .context("failed to seed the watch set")?;
    }

    let mut writer = OutputWriter::new(&eff.format, eff.output.as_deref())
        .context("failed to open the output sink")?;

    let output_task = tokio::spawn(async move {
        let mut samples_open = true;
        let mut losses_open = true;
        while samples_open || losses_open {
            tokio::select! {
                resolved = sink_rx.recv(), if samples_open => {
                    match resolved {
                        Some(resolved) => {
                            let record = EventRecord::new(&resolved.raw, &resolved.paths);
                            if let Err(e) = writer.write(&record) {
                                warn!("[fsprobe] failed to write event: {e}");
                            }
                        }
                        None => samples_open = false,
                    }
                }
                loss = loss_rx.recv(), if losses_open => {
                    match loss {
                        Some(_loss) => {}
                        None => losses_open = false,
                    }
                }
            }
        }
    });

    info!("[fsprobe] running, press Ctrl+C to stop");
    wait_for_shutdown_signal().await;
    info!("[fsprobe] shutting down");

    monitor.stop().await;
    if let Err(e) = output_task.await {
        warn!("[fsprobe] output task panicked: {e}");
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("[fsprobe] failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
