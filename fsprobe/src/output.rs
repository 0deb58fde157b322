//! Output formatters: a `--format {table|json|none}` switch between a
//! fixed-width table writer, a `serde_json` writer, and a no-op writer,
//! with `--output <path>` redirecting either of the first two to a file
//! instead of stdout.

use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use serde::Serialize;

use crate::codec::RawEvent;
use crate::flags::{open_flags_to_string, setattr_flags_to_string};
use crate::resolver::ResolvedPaths;
use crate::{codec::EventKind, errno};

/// One event plus its resolved path(s), the shape every formatter consumes.
#[derive(Debug, Serialize)]
pub struct EventRecord {
    pub event_type: String,
    pub timestamp_ns: u64,
    pub pid: u32,
    pub tid: u32,
    pub uid: u32,
    pub gid: u32,
    pub comm: String,
    pub tty: String,
    pub retval: i32,
    pub retval_str: String,
    pub mode: String,
    pub flags: String,
    pub src_inode: u64,
    pub target_inode: u64,
    pub src_filename: String,
    pub target_filename: Option<String>,
}

impl EventRecord {
    pub fn new(raw: &RawEvent, paths: &ResolvedPaths) -> Self {
        let mode = match raw.event_type {
            EventKind::Open | EventKind::SetAttr => format!("{:o}", raw.mode),
            _ => raw.mode.to_string(),
        };
        let flags = match raw.event_type {
            EventKind::Open => open_flags_to_string(raw.flags),
            EventKind::SetAttr => setattr_flags_to_string(raw.flags),
            _ => raw.flags.to_string(),
        };
        EventRecord {
            event_type: raw.event_type.name().to_string(),
            timestamp_ns: raw.timestamp_ns,
            pid: raw.pid,
            tid: raw.tid,
            uid: raw.uid,
            gid: raw.gid,
            comm: raw.comm_str(),
            tty: raw.tty_str(),
            retval: raw.retval,
            retval_str: errno::describe(raw.retval),
            mode,
            flags,
            src_inode: raw.src_inode,
            target_inode: raw.target_inode,
            src_filename: paths.src.clone(),
            target_filename: paths.target.clone(),
        }
    }

    /// `"src -> dst"` when a target was resolved, else just `src`.
    pub fn print_filenames(&self) -> String {
        match &self.target_filename {
            Some(t) => format!("{} -> {}", self.src_filename, t),
            None => self.src_filename.clone(),
        }
    }
}

const TABLE_HEADER: [&str; 12] = [
    "EVT", "TS", "PID", "TID", "UID", "GID", "CMD", "TTY", "INODE", "RET", "MODE", "FLAG",
];

enum Sink {
    Stdout(Stdout),
    File(BufWriter<File>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Stdout(w) => w.write(buf),
            Sink::File(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Stdout(w) => w.flush(),
            Sink::File(w) => w.flush(),
        }
    }
}

fn open_sink(path: Option<&Path>) -> io::Result<Sink> {
    match path {
        Some(p) => Ok(Sink::File(BufWriter::new(File::create(p)?))),
        None => Ok(Sink::Stdout(io::stdout())),
    }
}

/// The three interchangeable writers behind `--format`.
pub enum OutputWriter {
    Table(Sink),
    Json(Sink),
    None,
}

impl OutputWriter {
    pub fn new(format: &str, path: Option<&Path>) -> Result<Self, io::Error> {
        match format {
            "json" => Ok(OutputWriter::Json(open_sink(path)?)),
            "none" => Ok(OutputWriter::None),
            _ => {
                let mut sink = open_sink(path)?;
                write_table_header(&mut sink)?;
                Ok(OutputWriter::Table(sink))
            }
        }
    }

    pub fn write(&mut self, record: &EventRecord) -> io::Result<()> {
        match self {
            OutputWriter::Table(sink) => write_table_row(sink, record),
            OutputWriter::Json(sink) => {
                serde_json::to_writer(&mut *sink, record)?;
                writeln!(sink)
            }
            OutputWriter::None => Ok(()),
        }
    }
}

fn write_table_header(sink: &mut Sink) -> io::Result<()> {
    writeln!(
        sink,
        "{:>7} {:>14} {:>6} {:>6} {:>6} {:>6} {:>16} {:>8} {:>10} {:>8} {:>6} {:>16} PATH",
        TABLE_HEADER[0],
        TABLE_HEADER[1],
        TABLE_HEADER[2],
        TABLE_HEADER[3],
        TABLE_HEADER[4],
        TABLE_HEADER[5],
        TABLE_HEADER[6],
        TABLE_HEADER[7],
        TABLE_HEADER[8],
        TABLE_HEADER[9],
        TABLE_HEADER[10],
        TABLE_HEADER[11],
    )
}

fn write_table_row(sink: &mut Sink, record: &EventRecord) -> io::Result<()> {
    writeln!(
        sink,
        "{:>7} {:>14} {:>6} {:>6} {:>6} {:>6} {:>16} {:>8} {:>10} {:>8} {:>6} {:>16} {}",
        record.event_type,
        record.timestamp_ns,
        record.pid,
        record.tid,
        record.uid,
        record.gid,
        record.comm,
        record.tty,
        record.src_inode,
        record.retval_str,
        record.mode,
        record.flags,
        record.print_filenames(),
    )
}
