//! `fsprobe` — userspace consumer for the VFS activity notifier: decodes
//! perf-ring records (C1), resolves dentry paths under one of three
//! interchangeable strategies (C4), maintains the kernel-visible watch set
//! (C3, C7), and dispatches resolved events to an output sink (C6, C8).

pub mod cli;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod errno;
pub mod error;
pub mod filter;
pub mod flags;
pub mod kmap;
pub mod monitor;
pub mod output;
pub mod path;
pub mod perf;
pub mod resolver;
pub mod seeder;

pub use config::Config;
pub use error::FsProbeError;
pub use monitor::Monitor;
pub use resolver::Resolver;
