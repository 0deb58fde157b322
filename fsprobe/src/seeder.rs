//! C7 — the watch-set seeder. Given root paths and a {TopLevel, Recursive}
//! flag, stat each path and feed every `(inode, path)` pair found to the
//! caller's sink (`Monitor::add_inode_filter`, §4.6). Individual entry
//! errors are logged and skipped; the whole operation only fails when a
//! supplied root itself cannot be stat'd.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use log::warn;
use walkdir::WalkDir;

use crate::error::FsProbeError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeedMode {
    TopLevel,
    Recursive,
}

/// Walks `roots` per `mode`, calling `on_inode(inode, path)` for the root
/// itself and every descendant found. `follow` controls whether a symlink
/// is descended into (§6's `--follow`, default true).
pub fn seed<F>(
    roots: &[impl AsRef<Path>],
    mode: SeedMode,
    follow: bool,
    mut on_inode: F,
) -> Result<(), FsProbeError>
where
    F: FnMut(u32, &str),
{
    for root in roots {
        let root = root.as_ref();
        let meta = std::fs::metadata(root).map_err(|e| {
            FsProbeError::Config(format!("stat {}: {e}", root.display()))
        })?;
        on_inode(meta.ino() as u32, &root.to_string_lossy());

        match mode {
            SeedMode::TopLevel => seed_top_level(root, follow, &mut on_inode),
            SeedMode::Recursive => seed_recursive(root, follow, &mut on_inode),
        }
    }
    Ok(())
}

fn seed_top_level(root: &Path, follow: bool, on_inode: &mut impl FnMut(u32, &str)) {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("failed to list {}: {e}", root.display());
            return;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to read a directory entry under {}: {e}", root.display());
                continue;
            }
        };
        let meta = if follow {
            std::fs::metadata(entry.path())
        } else {
            entry.metadata()
        };
        match meta {
            Ok(meta) => on_inode(meta.ino() as u32, &entry.path().to_string_lossy()),
            Err(e) => warn!("failed to stat {}: {e}", entry.path().display()),
        }
    }
}

fn seed_recursive(root: &Path, follow: bool, on_inode: &mut impl FnMut(u32, &str)) {
    let walker = WalkDir::new(root).follow_links(follow).min_depth(1);
    for entry in walker {
        match entry {
            Ok(entry) => match entry.metadata() {
                Ok(meta) => on_inode(meta.ino() as u32, &entry.path().to_string_lossy()),
                Err(e) => warn!("failed to stat {}: {e}", entry.path().display()),
            },
            Err(e) => warn!("walk error under {}: {e}", root.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn top_level_seeds_root_and_direct_children_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/file.txt"), b"x").unwrap();

        let mut seen = Vec::new();
        seed(&[dir.path()], SeedMode::TopLevel, true, |inode, path| {
            seen.push((inode, path.to_string()));
        })
        .unwrap();

        // root + "a" only; "a/b" and "a/file.txt" are one level too deep.
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().any(|(_, p)| p.ends_with('a')));
    }

    #[test]
    fn recursive_seeds_every_descendant() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/file.txt"), b"x").unwrap();

        let mut seen = Vec::new();
        seed(&[dir.path()], SeedMode::Recursive, true, |inode, path| {
            seen.push((inode, path.to_string()));
        })
        .unwrap();

        // root, "a", "a/b", "a/b/file.txt"
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn missing_root_fails_the_whole_operation() {
        let err = seed(
            &[Path::new("/nonexistent/does/not/exist")],
            SeedMode::TopLevel,
            true,
            |_, _| {},
        )
        .unwrap_err();
        assert!(matches!(err, FsProbeError::Config(_)));
    }

    #[test]
    fn unreadable_entry_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file.txt"), b"x").unwrap();

        let mut seen = Vec::new();
        let result = seed(&[dir.path()], SeedMode::TopLevel, true, |inode, path| {
            seen.push((inode, path.to_string()));
        });
        assert!(result.is_ok());
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn top_level_follow_resolves_symlinked_child_to_its_target_inode() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"x").unwrap();
        symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();
        let target_inode = fs::metadata(dir.path().join("real.txt")).unwrap().ino() as u32;

        let mut seen = Vec::new();
        seed(&[dir.path()], SeedMode::TopLevel, true, |inode, path| {
            seen.push((inode, path.to_string()));
        })
        .unwrap();

        let link_entry = seen.iter().find(|(_, p)| p.ends_with("link.txt")).unwrap();
        assert_eq!(link_entry.0, target_inode);
    }
}
