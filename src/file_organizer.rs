/// Collision-safe file relocation.
///
/// This module moves a single file into a target directory without ever
/// overwriting an existing file. When `name.ext` is taken, the file is stored
/// as `name_1.ext`, `name_2.ext`, and so on.
///
/// The destination name is reserved by creating an empty file with
/// `create_new`, which fails atomically if another mover got there first. The
/// source is then renamed onto the reservation. If the rename crosses a device
/// boundary the content is copied into the reservation instead and the source
/// is removed afterwards. Every failure path removes the reservation, so no
/// empty or partial destination file is left behind and the source stays put.
use crate::error::{SortError, SortResult};
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Records where a file was moved from and to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// The path of the file before the move.
    pub original_path: PathBuf,
    /// The path of the file after the move.
    pub new_path: PathBuf,
}

/// Moves files into target directories.
pub struct Relocator;

impl Relocator {
    /// Moves `file_path` into `target_dir`, renaming it if the name is taken.
    ///
    /// The target directory must already exist (see
    /// [`PathPlanner::plan`](crate::path_planner::PathPlanner::plan)).
    ///
    /// # Returns
    ///
    /// Returns the recorded [`Relocation`] on success, or:
    ///
    /// * `SortError::SourceVanished` if the file is gone before or during the move
    /// * `SortError::MoveFailed` for any other failure; the source is left in place
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sortify::file_organizer::Relocator;
    /// use std::path::Path;
    ///
    /// match Relocator::relocate(Path::new("/dl/photo.png"), Path::new("/sorted/Images")) {
    ///     Ok(moved) => println!("Moved to {}", moved.new_path.display()),
    ///     Err(e) => eprintln!("Move failed: {}", e),
    /// }
    /// ```
    pub fn relocate(file_path: &Path, target_dir: &Path) -> SortResult<Relocation> {
        match fs::symlink_metadata(file_path) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SortError::SourceVanished {
                    path: file_path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(SortError::MoveFailed {
                    source_path: file_path.to_path_buf(),
                    destination: target_dir.to_path_buf(),
                    source: e,
                });
            }
        }

        let file_name = file_path
            .file_name()
            .ok_or_else(|| SortError::MoveFailed {
                source_path: file_path.to_path_buf(),
                destination: target_dir.to_path_buf(),
                source: io::Error::new(ErrorKind::InvalidInput, "file has no name component"),
            })?;

        let destination = Self::reserve_destination(target_dir, file_name).map_err(|e| {
            SortError::MoveFailed {
                source_path: file_path.to_path_buf(),
                destination: target_dir.join(file_name),
                source: e,
            }
        })?;

        if let Err(e) = Self::move_onto_reservation(file_path, &destination) {
            Self::release_reservation(&destination);
            return Err(if e.kind() == ErrorKind::NotFound && !file_path.exists() {
                SortError::SourceVanished {
                    path: file_path.to_path_buf(),
                }
            } else {
                SortError::MoveFailed {
                    source_path: file_path.to_path_buf(),
                    destination,
                    source: e,
                }
            });
        }

        info!(
            from = %file_path.display(),
            to = %destination.display(),
            "Moved file"
        );

        Ok(Relocation {
            original_path: file_path.to_path_buf(),
            new_path: destination,
        })
    }

    /// Builds the `n`-th candidate name: `photo.png`, `photo_1.png`, `photo_2.png`, ...
    pub fn candidate_name(file_name: &OsStr, n: u32) -> OsString {
        if n == 0 {
            return file_name.to_os_string();
        }

        let path = Path::new(file_name);
        let stem = path.file_stem().unwrap_or(file_name);
        let mut name = stem.to_os_string();
        name.push(format!("_{}", n));
        if let Some(ext) = path.extension() {
            name.push(".");
            name.push(ext);
        }
        name
    }

    /// Claims the first free candidate name in `target_dir` by creating it.
    fn reserve_destination(target_dir: &Path, file_name: &OsStr) -> io::Result<PathBuf> {
        for n in 0..=u32::MAX {
            let candidate = target_dir.join(Self::candidate_name(file_name, n));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(_) => {
                    if n > 0 {
                        debug!(path = %candidate.display(), "name taken, using disambiguated name");
                    }
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            ErrorKind::AlreadyExists,
            "no free destination name available",
        ))
    }

    /// Renames the source onto the reserved path, copying across devices.
    fn move_onto_reservation(source: &Path, reserved: &Path) -> io::Result<()> {
        match fs::rename(source, reserved) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                debug!(from = %source.display(), "rename crosses devices, copying instead");
                Self::copy_then_remove(source, reserved)
            }
            Err(e) => Err(e),
        }
    }

    /// Copies `source` into the reserved file, then removes the source.
    ///
    /// If the source cannot be removed after copying, the copy is discarded so
    /// the file still exists exactly once.
    fn copy_then_remove(source: &Path, reserved: &Path) -> io::Result<()> {
        {
            let mut reader = File::open(source)?;
            let mut writer = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(reserved)?;
            io::copy(&mut reader, &mut writer)?;
            writer.sync_all()?;
        }

        if let Ok(metadata) = fs::metadata(source)
            && let Err(e) = fs::set_permissions(reserved, metadata.permissions())
        {
            debug!(path = %reserved.display(), error = %e, "could not copy permissions");
        }

        fs::remove_file(source)
    }

    fn release_reservation(reserved: &Path) {
        if let Err(e) = fs::remove_file(reserved)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %reserved.display(), error = %e, "could not remove reserved destination");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_candidate_names() {
        let name = OsStr::new("photo.png");
        assert_eq!(Relocator::candidate_name(name, 0), OsString::from("photo.png"));
        assert_eq!(Relocator::candidate_name(name, 1), OsString::from("photo_1.png"));
        assert_eq!(Relocator::candidate_name(name, 12), OsString::from("photo_12.png"));
        assert_eq!(
            Relocator::candidate_name(OsStr::new("backup.tar.gz"), 1),
            OsString::from("backup.tar_1.gz")
        );
        assert_eq!(
            Relocator::candidate_name(OsStr::new("README"), 2),
            OsString::from("README_2")
        );
        assert_eq!(
            Relocator::candidate_name(OsStr::new(".env"), 1),
            OsString::from(".env_1")
        );
    }

    #[test]
    fn test_relocate_moves_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target_dir = temp_dir.path().join("target");
        fs::create_dir(&target_dir).expect("Failed to create target directory");

        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, "test content").expect("Failed to write test file");

        let moved = Relocator::relocate(&file_path, &target_dir).expect("Failed to move file");

        assert!(!file_path.exists());
        assert_eq!(moved.new_path, target_dir.join("test.txt"));
        assert_eq!(
            fs::read_to_string(&moved.new_path).expect("read moved"),
            "test content"
        );
    }

    #[test]
    fn test_relocate_never_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target_dir = temp_dir.path().join("target");
        fs::create_dir(&target_dir).expect("Failed to create target directory");
        fs::write(target_dir.join("photo.png"), "first").expect("Failed to write existing");

        let incoming = temp_dir.path().join("photo.png");
        fs::write(&incoming, "second").expect("Failed to write incoming");

        let moved = Relocator::relocate(&incoming, &target_dir).expect("Failed to move file");

        assert_eq!(moved.new_path, target_dir.join("photo_1.png"));
        assert_eq!(
            fs::read_to_string(target_dir.join("photo.png")).expect("read original"),
            "first"
        );
        assert_eq!(
            fs::read_to_string(target_dir.join("photo_1.png")).expect("read renamed"),
            "second"
        );
    }

    #[test]
    fn test_relocate_skips_taken_suffixes() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target_dir = temp_dir.path().join("target");
        fs::create_dir(&target_dir).expect("Failed to create target directory");
        fs::write(target_dir.join("a.txt"), "0").expect("write");
        fs::write(target_dir.join("a_1.txt"), "1").expect("write");
        fs::create_dir(target_dir.join("a_2.txt")).expect("mkdir");

        let incoming = temp_dir.path().join("a.txt");
        fs::write(&incoming, "3").expect("write");

        let moved = Relocator::relocate(&incoming, &target_dir).expect("Failed to move file");
        assert_eq!(moved.new_path, target_dir.join("a_3.txt"));
    }

    #[test]
    fn test_relocate_missing_source_is_skip() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let result = Relocator::relocate(&temp_dir.path().join("gone.txt"), temp_dir.path());
        assert!(matches!(result, Err(SortError::SourceVanished { .. })));
    }

    #[test]
    fn test_failed_move_leaves_source_and_no_reservation() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, "keep me").expect("Failed to write test file");

        let missing_target = temp_dir.path().join("does-not-exist");
        let result = Relocator::relocate(&file_path, &missing_target);

        assert!(matches!(result, Err(SortError::MoveFailed { .. })));
        assert!(file_path.exists());
        assert!(!missing_target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_move_failure_after_reserving_releases_reservation() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target_dir = temp_dir.path().join("target");
        fs::create_dir(&target_dir).expect("Failed to create target directory");

        // A directory gets a reservation but cannot be renamed onto a file.
        let source = temp_dir.path().join("album.zip");
        fs::create_dir(&source).expect("Failed to create source directory");
        fs::write(source.join("inner.txt"), "keep me").expect("write inner");

        let result = Relocator::relocate(&source, &target_dir);

        match result {
            Err(SortError::MoveFailed { destination, .. }) => {
                assert_eq!(destination, target_dir.join("album.zip"));
            }
            other => panic!("expected MoveFailed, got {:?}", other),
        }
        assert!(!target_dir.join("album.zip").exists());
        assert_eq!(fs::read_dir(&target_dir).expect("read target").count(), 0);
        assert_eq!(
            fs::read_to_string(source.join("inner.txt")).expect("read inner"),
            "keep me"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_failure_keeps_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("unreadable");
        let reserved = temp_dir.path().join("reserved.bin");
        fs::create_dir(&source).expect("Failed to create source directory");
        fs::write(&reserved, "").expect("write reservation");

        assert!(Relocator::copy_then_remove(&source, &reserved).is_err());
        assert!(source.is_dir());
    }

    #[test]
    fn test_copy_then_remove_moves_content() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("big.bin");
        let reserved = temp_dir.path().join("reserved.bin");
        fs::write(&source, vec![7u8; 64 * 1024]).expect("write source");
        fs::write(&reserved, "").expect("write reservation");

        Relocator::copy_then_remove(&source, &reserved).expect("copy");

        assert!(!source.exists());
        assert_eq!(fs::read(&reserved).expect("read").len(), 64 * 1024);
    }

    #[test]
    fn test_concurrent_relocations_keep_every_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target_dir = temp_dir.path().join("target");
        fs::create_dir(&target_dir).expect("Failed to create target directory");

        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let source_dir = temp_dir.path().join(format!("src{}", i));
                fs::create_dir(&source_dir).expect("mkdir");
                let file = source_dir.join("same.txt");
                fs::write(&file, format!("payload {}", i)).expect("write");

                let target_dir = target_dir.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    Relocator::relocate(&file, &target_dir).expect("relocate")
                })
            })
            .collect();

        let mut destinations: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("join").new_path)
            .collect();
        destinations.sort();
        destinations.dedup();

        assert_eq!(destinations.len(), workers);
        assert_eq!(fs::read_dir(&target_dir).expect("read_dir").count(), workers);
    }
}
