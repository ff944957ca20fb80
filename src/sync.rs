//! Build-scoped backups of workspace descriptors.
//!
//! The workspace may live on another machine and may disappear before the
//! build record does, so every build keeps its own copy of each module
//! descriptor. A copy is refreshed only when the workspace file is strictly
//! newer than the backup, the modification time being the sole staleness
//! signal. Both machines are expected to have reasonably synchronized clocks.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::error::SyncError;

/// Cooperative cancellation shared between the publisher and the copies it
/// starts. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a descriptor living in a (possibly remote) workspace.
pub trait RemoteFile: Send + Sync {
    /// Location used in diagnostics.
    fn location(&self) -> &Utf8Path;

    /// Last modification time, `None` when the file can't be statted.
    fn modified(&self) -> Option<SystemTime>;

    /// Streams the whole file into `out`. Cancellation surfaces as an error
    /// of kind [`io::ErrorKind::Interrupted`].
    fn copy_into(&self, out: &mut dyn Write) -> io::Result<u64>;
}

/// Workspace file reachable through the local file system.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: Utf8PathBuf,
    cancel: Option<Cancellation>,
}

impl LocalFile {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Cancellation) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn check(&self) -> io::Result<()> {
        match &self.cancel {
            Some(cancel) if cancel.is_cancelled() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                format!("copy of {} cancelled", self.path),
            )),
            _ => Ok(()),
        }
    }
}

impl RemoteFile for LocalFile {
    fn location(&self) -> &Utf8Path {
        &self.path
    }

    fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
            .filter(|time| *time != SystemTime::UNIX_EPOCH)
    }

    fn copy_into(&self, out: &mut dyn Write) -> io::Result<u64> {
        let mut file = File::open(&self.path)?;
        let mut buffer = [0u8; 8192];
        let mut total = 0;

        loop {
            self.check()?;
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            out.write_all(&buffer[..read])?;
            total += read as u64;
        }

        Ok(total)
    }
}

/// Modification time of the backup, `None` when there is no backup yet.
fn local_modified(path: &Utf8Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Copies `source` over `target` if, and only if, the source was modified
/// after the target. Returns whether a copy happened.
///
/// A missing `source` means the workspace can't be reached, in which case
/// the existing backup stays authoritative. The copy goes through a sibling
/// temporary file, so `target` is either the old or the complete new file.
/// After copying, `target` carries the modification time of `source`, which
/// makes repeated calls no-ops until the source changes again.
pub fn sync_if_newer(source: Option<&dyn RemoteFile>, target: &Utf8Path) -> Result<bool, SyncError> {
    let Some(source) = source else {
        debug!(backup = %target, "workspace unavailable, keeping the existing backup");
        return Ok(false);
    };

    let remote = source
        .modified()
        .ok_or_else(|| SyncError::SourceNotStatable(source.location().to_owned()))?;

    if local_modified(target).is_some_and(|local| remote <= local) {
        return Ok(false);
    }

    if let Some(dir) = target.parent().filter(|dir| !dir.as_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| SyncError::Target(target.to_owned(), e))?;
    }

    let partial = Utf8PathBuf::from(format!("{target}.part"));
    let mut file = File::create(&partial).map_err(|e| SyncError::Target(target.to_owned(), e))?;

    if let Err(e) = source.copy_into(&mut file) {
        drop(file);
        let _ = fs::remove_file(&partial);

        return Err(match e.kind() {
            io::ErrorKind::Interrupted => SyncError::Interrupted(source.location().to_owned()),
            _ => SyncError::Source(source.location().to_owned(), e),
        });
    }

    let finish = file.flush().and_then(|_| file.set_modified(remote));
    drop(file);
    let finish = finish.and_then(|_| fs::rename(&partial, target));

    if let Err(e) = finish {
        let _ = fs::remove_file(&partial);
        return Err(SyncError::Target(target.to_owned(), e));
    }

    info!(source = %source.location(), backup = %target, "copied the workspace descriptor to backup");

    Ok(true)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;

    pub(crate) fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    pub(crate) fn write_at(path: &Utf8Path, text: &str, secs: u64) {
        fs::write(path, text).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(at(secs))
            .unwrap();
    }

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    struct Unstatable;

    impl RemoteFile for Unstatable {
        fn location(&self) -> &Utf8Path {
            Utf8Path::new("ws/ivy.xml")
        }

        fn modified(&self) -> Option<SystemTime> {
            None
        }

        fn copy_into(&self, _: &mut dyn Write) -> io::Result<u64> {
            unreachable!()
        }
    }

    #[test]
    fn test_copies_when_backup_missing() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let source = root.join("ivy.xml");
        let target = root.join("build").join("a$b$ivy.xml");
        write_at(&source, "<ivy-module/>", 1_700_000_000);

        let copied = sync_if_newer(Some(&LocalFile::new(&source)), &target).unwrap();

        assert!(copied);
        assert_eq!(fs::read_to_string(&target).unwrap(), "<ivy-module/>");
        assert_eq!(local_modified(&target), Some(at(1_700_000_000)));
        assert!(!Utf8PathBuf::from(format!("{target}.part")).exists());
    }

    #[test]
    fn test_second_sync_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let source = root.join("ivy.xml");
        let target = root.join("backup.xml");
        write_at(&source, "one", 1_700_000_000);

        let file = LocalFile::new(&source);
        assert!(sync_if_newer(Some(&file), &target).unwrap());
        assert!(!sync_if_newer(Some(&file), &target).unwrap());

        write_at(&source, "two", 1_700_000_100);
        assert!(sync_if_newer(Some(&file), &target).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "two");
    }

    #[test]
    fn test_older_source_is_not_copied() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let source = root.join("ivy.xml");
        let target = root.join("backup.xml");
        write_at(&source, "old", 1_600_000_000);
        write_at(&target, "kept", 1_700_000_000);

        assert!(!sync_if_newer(Some(&LocalFile::new(&source)), &target).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "kept");

        // equal times are not newer either
        write_at(&source, "same", 1_700_000_000);
        assert!(!sync_if_newer(Some(&LocalFile::new(&source)), &target).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "kept");
    }

    #[test]
    fn test_missing_workspace_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = utf8(&dir).join("backup.xml");
        write_at(&target, "kept", 1_700_000_000);

        assert!(!sync_if_newer(None, &target).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "kept");
    }

    #[test]
    fn test_unstatable_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = utf8(&dir).join("backup.xml");

        let err = sync_if_newer(Some(&Unstatable), &target).unwrap_err();
        assert!(matches!(err, SyncError::SourceNotStatable(_)));
        assert!(!err.is_fatal());

        let missing = LocalFile::new(utf8(&dir).join("nope.xml"));
        let err = sync_if_newer(Some(&missing), &target).unwrap_err();
        assert!(matches!(err, SyncError::SourceNotStatable(_)));
    }

    #[test]
    fn test_interrupted_copy_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let source = root.join("ivy.xml");
        let target = root.join("backup.xml");
        write_at(&source, "new", 1_700_000_100);
        write_at(&target, "kept", 1_700_000_000);

        let cancel = Cancellation::new();
        cancel.cancel();
        let file = LocalFile::new(&source).with_cancel(cancel);

        let err = sync_if_newer(Some(&file), &target).unwrap_err();
        assert!(matches!(err, SyncError::Interrupted(_)));
        assert_eq!(fs::read_to_string(&target).unwrap(), "kept");
        assert!(!Utf8PathBuf::from(format!("{target}.part")).exists());
    }

    #[test]
    fn test_unwritable_target_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let source = root.join("ivy.xml");
        let blocker = root.join("file");
        write_at(&source, "x", 1_700_000_000);
        fs::write(&blocker, "not a directory").unwrap();

        let err = sync_if_newer(Some(&LocalFile::new(&source)), &blocker.join("backup.xml"))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
