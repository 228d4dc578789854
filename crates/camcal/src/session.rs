//! Filesystem session store.
//!
//! A session is a directory `<root>/<id>/` holding the uploaded images under
//! `images/`, the record `session.json`, and any result artifacts written
//! beside it. Creation is all-or-nothing: if any copy or the record write
//! fails, the whole session directory is removed again.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const RECORD_FILE: &str = "session.json";
pub const IMAGES_DIR: &str = "images";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("session {0} has no images")]
    NoImages(String),
    #[error("no files to upload")]
    EmptyUpload,
    #[error("session {id}: {reason}; partial upload removed")]
    PartialWrite { id: String, reason: String },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SessionError + '_ {
    move |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Stored description of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub images_dir: PathBuf,
    /// Unix seconds.
    pub created_at: u64,
    /// Image file names inside `images_dir`.
    pub images: Vec<String>,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_err(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Path of a result file stored beside the session record.
    pub fn artifact_path(&self, id: &str, name: &str) -> PathBuf {
        self.session_dir(id).join(name)
    }

    /// Create a fresh session directory. Ids are the creation time in hex
    /// nanoseconds, bumped past any directory that already exists.
    fn claim_dir(&self) -> Result<(String, PathBuf), SessionError> {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        self.claim_dir_from(nanos)
    }

    fn claim_dir_from(&self, mut n: u128) -> Result<(String, PathBuf), SessionError> {
        loop {
            let id = format!("{n:x}");
            let dir = self.session_dir(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(io_err(&dir)(e)),
            }
        }
    }

    /// Copy `files` into a new session.
    pub fn create(&self, files: &[PathBuf]) -> Result<SessionRecord, SessionError> {
        if files.is_empty() {
            return Err(SessionError::EmptyUpload);
        }
        let (id, dir) = self.claim_dir()?;
        match self.populate(&id, &dir, files) {
            Ok(record) => {
                info!("session {id}: {} images", record.images.len());
                Ok(record)
            }
            Err(reason) => {
                if let Err(e) = fs::remove_dir_all(&dir) {
                    warn!("rollback of {} failed: {e}", dir.display());
                }
                Err(SessionError::PartialWrite { id, reason })
            }
        }
    }

    fn populate(&self, id: &str, dir: &Path, files: &[PathBuf]) -> Result<SessionRecord, String> {
        let images_dir = dir.join(IMAGES_DIR);
        fs::create_dir_all(&images_dir).map_err(|e| format!("{}: {e}", images_dir.display()))?;
        let mut images = Vec::with_capacity(files.len());
        let mut seen = HashSet::with_capacity(files.len());
        for src in files {
            let name = src
                .file_name()
                .ok_or_else(|| format!("{} has no file name", src.display()))?
                .to_string_lossy()
                .into_owned();
            if !seen.insert(name.clone()) {
                return Err(format!("duplicate file name {name}"));
            }
            fs::copy(src, images_dir.join(&name)).map_err(|e| format!("{}: {e}", src.display()))?;
            debug!("session {id}: stored {name}");
            images.push(name);
        }
        images.sort();
        let record = SessionRecord {
            id: id.to_string(),
            images_dir,
            created_at: unix_now(),
            images,
        };
        write_json(&dir.join(RECORD_FILE), &record).map_err(|e| e.to_string())?;
        Ok(record)
    }

    pub fn lookup(&self, id: &str) -> Result<SessionRecord, SessionError> {
        if !valid_id(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        let path = self.artifact_path(id, RECORD_FILE);
        if !path.is_file() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        read_json(&path)
    }

    /// Every readable session, oldest first.
    pub fn list(&self) -> Result<Vec<SessionRecord>, SessionError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err(&self.root))? {
            let entry = entry.map_err(io_err(&self.root))?;
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.lookup(&id) {
                Ok(record) => out.push(record),
                Err(SessionError::NotFound(_)) => {}
                Err(e) => warn!("skipping session {id}: {e}"),
            }
        }
        out.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(out)
    }

    /// Images directory of a session that holds at least one image.
    pub fn images_dir(&self, id: &str) -> Result<PathBuf, SessionError> {
        let record = self.lookup(id)?;
        if record.images.is_empty() {
            return Err(SessionError::NoImages(id.to_string()));
        }
        Ok(record.images_dir)
    }

    pub fn images(&self, id: &str) -> Result<Vec<PathBuf>, SessionError> {
        let record = self.lookup(id)?;
        if record.images.is_empty() {
            return Err(SessionError::NoImages(id.to_string()));
        }
        Ok(record.images.iter().map(|n| record.images_dir.join(n)).collect())
    }

    /// Remove a session with its images and artifacts.
    pub fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.lookup(id)?;
        let dir = self.session_dir(id);
        fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        info!("session {id} deleted");
        Ok(())
    }

    /// Delete sessions created at least `max_age` ago. Returns the count.
    pub fn cleanup_older_than(&self, max_age: Duration) -> Result<usize, SessionError> {
        let now = unix_now();
        let mut removed = 0;
        for record in self.list()? {
            if record.created_at.saturating_add(max_age.as_secs()) <= now {
                self.delete(&record.id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete directories under the root that have no session record.
    pub fn cleanup_orphans(&self) -> Result<usize, SessionError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root).map_err(io_err(&self.root))? {
            let path = entry.map_err(io_err(&self.root))?.path();
            if path.is_dir() && !path.join(RECORD_FILE).is_file() {
                fs::remove_dir_all(&path).map_err(io_err(&path))?;
                debug!("removed orphan {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Write (or replace) a JSON artifact of session `id`.
    pub fn put_artifact<T: Serialize>(&self, id: &str, name: &str, value: &T) -> Result<PathBuf, SessionError> {
        self.lookup(id)?;
        let path = self.artifact_path(id, name);
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn get_artifact<T: DeserializeOwned>(&self, id: &str, name: &str) -> Result<T, SessionError> {
        self.lookup(id)?;
        let path = self.artifact_path(id, name);
        if !path.is_file() {
            return Err(SessionError::NotFound(format!("{id}/{name}")));
        }
        read_json(&path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SessionError> {
    let file = File::create(path).map_err(io_err(path))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, value).map_err(|source| SessionError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    w.flush().map_err(io_err(path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SessionError> {
    let file = File::open(path).map_err(io_err(path))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| SessionError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploads(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|n| {
                let p = dir.join(n);
                fs::write(&p, n.as_bytes()).unwrap();
                p
            })
            .collect()
    }

    #[test]
    fn create_lookup_delete() {
        let root = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        let rec = store.create(&uploads(src.path(), &["b.png", "a.png"])).unwrap();
        assert_eq!(rec.images, ["a.png", "b.png"]);
        assert_eq!(store.lookup(&rec.id).unwrap(), rec);
        assert_eq!(store.images(&rec.id).unwrap().len(), 2);
        assert_eq!(store.list().unwrap().len(), 1);

        store.put_artifact(&rec.id, "x.json", &[1, 2, 3]).unwrap();
        let back: Vec<i32> = store.get_artifact(&rec.id, "x.json").unwrap();
        assert_eq!(back, [1, 2, 3]);

        store.delete(&rec.id).unwrap();
        assert!(matches!(store.lookup(&rec.id), Err(SessionError::NotFound(_))));
        assert!(!store.session_dir(&rec.id).exists());
    }

    #[test]
    fn failed_upload_leaves_nothing() {
        let root = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        let mut files = uploads(src.path(), &["a.png"]);
        files.push(src.path().join("missing.png"));
        let err = store.create(&files).unwrap_err();
        assert!(matches!(err, SessionError::PartialWrite { .. }));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
        assert!(matches!(store.create(&[]), Err(SessionError::EmptyUpload)));
    }

    #[test]
    fn duplicate_file_names_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        let mut files = uploads(a.path(), &["frame.png", "other.png"]);
        files.extend(uploads(b.path(), &["frame.png"]));
        let err = store.create(&files).unwrap_err();
        assert!(
            matches!(&err, SessionError::PartialWrite { reason, .. } if reason.contains("frame.png")),
            "{err}"
        );
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn claimed_ids_skip_existing_directories() {
        let root = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        fs::create_dir(root.path().join("ff")).unwrap();
        fs::create_dir(root.path().join("100")).unwrap();
        let (id, dir) = store.claim_dir_from(0xff).unwrap();
        assert_eq!(id, "101");
        assert!(dir.is_dir());
        let (next, _) = store.claim_dir_from(0xff).unwrap();
        assert_eq!(next, "102");
    }

    #[test]
    fn concurrent_creates_get_distinct_sessions() {
        let root = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        let files = uploads(src.path(), &["a.png"]);
        let ids: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| store.create(&files).unwrap().id)).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(store.list().unwrap().len(), ids.len());
    }

    #[test]
    fn rejects_path_like_ids() {
        let root = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        assert!(matches!(store.lookup("../etc"), Err(SessionError::NotFound(_))));
        assert!(matches!(store.lookup(""), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn cleanup_by_age_and_orphans() {
        let root = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        store.create(&uploads(src.path(), &["a.png"])).unwrap();
        fs::create_dir(root.path().join("stray")).unwrap();

        assert_eq!(store.cleanup_orphans().unwrap(), 1);
        assert_eq!(store.cleanup_older_than(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(store.cleanup_older_than(Duration::ZERO).unwrap(), 1);
        assert!(store.list().unwrap().is_empty());
    }
}
