use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use {
    airbot_protocol::{SessionState, SessionUpdate},
    async_trait::async_trait,
    fd_lock::RwLock,
    tracing::{debug, warn},
};

use crate::error::{Context, Error, Result};

const CREDS_FILE: &str = "creds.json";
const LOCK_FILE: &str = ".lock";
const TMP_SUFFIX: &str = ".tmp";

/// Durable storage for the credential bundle.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the persisted state; an empty state when nothing is stored yet.
    async fn load(&self) -> Result<SessionState>;

    /// Persist a credential rotation. Applying the same update twice leaves
    /// the store unchanged.
    async fn save(&self, update: &SessionUpdate) -> Result<()>;

    /// Remove all persisted state.
    async fn delete(&self) -> Result<()>;
}

/// Multi-file session directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode a key name into a path-safe file stem.
    ///
    /// Only `%`, `/`, `\` and `:` are escaped so names stay readable.
    pub fn key_to_filename(name: &str) -> String {
        let mut out = String::with_capacity(name.len());
        for c in name.chars() {
            match c {
                '%' => out.push_str("%25"),
                '/' => out.push_str("%2F"),
                '\\' => out.push_str("%5C"),
                ':' => out.push_str("%3A"),
                c => out.push(c),
            }
        }
        out
    }

    /// Inverse of [`Self::key_to_filename`].
    pub fn filename_to_key(stem: &str) -> String {
        stem.replace("%3A", ":")
            .replace("%5C", "\\")
            .replace("%2F", "/")
            .replace("%25", "%")
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<SessionState> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || load_dir(&dir)).await?
    }

    async fn save(&self, update: &SessionUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let dir = self.dir.clone();
        let update = update.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
            let lock_file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(dir.join(LOCK_FILE))?;
            let mut lock = RwLock::new(lock_file);
            let _guard = lock
                .write()
                .map_err(|e| Error::locked(&dir, e.to_string()))?;

            if let Some(creds) = &update.creds {
                write_atomic(&dir.join(CREDS_FILE), &serde_json::to_vec(creds)?)?;
            }
            for (name, value) in &update.keys {
                let path = key_path(&dir, name);
                match value {
                    Some(value) => write_atomic(&path, &serde_json::to_vec(value)?)?,
                    None => match fs::remove_file(&path) {
                        Ok(()) => {},
                        Err(e) if e.kind() == ErrorKind::NotFound => {},
                        Err(e) => return Err(e.into()),
                    },
                }
            }
            debug!(
                dir = %dir.display(),
                creds = update.creds.is_some(),
                keys = update.keys.len(),
                "session saved"
            );
            Ok(())
        })
        .await?
    }

    async fn delete(&self) -> Result<()> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            match fs::remove_dir_all(&dir) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}

fn key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", FileSessionStore::key_to_filename(name)))
}

fn load_dir(dir: &Path) -> Result<SessionState> {
    let mut state = SessionState::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(state),
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(stem) = file_name.strip_suffix(".json") else {
            continue;
        };
        let path = entry.path();
        let parsed = fs::read(&path)
            .map_err(Error::from)
            .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).map_err(Error::from));
        let value = match parsed {
            Ok(value) => value,
            Err(e) => {
                // Left on disk; the next rotation overwrites it.
                warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                continue;
            },
        };
        if file_name == CREDS_FILE {
            state.creds = value;
        } else {
            state
                .keys
                .insert(FileSessionStore::filename_to_key(stem), value);
        }
    }
    Ok(state)
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp_name);

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, std::collections::BTreeMap};

    fn temp_store() -> (FileSessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session"));
        (store, dir)
    }

    fn rotation() -> SessionUpdate {
        SessionUpdate {
            creds: Some(json!({"registered": true, "me": {"id": "628123:4@s.whatsapp.net"}})),
            keys: BTreeMap::from([
                ("pre-key-1".to_string(), Some(json!({"public": "abc"}))),
                (
                    "sender-key-120363@g.us::628123::0".to_string(),
                    Some(json!({"chain": 1})),
                ),
            ]),
        }
    }

    #[tokio::test]
    async fn test_load_missing_dir_is_empty() {
        let (store, _dir) = temp_store();
        let state = store.load().await.unwrap();
        assert!(state.creds.is_null());
        assert!(state.keys.is_empty());
        assert!(!state.is_registered());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _dir) = temp_store();
        store.save(&rotation()).await.unwrap();

        let state = store.load().await.unwrap();
        assert!(state.is_registered());
        assert_eq!(state.keys.len(), 2);
        assert_eq!(state.keys["pre-key-1"]["public"], "abc");
        assert!(state.keys.contains_key("sender-key-120363@g.us::628123::0"));
        assert!(!store.dir().join("creds.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let (store, _dir) = temp_store();
        store.save(&rotation()).await.unwrap();
        let first = store.load().await.unwrap();
        store.save(&rotation()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_save_removes_deleted_keys() {
        let (store, _dir) = temp_store();
        store.save(&rotation()).await.unwrap();
        store
            .save(&SessionUpdate {
                creds: None,
                keys: BTreeMap::from([("pre-key-1".to_string(), None)]),
            })
            .await
            .unwrap();

        let state = store.load().await.unwrap();
        assert!(state.is_registered());
        assert!(!state.keys.contains_key("pre-key-1"));
        assert_eq!(state.keys.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let (store, _dir) = temp_store();
        store
            .save(&SessionUpdate {
                creds: None,
                keys: BTreeMap::from([("pre-key-9".to_string(), None)]),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_directory() {
        let (store, _dir) = temp_store();
        store.save(&rotation()).await.unwrap();
        store.delete().await.unwrap();
        assert!(!store.dir().exists());
        // Deleting twice is fine.
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_creds_are_skipped_and_kept() {
        let (store, _dir) = temp_store();
        store.save(&rotation()).await.unwrap();
        fs::write(store.dir().join("creds.json"), b"{not json").unwrap();

        let state = store.load().await.unwrap();
        assert!(state.creds.is_null());
        assert_eq!(state.keys.len(), 2);
        assert!(store.dir().join("creds.json").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _dir) = temp_store();
        store.save(&rotation()).await.unwrap();
        let mode = fs::metadata(store.dir().join("creds.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_key_filename_round_trip() {
        let name = "session-628123:4@s.whatsapp.net/x%y";
        let file = FileSessionStore::key_to_filename(name);
        assert!(!file.contains('/'));
        assert!(!file.contains(':'));
        assert_eq!(FileSessionStore::filename_to_key(&file), name);
    }
}
