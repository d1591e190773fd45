use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::auth::AuthResult;
use crate::auth::responses::UserRecord;

/// Holder of the session token and the user it belongs to.
///
/// Implementations must be synchronous and cheap; the gateway reads the
/// token on every dispatch.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn user(&self) -> Option<UserRecord>;
    fn set_token(&self, token: &str) -> AuthResult<()>;
    fn set_user(&self, user: &UserRecord) -> AuthResult<()>;
    /// Writes both slots in a single operation.
    fn store_credential(&self, token: &str, user: &UserRecord) -> AuthResult<()>;
    /// Removes both slots together.
    fn clear_auth(&self) -> AuthResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CredentialSlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserRecord>,
}

impl CredentialSlots {
    fn is_empty(&self) -> bool {
        self.token.is_none() && self.user.is_none()
    }

    fn token(&self) -> Option<String> {
        self.token.clone().filter(|token| !token.is_empty())
    }
}

/// Credential store backed by a JSON document on disk, surviving restarts.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    slots: Mutex<CredentialSlots>,
}

impl FileCredentialStore {
    pub fn open(path: impl Into<PathBuf>) -> AuthResult<Self> {
        let path = path.into();
        let slots = read_slots(&path)?;
        Ok(Self {
            path,
            slots: Mutex::new(slots),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut CredentialSlots)) -> AuthResult<()> {
        let mut slots = self.slots.lock();
        let mut next = slots.clone();
        apply(&mut next);
        write_slots(&self.path, &next)?;
        *slots = next;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<String> {
        self.slots.lock().token()
    }

    fn user(&self) -> Option<UserRecord> {
        self.slots.lock().user.clone()
    }

    fn set_token(&self, token: &str) -> AuthResult<()> {
        self.update(|slots| slots.token = Some(token.to_string()))
    }

    fn set_user(&self, user: &UserRecord) -> AuthResult<()> {
        self.update(|slots| slots.user = Some(user.clone()))
    }

    fn store_credential(&self, token: &str, user: &UserRecord) -> AuthResult<()> {
        self.update(|slots| {
            slots.token = Some(token.to_string());
            slots.user = Some(user.clone());
        })
    }

    fn clear_auth(&self) -> AuthResult<()> {
        self.update(|slots| *slots = CredentialSlots::default())
    }
}

fn read_slots(path: &Path) -> AuthResult<CredentialSlots> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(CredentialSlots::default()),
        Err(err) => return Err(err.into()),
    };

    match serde_json::from_slice::<CredentialSlots>(&raw) {
        Ok(slots) => Ok(slots),
        Err(err) => {
            log::warn!(
                "ignoring unreadable credential file {}: {}",
                path.display(),
                err
            );
            Ok(CredentialSlots::default())
        }
    }
}

fn write_slots(path: &Path, slots: &CredentialSlots) -> AuthResult<()> {
    if slots.is_empty() {
        return match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        };
    }

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // Rename within the same directory so readers never see half a document.
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, slots)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// In-process credential store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slots: Mutex<CredentialSlots>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(token: &str, user: UserRecord) -> Self {
        Self {
            slots: Mutex::new(CredentialSlots {
                token: Some(token.to_string()),
                user: Some(user),
            }),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.slots.lock().token()
    }

    fn user(&self) -> Option<UserRecord> {
        self.slots.lock().user.clone()
    }

    fn set_token(&self, token: &str) -> AuthResult<()> {
        self.slots.lock().token = Some(token.to_string());
        Ok(())
    }

    fn set_user(&self, user: &UserRecord) -> AuthResult<()> {
        self.slots.lock().user = Some(user.clone());
        Ok(())
    }

    fn store_credential(&self, token: &str, user: &UserRecord) -> AuthResult<()> {
        let mut slots = self.slots.lock();
        slots.token = Some(token.to_string());
        slots.user = Some(user.clone());
        Ok(())
    }

    fn clear_auth(&self) -> AuthResult<()> {
        *self.slots.lock() = CredentialSlots::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::responses::Role;

    fn sample_user() -> UserRecord {
        UserRecord {
            id: "1".into(),
            email: "head@school.test".into(),
            role: Role::Admin,
            created_at: None,
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        store.set_token("tok-1").expect("set token");
        store.set_user(&sample_user()).expect("set user");

        assert_eq!(store.token().as_deref(), Some("tok-1"));
        assert_eq!(store.user(), Some(sample_user()));

        store.clear_auth().expect("clear");
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
    }

    #[test]
    fn empty_token_reads_as_absent() {
        let store = MemoryCredentialStore::new();
        store.set_token("").expect("set token");
        assert_eq!(store.token(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("credentials.json");

        let store = FileCredentialStore::open(&path).expect("open");
        assert_eq!(store.token(), None);
        store
            .store_credential("tok-2", &sample_user())
            .expect("store credential");
        drop(store);

        let reopened = FileCredentialStore::open(&path).expect("reopen");
        assert_eq!(reopened.token().as_deref(), Some("tok-2"));
        assert_eq!(reopened.user(), Some(sample_user()));

        let document: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
        assert_eq!(document["token"], "tok-2");
        assert_eq!(document["user"]["email"], "head@school.test");
    }

    #[test]
    fn file_store_clear_removes_both_slots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");

        let store = FileCredentialStore::open(&path).expect("open");
        store
            .store_credential("tok-3", &sample_user())
            .expect("store credential");
        store.clear_auth().expect("clear");

        assert!(!path.exists());
        let reopened = FileCredentialStore::open(&path).expect("reopen");
        assert_eq!(reopened.token(), None);
        assert_eq!(reopened.user(), None);

        // Clearing twice is harmless.
        reopened.clear_auth().expect("clear again");
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        fs::write(&path, b"{ not json").expect("write");

        let store = FileCredentialStore::open(&path).expect("open");
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
    }
}
