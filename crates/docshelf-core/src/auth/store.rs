//! Durable credential persistence.
//!
//! The store keeps three entries under one namespace directory: the access
//! token, the refresh token, and the JSON-serialized profile. It is pure
//! storage with no session policy, and it is the single source of truth
//! for authenticated-ness; no other component keeps a divergent copy.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::token;
use crate::models::Profile;

const ACCESS_TOKEN_FILE: &str = "access_token";
const REFRESH_TOKEN_FILE: &str = "refresh_token";
const PROFILE_FILE: &str = "profile.json";

/// Opaque bearer-token pair. Never interpreted beyond the access token's
/// embedded expiry claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

pub struct CredentialStore {
    /// Namespace directory. `None` when no storage backend is available;
    /// every operation then degrades to a safe no-op.
    dir: Option<PathBuf>,
}

impl CredentialStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir: Some(dir) }
    }

    /// A store with no backing storage: reads return `None`, writes do
    /// nothing, nothing ever errors.
    pub fn detached() -> Self {
        Self { dir: None }
    }

    fn read_entry(&self, name: &str) -> Option<String> {
        let path = self.dir.as_ref()?.join(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                debug!(entry = name, error = %e, "Failed to read credential entry");
                None
            }
        }
    }

    /// The stored token pair, if both halves are present.
    pub fn credential(&self) -> Option<Credential> {
        let access_token = self.read_entry(ACCESS_TOKEN_FILE)?;
        let refresh_token = self.read_entry(REFRESH_TOKEN_FILE)?;
        if access_token.is_empty() || refresh_token.is_empty() {
            return None;
        }
        Some(Credential {
            access_token,
            refresh_token,
        })
    }

    pub fn profile(&self) -> Option<Profile> {
        let contents = self.read_entry(PROFILE_FILE)?;
        match serde_json::from_str(&contents) {
            Ok(profile) => Some(profile),
            Err(e) => {
                debug!(error = %e, "Stored profile is not parseable");
                None
            }
        }
    }

    pub fn get(&self) -> (Option<Credential>, Option<Profile>) {
        (self.credential(), self.profile())
    }

    /// Replace the credential pair and profile as one unit: either all
    /// three entries are written, or the namespace is rolled back and the
    /// call fails.
    pub fn set_all(&self, credential: &Credential, profile: &Profile) -> Result<()> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        // Serialize before touching disk so a bad profile fails the call
        // without leaving a partial write behind.
        let profile_json =
            serde_json::to_string_pretty(profile).context("Failed to serialize profile")?;
        fs::create_dir_all(dir).context("Failed to create credential storage directory")?;

        let result = (|| -> Result<()> {
            fs::write(dir.join(ACCESS_TOKEN_FILE), &credential.access_token)
                .context("Failed to write access token")?;
            fs::write(dir.join(REFRESH_TOKEN_FILE), &credential.refresh_token)
                .context("Failed to write refresh token")?;
            fs::write(dir.join(PROFILE_FILE), &profile_json)
                .context("Failed to write profile")?;
            Ok(())
        })();

        if result.is_err() {
            // Roll back so no half-written pair survives a failed call.
            let _ = self.clear();
        }
        result
    }

    /// Update only the profile entry. The credential pair is not touched.
    pub fn set_profile(&self, profile: &Profile) -> Result<()> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        let profile_json =
            serde_json::to_string_pretty(profile).context("Failed to serialize profile")?;
        fs::create_dir_all(dir).context("Failed to create credential storage directory")?;
        fs::write(dir.join(PROFILE_FILE), profile_json).context("Failed to write profile")
    }

    /// Remove every entry in the namespace. Missing entries are not an
    /// error.
    pub fn clear(&self) -> Result<()> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        for name in [ACCESS_TOKEN_FILE, REFRESH_TOKEN_FILE, PROFILE_FILE] {
            match fs::remove_file(dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove entry: {name}"))
                }
            }
        }
        Ok(())
    }

    /// Credential and profile both present, and the access token not past
    /// its expiry claim.
    pub fn is_authenticated(&self) -> bool {
        match (self.credential(), self.profile()) {
            (Some(credential), Some(_)) => !token::is_token_expired(&credential.access_token),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::test_token;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_store(tag: &str) -> CredentialStore {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let dir = std::env::temp_dir().join(format!(
            "docshelf-store-{}-{}-{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = fs::remove_dir_all(&dir);
        CredentialStore::new(dir)
    }

    fn profile() -> Profile {
        Profile {
            id: "user-1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: "admin".to_string(),
            company_name: None,
        }
    }

    fn credential(access_token: String) -> Credential {
        Credential {
            access_token,
            refresh_token: "refresh-1".to_string(),
        }
    }

    #[test]
    fn test_set_all_roundtrip() {
        let store = temp_store("roundtrip");
        store
            .set_all(&credential(test_token(1800)), &profile())
            .expect("set_all should succeed");

        let (cred, prof) = store.get();
        assert_eq!(cred.expect("credential").refresh_token, "refresh-1");
        assert_eq!(prof.expect("profile").email, "ada@example.com");
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = temp_store("clear");
        store
            .set_all(&credential(test_token(1800)), &profile())
            .expect("set_all should succeed");
        store.clear().expect("clear should succeed");

        assert_eq!(store.get(), (None, None));
        assert!(!store.is_authenticated());

        // Clearing an already-empty namespace is fine.
        store.clear().expect("second clear should succeed");
    }

    #[test]
    fn test_set_profile_leaves_credential_untouched() {
        let store = temp_store("profile-only");
        store
            .set_all(&credential(test_token(1800)), &profile())
            .expect("set_all should succeed");

        let mut updated = profile();
        updated.name = "Ada Lovelace".to_string();
        store.set_profile(&updated).expect("set_profile");

        assert_eq!(store.profile().expect("profile").name, "Ada Lovelace");
        assert_eq!(store.credential().expect("credential").refresh_token, "refresh-1");
    }

    #[test]
    fn test_expired_token_is_not_authenticated() {
        let store = temp_store("expired");
        store
            .set_all(&credential(test_token(-60)), &profile())
            .expect("set_all should succeed");

        assert!(store.credential().is_some());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_partial_state_is_not_authenticated() {
        let store = temp_store("partial");
        store.set_profile(&profile()).expect("set_profile");
        assert!(!store.is_authenticated());
        assert!(store.credential().is_none());
    }

    #[test]
    fn test_detached_store_is_a_no_op() {
        let store = CredentialStore::detached();
        store
            .set_all(&credential(test_token(1800)), &profile())
            .expect("detached set_all is a no-op");
        store.set_profile(&profile()).expect("detached set_profile");
        store.clear().expect("detached clear");

        assert_eq!(store.get(), (None, None));
        assert!(!store.is_authenticated());
    }
}
