//! Provisioning profile installation.
//!
//! A `.mobileprovision` file is a signed blob with an embedded plist;
//! the metadata needed here (UUID, name, application identifier
//! prefixes) is extracted textually from that plist. The OS profile
//! directory is the source of truth for installation state; the lane
//! holds a [`ProvisioningProfile`] handle only for the duration of one
//! stage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Errors loading or installing profiles.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("cannot read profile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("profile {path} is malformed: {what}")]
    Malformed { path: PathBuf, what: String },

    #[error("profile store error: {0}")]
    Store(#[from] io::Error),
}

/// An installable provisioning profile.
#[derive(Debug, Clone)]
pub struct ProvisioningProfile {
    /// File the profile was loaded from.
    pub path: PathBuf,
    pub uuid: Uuid,
    pub name: Option<String>,
    /// Application identifier prefixes the profile grants.
    pub identifiers: Vec<String>,
    /// Whether this handle points at an installed copy.
    pub installed: bool,
}

impl ProvisioningProfile {
    /// Load profile metadata from a profile file.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let bytes = fs::read(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        // The plist is embedded in a signed binary wrapper; scan the
        // bytes as lossy text.
        let text = String::from_utf8_lossy(&bytes);

        let uuid_raw = plist_string(&text, "UUID").ok_or_else(|| ProfileError::Malformed {
            path: path.to_path_buf(),
            what: "no UUID entry".to_string(),
        })?;
        let uuid = Uuid::parse_str(&uuid_raw).map_err(|_| ProfileError::Malformed {
            path: path.to_path_buf(),
            what: format!("invalid UUID {uuid_raw:?}"),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            uuid,
            name: plist_string(&text, "Name"),
            identifiers: plist_string_array(&text, "ApplicationIdentifierPrefix"),
            installed: false,
        })
    }

    /// True when `other` would collide with this profile in the
    /// installed store: same identifier set and same UUID.
    pub fn collides_with(&self, other: &ProvisioningProfile) -> bool {
        if self.uuid != other.uuid {
            return false;
        }
        let mut mine: Vec<&str> = self.identifiers.iter().map(String::as_str).collect();
        let mut theirs: Vec<&str> = other.identifiers.iter().map(String::as_str).collect();
        mine.sort_unstable();
        theirs.sort_unstable();
        mine == theirs
    }
}

fn plist_string(text: &str, key: &str) -> Option<String> {
    let pattern = format!(r"(?s)<key>{key}</key>\s*<string>([^<]*)</string>");
    let re = Regex::new(&pattern).ok()?;
    re.captures(text).map(|caps| caps[1].to_string())
}

fn plist_string_array(text: &str, key: &str) -> Vec<String> {
    let section = format!(r"(?s)<key>{key}</key>\s*<array>(.*?)</array>");
    let Ok(section_re) = Regex::new(&section) else {
        return Vec::new();
    };
    let Some(caps) = section_re.captures(text) else {
        return Vec::new();
    };
    let body = &caps[1];
    let item_re = Regex::new(r"<string>([^<]*)</string>").expect("fixed pattern");
    item_re
        .captures_iter(body)
        .map(|c| c[1].to_string())
        .collect()
}

/// The OS directory holding installed provisioning profiles.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    /// The per-user system store.
    pub fn system() -> io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME is not set"))?;
        Ok(Self::at(
            PathBuf::from(home).join("Library/MobileDevice/Provisioning Profiles"),
        ))
    }

    /// A store rooted at an explicit directory; used by tests.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn installed_path(&self, profile: &ProvisioningProfile) -> PathBuf {
        self.root.join(format!("{}.mobileprovision", profile.uuid))
    }

    /// All parseable profiles currently installed. Unparseable files
    /// are skipped; they cannot collide on UUID + identifiers.
    pub fn installed(&self) -> Result<Vec<ProvisioningProfile>, ProfileError> {
        let mut profiles = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(profiles),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|e| e == "mobileprovision") != Some(true) {
                continue;
            }
            if let Ok(mut profile) = ProvisioningProfile::load(&path) {
                profile.installed = true;
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }

    /// Install a profile, first uninstalling any installed profile that
    /// shares its identifier set and UUID. Profiles that do not collide
    /// are left untouched.
    pub fn install(&self, profile: &mut ProvisioningProfile) -> Result<(), ProfileError> {
        for existing in self.installed()? {
            if existing.collides_with(profile) {
                info!(uuid = %existing.uuid, "removing colliding installed profile");
                self.uninstall(&existing)?;
                // At most one file per UUID can exist in the store.
                break;
            }
        }

        fs::create_dir_all(&self.root)?;
        fs::copy(&profile.path, self.installed_path(profile))?;
        profile.installed = true;
        Ok(())
    }

    /// Remove a profile from the store.
    pub fn uninstall(&self, profile: &ProvisioningProfile) -> Result<(), ProfileError> {
        fs::remove_file(self.installed_path(profile))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID_A: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";
    const UUID_B: &str = "11111111-2222-3333-4444-555555555555";

    fn profile_text(uuid: &str, name: &str, prefixes: &[&str]) -> String {
        let items: String = prefixes
            .iter()
            .map(|p| format!("<string>{p}</string>"))
            .collect();
        format!(
            "garbage-signature-bytes<?xml version=\"1.0\"?><plist><dict>\
             <key>Name</key><string>{name}</string>\
             <key>ApplicationIdentifierPrefix</key><array>{items}</array>\
             <key>UUID</key><string>{uuid}</string>\
             </dict></plist>more-garbage"
        )
    }

    fn write_profile(dir: &Path, file: &str, uuid: &str, prefixes: &[&str]) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, profile_text(uuid, "Demo AdHoc", prefixes)).unwrap();
        path
    }

    #[test]
    fn loads_metadata_from_embedded_plist() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_profile(dir.path(), "demo.mobileprovision", UUID_A, &["ABC123", "XYZ789"]);

        let profile = ProvisioningProfile::load(&path).unwrap();
        assert_eq!(profile.uuid, Uuid::parse_str(UUID_A).unwrap());
        assert_eq!(profile.name.as_deref(), Some("Demo AdHoc"));
        assert_eq!(profile.identifiers, ["ABC123", "XYZ789"]);
        assert!(!profile.installed);
    }

    #[test]
    fn missing_uuid_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mobileprovision");
        fs::write(&path, "<plist><dict></dict></plist>").unwrap();

        match ProvisioningProfile::load(&path) {
            Err(ProfileError::Malformed { .. }) => {}
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn install_replaces_colliding_profile_once() {
        let dir = tempfile::tempdir().unwrap();
        let store_root = dir.path().join("store");
        let store = ProfileStore::at(&store_root);

        // Pre-install a profile with the same UUID and identifiers.
        let old = write_profile(dir.path(), "old.mobileprovision", UUID_A, &["ABC123"]);
        let mut old = ProvisioningProfile::load(&old).unwrap();
        store.install(&mut old).unwrap();
        assert_eq!(store.installed().unwrap().len(), 1);

        let new = write_profile(dir.path(), "new.mobileprovision", UUID_A, &["ABC123"]);
        let mut new = ProvisioningProfile::load(&new).unwrap();
        store.install(&mut new).unwrap();

        let installed = store.installed().unwrap();
        assert_eq!(installed.len(), 1, "collision must be replaced, not duplicated");
        assert!(new.installed);
    }

    #[test]
    fn install_leaves_non_colliding_profiles_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path().join("store"));

        let other = write_profile(dir.path(), "other.mobileprovision", UUID_B, &["ABC123"]);
        let mut other = ProvisioningProfile::load(&other).unwrap();
        store.install(&mut other).unwrap();

        // Same identifiers, different UUID: no collision.
        let new = write_profile(dir.path(), "new.mobileprovision", UUID_A, &["ABC123"]);
        let mut new = ProvisioningProfile::load(&new).unwrap();
        store.install(&mut new).unwrap();

        assert_eq!(store.installed().unwrap().len(), 2);
    }

    #[test]
    fn identifier_mismatch_is_not_a_collision() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_profile(dir.path(), "a.mobileprovision", UUID_A, &["ABC123"]);
        let b = write_profile(dir.path(), "b.mobileprovision", UUID_A, &["OTHER"]);
        let a = ProvisioningProfile::load(&a).unwrap();
        let b = ProvisioningProfile::load(&b).unwrap();
        assert!(!a.collides_with(&b));
    }

    #[test]
    fn empty_store_reports_nothing_installed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path().join("does-not-exist"));
        assert!(store.installed().unwrap().is_empty());
    }
}
