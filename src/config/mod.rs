//! Lane configuration.
//!
//! [`LaneConfig`] carries the per-build settings (target, configuration,
//! SDK, signing identity, build roots, optional keychain and provisioning
//! profile) plus the product metadata needed to derive artifact paths.
//! It is owned by exactly one `Lane` and adjusted only before a stage
//! runs.
//!
//! Configuration loads from a `shiplane.toml` file; CLI flags override
//! file values. All derived paths are pure functions of the fields:
//! identical configs produce identical paths on every call.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Substituted for the version segment of artifact names when no
/// version is declared.
pub const SNAPSHOT_VERSION: &str = "SNAPSHOT";

/// Default config file name searched in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "shiplane.toml";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

fn default_configuration() -> String {
    "Release".to_string()
}

fn default_sdk() -> String {
    "iphoneos".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

/// Per-build settings for one lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Product name, e.g. "Demo". Names the .app bundle and tags every
    /// stage announcement.
    pub product_name: String,

    /// Build target passed to the build tool.
    pub target: String,

    /// Build configuration, e.g. "Release".
    #[serde(default = "default_configuration")]
    pub configuration: String,

    /// SDK name, e.g. "iphoneos" or "iphonesimulator7.0".
    #[serde(default = "default_sdk")]
    pub sdk: String,

    /// Marketing version; artifact names fall back to
    /// [`SNAPSHOT_VERSION`] when absent.
    #[serde(default)]
    pub version: Option<String>,

    /// Root of all build products.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Object file root (`OBJROOT`); defaults to `build_dir`.
    #[serde(default)]
    pub obj_root: Option<PathBuf>,

    /// Symbol root (`SYMROOT`); defaults to `build_dir`.
    #[serde(default)]
    pub sym_root: Option<PathBuf>,

    /// Code-signing identity for the sign stage and the build
    /// environment.
    #[serde(default)]
    pub signing_identity: Option<String>,

    /// Signing keychain; when set, every signing-sensitive invocation
    /// runs inside a keychain search-path scope.
    #[serde(default)]
    pub keychain: Option<PathBuf>,

    /// Provisioning profile file installed before build/package.
    #[serde(default)]
    pub provisioning_profile: Option<PathBuf>,

    /// Bundle identifier from the product's metadata.
    #[serde(default)]
    pub bundle_identifier: Option<String>,

    /// Bundle version from the product's metadata.
    #[serde(default)]
    pub bundle_version: Option<String>,
}

impl LaneConfig {
    pub fn new(product_name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            target: target.into(),
            configuration: default_configuration(),
            sdk: default_sdk(),
            version: None,
            build_dir: default_build_dir(),
            obj_root: None,
            sym_root: None,
            signing_identity: None,
            keychain: None,
            provisioning_profile: None,
            bundle_identifier: None,
            bundle_version: None,
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// SDK family name with any version suffix stripped:
    /// "iphonesimulator7.0" → "iphonesimulator". Build product
    /// directories are keyed by the family, not the versioned SDK.
    pub fn sdk_root(&self) -> &str {
        self.sdk
            .trim_end_matches(|c: char| c.is_ascii_digit() || c == '.')
    }

    /// Directory holding this configuration's build products, e.g.
    /// `build/Release-iphoneos`.
    pub fn configuration_build_path(&self) -> PathBuf {
        self.build_dir
            .join(format!("{}-{}", self.configuration, self.sdk_root()))
    }

    /// Entitlements file produced by the build, consumed by the sign
    /// stage.
    pub fn entitlements_path(&self) -> PathBuf {
        self.configuration_build_path()
            .join(format!("{}.xcent", self.product_name))
    }

    /// The built application bundle.
    pub fn app_path(&self) -> PathBuf {
        self.configuration_build_path()
            .join(format!("{}.app", self.product_name))
    }

    /// Base name for versioned artifacts:
    /// `<product>-<configuration>-<version>`, with the `SNAPSHOT`
    /// sentinel when no version is declared.
    pub fn versioned_name(&self) -> String {
        let version = self
            .version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(SNAPSHOT_VERSION);
        format!("{}-{}-{}", self.product_name, self.configuration, version)
    }

    /// File name of the packaged archive.
    pub fn ipa_name(&self) -> String {
        format!("{}.ipa", self.versioned_name())
    }

    /// The packaged, installable archive.
    pub fn ipa_path(&self) -> PathBuf {
        self.configuration_build_path().join(self.ipa_name())
    }

    /// Debug-symbol bundle emitted alongside the app.
    pub fn dsym_path(&self) -> PathBuf {
        self.configuration_build_path()
            .join(format!("{}.app.dSYM", self.product_name))
    }

    /// Zip archive of the debug-symbol bundle.
    pub fn dsym_zip_path(&self) -> PathBuf {
        self.configuration_build_path()
            .join(format!("{}.dSYM.zip", self.versioned_name()))
    }

    /// Classified build log written by quiet-mode builds.
    pub fn build_log_path(&self) -> PathBuf {
        self.configuration_build_path().join("xcodebuild-output.txt")
    }

    /// Machine-readable test report written by the default test
    /// formatter set.
    pub fn test_report_path(&self) -> PathBuf {
        self.configuration_build_path().join("test-report.json")
    }

    pub fn bundle_identifier(&self) -> Option<&str> {
        self.bundle_identifier.as_deref()
    }

    pub fn bundle_version(&self) -> Option<&str> {
        self.bundle_version.as_deref().or(self.version.as_deref())
    }

    /// Environment overlay for one build-tool invocation. Rebuilt per
    /// call; never cached.
    pub fn build_environment(&self, profile_uuid: Option<Uuid>) -> HashMap<String, String> {
        let mut env = HashMap::new();
        let obj_root = self.obj_root.as_ref().unwrap_or(&self.build_dir);
        let sym_root = self.sym_root.as_ref().unwrap_or(&self.build_dir);
        env.insert("OBJROOT".to_string(), obj_root.display().to_string());
        env.insert("SYMROOT".to_string(), sym_root.display().to_string());

        if let Some(keychain) = &self.keychain {
            env.insert(
                "OTHER_CODE_SIGN_FLAGS".to_string(),
                format!("--keychain {}", keychain.display()),
            );
        }
        if let Some(identity) = &self.signing_identity {
            env.insert("CODE_SIGN_IDENTITY".to_string(), identity.clone());
        }
        if let Some(uuid) = profile_uuid {
            env.insert("PROVISIONING_PROFILE".to_string(), uuid.to_string());
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> LaneConfig {
        let mut config = LaneConfig::new("Demo", "Demo");
        config.configuration = "Release".to_string();
        config.sdk = "iphoneos".to_string();
        config.version = Some("1.2".to_string());
        config
    }

    #[test]
    fn derived_paths_match_layout() {
        let config = demo();
        assert_eq!(
            config.app_path(),
            PathBuf::from("build/Release-iphoneos/Demo.app")
        );
        assert_eq!(
            config.ipa_path(),
            PathBuf::from("build/Release-iphoneos/Demo-Release-1.2.ipa")
        );
        assert_eq!(
            config.dsym_zip_path(),
            PathBuf::from("build/Release-iphoneos/Demo-Release-1.2.dSYM.zip")
        );
        assert_eq!(
            config.dsym_path(),
            PathBuf::from("build/Release-iphoneos/Demo.app.dSYM")
        );
    }

    #[test]
    fn derived_paths_are_stable() {
        let config = demo();
        assert_eq!(config.ipa_path(), config.ipa_path());
        assert_eq!(config.app_path(), config.app_path());
        assert_eq!(config.dsym_zip_path(), config.dsym_zip_path());
    }

    #[test]
    fn missing_version_uses_snapshot_sentinel() {
        let mut config = demo();
        config.version = None;
        assert_eq!(config.versioned_name(), "Demo-Release-SNAPSHOT");

        config.version = Some(String::new());
        assert_eq!(config.versioned_name(), "Demo-Release-SNAPSHOT");
    }

    #[test]
    fn sdk_version_suffix_is_stripped_from_product_dir() {
        let mut config = demo();
        config.sdk = "iphonesimulator7.0".to_string();
        assert_eq!(config.sdk_root(), "iphonesimulator");
        assert_eq!(
            config.configuration_build_path(),
            PathBuf::from("build/Release-iphonesimulator")
        );
    }

    #[test]
    fn environment_reflects_signing_settings() {
        let mut config = demo();
        config.keychain = Some(PathBuf::from("/tmp/build.keychain"));
        config.signing_identity = Some("iPhone Distribution: Demo".to_string());

        let uuid = Uuid::new_v4();
        let env = config.build_environment(Some(uuid));

        assert_eq!(env.get("OBJROOT").map(String::as_str), Some("build"));
        assert_eq!(env.get("SYMROOT").map(String::as_str), Some("build"));
        assert_eq!(
            env.get("OTHER_CODE_SIGN_FLAGS").map(String::as_str),
            Some("--keychain /tmp/build.keychain")
        );
        assert_eq!(
            env.get("CODE_SIGN_IDENTITY").map(String::as_str),
            Some("iPhone Distribution: Demo")
        );
        assert_eq!(env.get("PROVISIONING_PROFILE"), Some(&uuid.to_string()));
    }

    #[test]
    fn environment_omits_unset_signing_settings() {
        let env = demo().build_environment(None);
        assert!(!env.contains_key("OTHER_CODE_SIGN_FLAGS"));
        assert!(!env.contains_key("CODE_SIGN_IDENTITY"));
        assert!(!env.contains_key("PROVISIONING_PROFILE"));
    }

    #[test]
    fn config_loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
product_name = "Demo"
target = "Demo"
configuration = "Release"
sdk = "iphoneos"
version = "1.2"
signing_identity = "iPhone Distribution: Demo"
"#,
        )
        .unwrap();

        let config = LaneConfig::from_file(&path).unwrap();
        assert_eq!(config.product_name, "Demo");
        assert_eq!(config.versioned_name(), "Demo-Release-1.2");
        assert_eq!(config.build_dir, PathBuf::from("build"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "product_name = [broken").unwrap();

        match LaneConfig::from_file(&path) {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
