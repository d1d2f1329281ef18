//! The stage orchestrator.
//!
//! [`Lane`] owns one build's configuration and exposes the lifecycle
//! stages: build, test, clean, sign, package, deploy. Each stage runs
//! one external tool to completion under a uniform boundary that
//! announces the stage tagged with the product name and, on any error,
//! logs one diagnostic and re-raises unchanged — callers always observe
//! failures. Stages are synchronous and never overlap on one lane.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, LaneConfig};
use crate::deploy::{self, DeployContext, DeployError, ProgressSink};
use crate::invoke::{InvokeError, Invocation, SystemInvoker, ToolInvoker};
use crate::parse::{
    BuildLog, BuildLogParser, ConsoleFormatter, JsonFileFormatter, LineParser, ReportFormatter,
    TestLogParser, TestReport,
};
use crate::scope::{KeychainScope, ProfileError, ProfileStore, ProvisioningProfile};

/// Errors surfaced by lane stages.
#[derive(Debug, Error)]
pub enum LaneError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("provisioning profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("{stage}: missing {path} (run the {produced_by} stage first)")]
    MissingArtifact {
        stage: &'static str,
        path: PathBuf,
        produced_by: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LaneError {
    /// Stable process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaneError::Config(_) => 1,
            LaneError::Io(_) => 1,
            LaneError::Invoke(_) => 50,
            LaneError::Profile(_) => 40,
            LaneError::MissingArtifact { .. } => 60,
            LaneError::Deploy(err) => match err {
                DeployError::UnknownMethod(_) => 10,
                DeployError::Invoke(_) => 50,
                DeployError::MissingArtifact { .. } => 60,
                _ => 20,
            },
        }
    }
}

/// Result type for lane operations.
pub type LaneResult<T> = Result<T, LaneError>;

/// How a build stage delivers tool output: quiet with a classified log
/// file, or live lines to the caller's callback (no log file). The two
/// modes are an explicit contract, not a flag-driven branch.
pub enum OutputMode<'a> {
    LogFile,
    Live(&'a mut dyn FnMut(&str)),
}

/// Options for the build stage.
pub struct BuildOptions<'a> {
    /// SDK override for this invocation only.
    pub sdk: Option<String>,
    pub output: OutputMode<'a>,
}

impl Default for BuildOptions<'_> {
    fn default() -> Self {
        Self {
            sdk: None,
            output: OutputMode::LogFile,
        }
    }
}

/// Options for the test stage.
///
/// When `formatters` is `None` the defaults apply: colored console echo
/// plus a JSON report file at the configured report path.
#[derive(Default)]
pub struct TestOptions {
    pub sdk: Option<String>,
    pub formatters: Option<Vec<Box<dyn ReportFormatter>>>,
}

/// Options for stages that stream raw tool output (sign, package).
#[derive(Default)]
pub struct RawOutputOptions<'a> {
    pub output: Option<&'a mut dyn FnMut(&str)>,
}

/// The stage orchestrator for one product build.
pub struct Lane {
    config: LaneConfig,
    invoker: Box<dyn ToolInvoker>,
    profiles: ProfileStore,
    built: bool,
    packaged: bool,
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("config", &self.config)
            .field("profiles", &self.profiles)
            .field("built", &self.built)
            .field("packaged", &self.packaged)
            .finish_non_exhaustive()
    }
}

impl Lane {
    /// Lane running real tools against the user's profile store.
    pub fn new(config: LaneConfig) -> LaneResult<Self> {
        let profiles = ProfileStore::system()?;
        Ok(Self::with_invoker(
            config,
            Box::new(SystemInvoker::new()),
            profiles,
        ))
    }

    /// Lane with an explicit invoker and profile store; used by tests.
    pub fn with_invoker(
        config: LaneConfig,
        invoker: Box<dyn ToolInvoker>,
        profiles: ProfileStore,
    ) -> Self {
        Self {
            config,
            invoker,
            profiles,
            built: false,
            packaged: false,
        }
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    /// Settings may be adjusted between stages, never during one.
    pub fn config_mut(&mut self) -> &mut LaneConfig {
        &mut self.config
    }

    pub fn built(&self) -> bool {
        self.built
    }

    pub fn packaged(&self) -> bool {
        self.packaged
    }

    fn announce(&self, stage: &str) {
        info!(product = %self.config.product_name, stage, "starting stage");
    }

    fn diagnose(&self, stage: &str, err: &LaneError) {
        error!(product = %self.config.product_name, stage, error = %err, "stage failed");
    }

    /// Build the configured target. In quiet mode the classified output
    /// lands in `xcodebuild-output.txt` under the configuration build
    /// path — on failure too, so a broken build can be inspected.
    pub fn build(&mut self, options: &mut BuildOptions<'_>) -> LaneResult<&mut Self> {
        self.announce("build");
        match self.run_build(options) {
            Ok(()) => {
                self.built = true;
                Ok(self)
            }
            Err(err) => {
                self.diagnose("build", &err);
                Err(err)
            }
        }
    }

    fn run_build(&self, options: &mut BuildOptions<'_>) -> LaneResult<()> {
        let profile_uuid = self.install_profile()?;
        let sdk = options.sdk.as_deref().unwrap_or(&self.config.sdk);
        let invocation = self
            .xcodebuild(sdk, "build")
            .envs(self.config.build_environment(profile_uuid));

        let _keychain = self.keychain_scope()?;
        match &mut options.output {
            OutputMode::LogFile => {
                let mut parser = BuildLogParser::new();
                let result = self.invoker.run(&invocation, &mut |line| parser.feed(line));
                parser.flush();
                if let Err(write_err) = self.write_build_log(parser.log()) {
                    if result.is_ok() {
                        return Err(write_err.into());
                    }
                    warn!(error = %write_err, "could not write build log");
                }
                result?;
            }
            OutputMode::Live(sink) => {
                self.invoker.run(&invocation, &mut **sink)?;
            }
        }
        Ok(())
    }

    /// Run the test bundle and return its report.
    ///
    /// A non-zero runner exit after at least one suite was observed
    /// means "tests ran, some failed" — the partial report is returned
    /// and the exit suppressed, since the failures are already in the
    /// report. A non-zero exit with zero suites is a toolchain failure
    /// and propagates.
    pub fn test(&mut self, options: TestOptions) -> LaneResult<TestReport> {
        self.announce("test");
        match self.run_test(options) {
            Ok(report) => Ok(report),
            Err(err) => {
                self.diagnose("test", &err);
                Err(err)
            }
        }
    }

    fn run_test(&self, options: TestOptions) -> LaneResult<TestReport> {
        let formatters = options.formatters.unwrap_or_else(|| {
            vec![
                Box::new(ConsoleFormatter::stdout()) as Box<dyn ReportFormatter>,
                Box::new(JsonFileFormatter::new(self.config.test_report_path())),
            ]
        });

        let sdk = options.sdk.as_deref().unwrap_or(&self.config.sdk);
        let mut env = self.config.build_environment(None);
        env.insert("TEST_AFTER_BUILD".to_string(), "YES".to_string());
        let invocation = self.xcodebuild(sdk, "build").envs(env);

        let mut parser = TestLogParser::new(formatters);
        let result = self.invoker.run(&invocation, &mut |line| parser.feed(line));
        // Flush on every path so an interrupted stream still closes its
        // open suite and the formatters see a finished report.
        parser.flush();
        let report = parser.into_report();

        if let Err(err) = result {
            if report.is_empty() {
                return Err(err.into());
            }
            info!(error = %err, "test runner exited non-zero; failures are in the report");
        }
        Ok(report)
    }

    /// Clean the configured target's build products.
    pub fn clean(&mut self) -> LaneResult<&mut Self> {
        self.announce("clean");
        let invocation = self.xcodebuild(&self.config.sdk, "clean");
        match self.invoker.run(&invocation, &mut |_| {}) {
            Ok(()) => {
                self.built = false;
                self.packaged = false;
                Ok(self)
            }
            Err(err) => {
                let err = LaneError::from(err);
                self.diagnose("clean", &err);
                Err(err)
            }
        }
    }

    /// Re-sign the built app bundle with the configured identity.
    pub fn sign(&mut self, options: &mut RawOutputOptions<'_>) -> LaneResult<&mut Self> {
        self.announce("sign");
        match self.run_sign(options) {
            Ok(()) => Ok(self),
            Err(err) => {
                self.diagnose("sign", &err);
                Err(err)
            }
        }
    }

    fn run_sign(&self, options: &mut RawOutputOptions<'_>) -> LaneResult<()> {
        let identity = self
            .config
            .signing_identity
            .as_deref()
            .ok_or(ConfigError::Missing("signing_identity"))?;
        let app = self.config.app_path();
        if !app.exists() {
            return Err(LaneError::MissingArtifact {
                stage: "sign",
                path: app,
                produced_by: "build",
            });
        }

        let invocation = Invocation::new("codesign")
            .arg("--force")
            .arg("--sign")
            .arg(identity)
            .arg(format!(
                "--resource-rules={}",
                app.join("ResourceRules.plist").display()
            ))
            .arg("--entitlements")
            .arg(self.config.entitlements_path().display().to_string())
            .arg(app.display().to_string());

        self.run_raw(&invocation, options)
    }

    /// Package the built app into the distributable archive and zip the
    /// debug-symbol bundle alongside it.
    pub fn package(&mut self, options: &mut RawOutputOptions<'_>) -> LaneResult<&mut Self> {
        self.announce("package");
        match self.run_package(options) {
            Ok(()) => {
                self.packaged = true;
                Ok(self)
            }
            Err(err) => {
                self.diagnose("package", &err);
                Err(err)
            }
        }
    }

    fn run_package(&self, options: &mut RawOutputOptions<'_>) -> LaneResult<()> {
        let app = self.config.app_path();
        if !app.exists() {
            return Err(LaneError::MissingArtifact {
                stage: "package",
                path: app,
                produced_by: "build",
            });
        }
        let dsym = self.config.dsym_path();
        if !dsym.exists() {
            return Err(LaneError::MissingArtifact {
                stage: "package",
                path: dsym,
                produced_by: "build",
            });
        }

        let mut packaging = Invocation::new("xcrun")
            .arg("-sdk")
            .arg(self.config.sdk_root())
            .arg("PackageApplication")
            .arg("-v")
            .arg(app.display().to_string())
            .arg("-o")
            .arg(self.config.ipa_path().display().to_string());
        if let Some(profile) = &self.config.provisioning_profile {
            packaging = packaging.arg("--embed").arg(profile.display().to_string());
        }

        {
            let _keychain = self.keychain_scope()?;
            self.run_raw(&packaging, options)?;
        }

        // Zip from inside the products directory so archive entries are
        // relative, not absolute.
        let zip_name = self
            .config
            .dsym_zip_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.dSYM.zip", self.config.versioned_name()));
        let dsym_name = dsym
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let zip = Invocation::new("zip")
            .arg("-r")
            .arg(zip_name)
            .arg(dsym_name)
            .current_dir(self.config.configuration_build_path());
        self.run_raw(&zip, options)?;
        Ok(())
    }

    /// Publish the packaged artifacts with the named deployment method.
    ///
    /// Caller options are merged over the default bag derived from the
    /// configuration; an unknown method fails at resolution, before any
    /// deployment side effect.
    pub fn deploy(
        &mut self,
        method: &str,
        options: HashMap<String, String>,
        progress: ProgressSink<'_>,
    ) -> LaneResult<()> {
        self.announce("deploy");
        match self.run_deploy(method, options, progress) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.diagnose("deploy", &err);
                Err(err)
            }
        }
    }

    fn run_deploy(
        &self,
        method: &str,
        options: HashMap<String, String>,
        progress: ProgressSink<'_>,
    ) -> LaneResult<()> {
        let backend = deploy::resolve(method)?;
        let ctx = DeployContext::from_config(&self.config).merge(options);
        backend.deploy(self.invoker.as_ref(), &ctx, progress)?;
        Ok(())
    }

    fn xcodebuild(&self, sdk: &str, action: &str) -> Invocation {
        Invocation::new("xcodebuild")
            .arg("-target")
            .arg(&self.config.target)
            .arg("-configuration")
            .arg(&self.config.configuration)
            .arg("-sdk")
            .arg(sdk)
            .arg(action)
    }

    fn run_raw(
        &self,
        invocation: &Invocation,
        options: &mut RawOutputOptions<'_>,
    ) -> LaneResult<()> {
        match &mut options.output {
            Some(sink) => self.invoker.run(invocation, &mut **sink)?,
            None => self.invoker.run(invocation, &mut |_| {})?,
        }
        Ok(())
    }

    fn install_profile(&self) -> LaneResult<Option<Uuid>> {
        let Some(path) = &self.config.provisioning_profile else {
            return Ok(None);
        };
        let mut profile = ProvisioningProfile::load(path)?;
        self.profiles.install(&mut profile)?;
        Ok(Some(profile.uuid))
    }

    fn keychain_scope(&self) -> LaneResult<Option<KeychainScope<'_>>> {
        match &self.config.keychain {
            Some(path) => Ok(Some(KeychainScope::push(self.invoker.as_ref(), path)?)),
            None => Ok(None),
        }
    }

    fn write_build_log(&self, log: &BuildLog) -> io::Result<()> {
        let path = self.config.build_log_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&path)?);
        log.write_to(&mut writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedInvoker;
    use std::sync::Arc;

    fn lane_in(dir: &std::path::Path, invoker: Arc<ScriptedInvoker>) -> Lane {
        let mut config = LaneConfig::new("Demo", "Demo");
        config.version = Some("1.2".to_string());
        config.build_dir = dir.join("build");
        Lane::with_invoker(
            config,
            Box::new(invoker),
            ProfileStore::at(dir.join("profiles")),
        )
    }

    #[test]
    fn build_writes_classified_log_in_quiet_mode() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.expect_success_with_output(
            "xcodebuild",
            vec![
                "CompileC Demo.o".to_string(),
                "Demo.m:3:1: warning: unused variable 'x'".to_string(),
                "** BUILD SUCCEEDED **".to_string(),
            ],
        );
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        lane.build(&mut BuildOptions::default()).unwrap();
        assert!(lane.built());

        let log = std::fs::read_to_string(lane.config().build_log_path()).unwrap();
        assert!(log.contains("unused variable"));
        assert!(log.contains("outcome: succeeded"));

        let call = &invoker.calls_of("xcodebuild")[0];
        assert!(call.args.contains(&"-target".to_string()));
        assert!(call.args.contains(&"build".to_string()));
        assert_eq!(call.env.get("OBJROOT"), call.env.get("SYMROOT"));
    }

    #[test]
    fn failed_build_still_writes_log_and_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.expect_failure_with_output(
            "xcodebuild",
            vec![
                "Demo.m:9:2: error: expected ';'".to_string(),
                "** BUILD FAILED **".to_string(),
            ],
            65,
        );
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        let err = lane.build(&mut BuildOptions::default()).unwrap_err();
        assert!(matches!(err, LaneError::Invoke(_)));
        assert!(!lane.built());

        let log = std::fs::read_to_string(lane.config().build_log_path()).unwrap();
        assert!(log.contains("expected ';'"));
        assert!(log.contains("outcome: failed"));
    }

    #[test]
    fn live_build_streams_lines_and_skips_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.expect_success_with_output(
            "xcodebuild",
            vec!["line one".to_string(), "line two".to_string()],
        );
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        let mut seen = Vec::new();
        let mut capture = |line: &str| seen.push(line.to_string());
        lane.build(&mut BuildOptions {
            sdk: None,
            output: OutputMode::Live(&mut capture),
        })
        .unwrap();

        assert_eq!(seen, ["line one", "line two"]);
        assert!(!lane.config().build_log_path().exists());
    }

    #[test]
    fn build_sdk_override_applies_to_one_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        lane.build(&mut BuildOptions {
            sdk: Some("iphonesimulator".to_string()),
            output: OutputMode::LogFile,
        })
        .unwrap();

        let args = &invoker.calls_of("xcodebuild")[0].args;
        let sdk_pos = args.iter().position(|a| a == "-sdk").unwrap();
        assert_eq!(args[sdk_pos + 1], "iphonesimulator");
        assert_eq!(lane.config().sdk, "iphoneos");
    }

    #[test]
    fn test_failure_with_suites_returns_partial_report() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.expect_failure_with_output(
            "xcodebuild",
            vec![
                "Test Suite 'DemoTests' started at x".to_string(),
                "Test Case '-[DemoTests testFails]' started.".to_string(),
                "Test Case '-[DemoTests testFails]' failed (0.002 seconds).".to_string(),
                "Test Suite 'DemoTests' finished at x".to_string(),
            ],
            1,
        );
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        let report = lane
            .test(TestOptions {
                sdk: None,
                formatters: Some(Vec::new()),
            })
            .unwrap();
        assert_eq!(report.suites.len(), 1);
        assert_eq!(report.failure_count(), 1);
    }

    #[test]
    fn test_failure_with_no_suites_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.expect_failure_with_output(
            "xcodebuild",
            vec!["Demo.m:1:1: error: no such file".to_string()],
            65,
        );
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        let err = lane
            .test(TestOptions {
                sdk: None,
                formatters: Some(Vec::new()),
            })
            .unwrap_err();
        assert!(matches!(err, LaneError::Invoke(_)));
    }

    #[test]
    fn test_sets_test_after_build_in_environment() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        lane.test(TestOptions {
            sdk: None,
            formatters: Some(Vec::new()),
        })
        .unwrap();

        let call = &invoker.calls_of("xcodebuild")[0];
        assert_eq!(call.env.get("TEST_AFTER_BUILD").map(String::as_str), Some("YES"));
    }

    #[test]
    fn package_fails_fast_without_app_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        let err = lane
            .package(&mut RawOutputOptions::default())
            .unwrap_err();
        match err {
            LaneError::MissingArtifact { stage, produced_by, .. } => {
                assert_eq!(stage, "package");
                assert_eq!(produced_by, "build");
            }
            other => panic!("expected MissingArtifact, got {other}"),
        }
        assert_eq!(invoker.call_count(), 0, "no external program may run");
        assert!(!lane.packaged());
    }

    #[test]
    fn package_runs_packaging_then_dsym_zip() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        let products = lane.config().configuration_build_path();
        std::fs::create_dir_all(lane.config().app_path()).unwrap();
        std::fs::create_dir_all(lane.config().dsym_path()).unwrap();

        lane.package(&mut RawOutputOptions::default()).unwrap();
        assert!(lane.packaged());

        let calls = invoker.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "xcrun");
        assert!(calls[0].args.contains(&"PackageApplication".to_string()));
        assert_eq!(calls[1].program, "zip");
        assert_eq!(calls[1].args[1], "Demo-Release-1.2.dSYM.zip");
        assert_eq!(calls[1].args[2], "Demo.app.dSYM");
        assert_eq!(calls[1].current_dir.as_deref(), Some(products.as_path()));
    }

    #[test]
    fn package_wraps_packaging_in_keychain_scope() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.expect_success_with_output(
            "security",
            vec!["    \"/Users/dev/login.keychain\"".to_string()],
        );
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));
        lane.config_mut().keychain = Some(dir.path().join("build.keychain"));

        std::fs::create_dir_all(lane.config().app_path()).unwrap();
        std::fs::create_dir_all(lane.config().dsym_path()).unwrap();

        lane.package(&mut RawOutputOptions::default()).unwrap();

        let programs: Vec<String> =
            invoker.calls().into_iter().map(|c| c.program).collect();
        // capture, set, package, restore, zip
        assert_eq!(programs, ["security", "security", "xcrun", "security", "zip"]);
    }

    #[test]
    fn sign_fails_fast_without_app_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));
        lane.config_mut().signing_identity = Some("iPhone Distribution: Demo".to_string());

        let err = lane.sign(&mut RawOutputOptions::default()).unwrap_err();
        assert!(matches!(err, LaneError::MissingArtifact { stage: "sign", .. }));
        assert_eq!(invoker.call_count(), 0);
    }

    #[test]
    fn sign_invokes_codesign_with_identity() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));
        lane.config_mut().signing_identity = Some("iPhone Distribution: Demo".to_string());
        std::fs::create_dir_all(lane.config().app_path()).unwrap();

        lane.sign(&mut RawOutputOptions::default()).unwrap();

        let call = &invoker.calls_of("codesign")[0];
        assert_eq!(call.args[0], "--force");
        assert_eq!(call.args[1], "--sign");
        assert_eq!(call.args[2], "iPhone Distribution: Demo");
        assert!(call.args.iter().any(|a| a.starts_with("--resource-rules=")));
        assert!(call.args.contains(&"--entitlements".to_string()));
    }

    #[test]
    fn clean_resets_lifecycle_flags() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        lane.build(&mut BuildOptions::default()).unwrap();
        assert!(lane.built());

        lane.clean().unwrap();
        assert!(!lane.built());
        assert!(!lane.packaged());

        let args = &invoker.calls_of("xcodebuild")[1].args;
        assert!(args.contains(&"clean".to_string()));
    }

    #[test]
    fn deploy_unknown_method_fails_before_any_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        let err = lane
            .deploy("unknown", HashMap::new(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            LaneError::Deploy(DeployError::UnknownMethod(_))
        ));
        assert_eq!(err.exit_code(), 10);
        assert_eq!(invoker.call_count(), 0);
    }

    #[test]
    fn build_installs_configured_profile_and_exports_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut lane = lane_in(dir.path(), Arc::clone(&invoker));

        let uuid = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";
        let profile_path = dir.path().join("demo.mobileprovision");
        std::fs::write(
            &profile_path,
            format!(
                "<plist><dict><key>Name</key><string>Demo</string>\
                 <key>ApplicationIdentifierPrefix</key><array><string>ABC</string></array>\
                 <key>UUID</key><string>{uuid}</string></dict></plist>"
            ),
        )
        .unwrap();
        lane.config_mut().provisioning_profile = Some(profile_path);

        lane.build(&mut BuildOptions::default()).unwrap();

        let call = &invoker.calls_of("xcodebuild")[0];
        assert_eq!(call.env.get("PROVISIONING_PROFILE").map(String::as_str), Some(uuid));
        assert!(dir
            .path()
            .join("profiles")
            .join(format!("{uuid}.mobileprovision"))
            .exists());
    }
}
