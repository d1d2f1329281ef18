//! SSH deployment: push the packaged artifacts to `user@host:path`
//! with `scp`.

use crate::invoke::{Invocation, ToolInvoker};

use super::{DeployBackend, DeployContext, DeployError, DeployEvent, ProgressSink};

pub(super) fn backend() -> Box<dyn DeployBackend> {
    Box::new(SshDeploy)
}

struct SshDeploy;

impl DeployBackend for SshDeploy {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn deploy(
        &self,
        invoker: &dyn ToolInvoker,
        ctx: &DeployContext,
        progress: ProgressSink<'_>,
    ) -> Result<(), DeployError> {
        let host = ctx.require("host")?.to_string();
        let path = ctx.require("path")?.to_string();
        ctx.require_artifacts()?;

        progress(DeployEvent::Started { method: self.name() });

        let destination = format!("{host}:{path}");
        for artifact in [&ctx.ipa_path, &ctx.dsym_zip_path] {
            progress(DeployEvent::Progress(format!(
                "uploading {} to {destination}",
                artifact.display()
            )));
            invoker.run(
                &Invocation::new("scp")
                    .arg(artifact.display().to_string())
                    .arg(&destination),
                &mut |_| {},
            )?;
            progress(DeployEvent::Uploaded {
                what: artifact.display().to_string(),
            });
        }

        progress(DeployEvent::Finished);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaneConfig;
    use crate::mock::ScriptedInvoker;
    use std::collections::HashMap;
    use std::fs;

    fn staged_context(dir: &std::path::Path) -> DeployContext {
        let mut config = LaneConfig::new("Demo", "Demo");
        config.version = Some("1.2".to_string());
        config.build_dir = dir.join("build");

        let products = config.configuration_build_path();
        fs::create_dir_all(&products).unwrap();
        fs::write(config.ipa_path(), b"ipa").unwrap();
        fs::write(config.dsym_zip_path(), b"dsym").unwrap();

        let mut options = HashMap::new();
        options.insert("host".to_string(), "dev@builds.example.com".to_string());
        options.insert("path".to_string(), "/srv/builds".to_string());
        DeployContext::from_config(&config).merge(options)
    }

    #[test]
    fn uploads_both_artifacts_via_scp() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = staged_context(dir.path());
        let invoker = ScriptedInvoker::new();

        let mut events = Vec::new();
        backend()
            .deploy(&invoker, &ctx, &mut |e| events.push(e))
            .unwrap();

        let calls = invoker.calls_of("scp");
        assert_eq!(calls.len(), 2);
        assert!(calls[0].args[0].ends_with("Demo-Release-1.2.ipa"));
        assert_eq!(calls[0].args[1], "dev@builds.example.com:/srv/builds");
        assert!(calls[1].args[0].ends_with("Demo-Release-1.2.dSYM.zip"));
        assert_eq!(events.first(), Some(&DeployEvent::Started { method: "ssh" }));
        assert_eq!(events.last(), Some(&DeployEvent::Finished));
    }

    #[test]
    fn missing_host_fails_before_any_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = staged_context(dir.path());
        ctx.extra.remove("host");
        let invoker = ScriptedInvoker::new();

        let err = backend()
            .deploy(&invoker, &ctx, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingOption("host")));
        assert_eq!(invoker.call_count(), 0);
    }

    #[test]
    fn missing_ipa_fails_before_any_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = staged_context(dir.path());
        fs::remove_file(&ctx.ipa_path).unwrap();
        let invoker = ScriptedInvoker::new();

        let err = backend()
            .deploy(&invoker, &ctx, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingArtifact { .. }));
        assert_eq!(invoker.call_count(), 0);
    }
}
