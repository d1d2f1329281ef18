//! TestFlight-style deployment: upload the packaged artifacts to the
//! distribution service's build endpoint with a `curl` multipart form.

use crate::invoke::{Invocation, ToolInvoker};

use super::{DeployBackend, DeployContext, DeployError, DeployEvent, ProgressSink};

const UPLOAD_URL: &str = "https://testflightapp.com/api/builds.json";

pub(super) fn backend() -> Box<dyn DeployBackend> {
    Box::new(TestFlightDeploy)
}

struct TestFlightDeploy;

impl DeployBackend for TestFlightDeploy {
    fn name(&self) -> &'static str {
        "testflight"
    }

    fn deploy(
        &self,
        invoker: &dyn ToolInvoker,
        ctx: &DeployContext,
        progress: ProgressSink<'_>,
    ) -> Result<(), DeployError> {
        let api_token = ctx.require("api_token")?.to_string();
        let team_token = ctx.require("team_token")?.to_string();
        ctx.require_artifacts()?;

        progress(DeployEvent::Started { method: self.name() });

        let notes = ctx
            .release_notes
            .clone()
            .unwrap_or_else(|| format!("{} build", ctx.product_name));

        let mut upload = Invocation::new("curl")
            .args(["--silent", "--show-error", "--fail"])
            .arg("-F")
            .arg(format!("file=@{}", ctx.ipa_path.display()))
            .arg("-F")
            .arg(format!("dsym=@{}", ctx.dsym_zip_path.display()))
            .arg("-F")
            .arg(format!("api_token={api_token}"))
            .arg("-F")
            .arg(format!("team_token={team_token}"))
            .arg("-F")
            .arg(format!("notes={notes}"));
        if let Some(lists) = ctx.extra.get("distribution_lists") {
            upload = upload.arg("-F").arg(format!("distribution_lists={lists}"));
        }
        if ctx.extra.get("notify").map(String::as_str) == Some("true") {
            upload = upload.arg("-F").arg("notify=True");
        }
        upload = upload.arg(UPLOAD_URL);

        progress(DeployEvent::Progress(format!(
            "uploading {} to {UPLOAD_URL}",
            ctx.ipa_name
        )));
        let mut response = String::new();
        invoker.run(&upload, &mut |line| {
            response.push_str(line);
            response.push('\n');
        })?;

        progress(DeployEvent::Uploaded {
            what: ctx.ipa_name.clone(),
        });
        if !response.trim().is_empty() {
            progress(DeployEvent::Progress(response.trim().to_string()));
        }
        progress(DeployEvent::Finished);
        Ok(())
    }
}
