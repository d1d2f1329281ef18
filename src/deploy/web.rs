//! Web deployment: stage the packaged artifacts with a generated
//! install page and digest manifest, then push the staging directory to
//! a web host with `scp`.

use std::fs;

use chrono::Utc;
use serde_json::json;

use crate::invoke::{Invocation, ToolInvoker};

use super::{sha256_file, DeployBackend, DeployContext, DeployError, DeployEvent, ProgressSink};

pub(super) fn backend() -> Box<dyn DeployBackend> {
    Box::new(WebDeploy)
}

struct WebDeploy;

impl WebDeploy {
    fn index_html(ctx: &DeployContext) -> String {
        let version = ctx.bundle_version.as_deref().unwrap_or("unversioned");
        let notes = ctx.release_notes.as_deref().unwrap_or("");
        format!(
            "<!DOCTYPE html>\n<html>\n<head><title>{product} {version}</title></head>\n\
             <body>\n<h1>{product} {version}</h1>\n\
             <p><a href=\"{ipa}\">Download {ipa}</a></p>\n\
             <pre>{notes}</pre>\n</body>\n</html>\n",
            product = ctx.product_name,
            ipa = ctx.ipa_name,
        )
    }
}

impl DeployBackend for WebDeploy {
    fn name(&self) -> &'static str {
        "web"
    }

    fn deploy(
        &self,
        invoker: &dyn ToolInvoker,
        ctx: &DeployContext,
        progress: ProgressSink<'_>,
    ) -> Result<(), DeployError> {
        let host = ctx.require("host")?.to_string();
        let remote_path = ctx.require("path")?.to_string();
        ctx.require_artifacts()?;

        progress(DeployEvent::Started { method: self.name() });

        // Stage the install page and manifest next to the build
        // products so a failed push can be inspected.
        let staging = ctx.build_output_path.join("web-deploy");
        fs::create_dir_all(&staging)?;

        progress(DeployEvent::Progress("generating manifest".to_string()));
        let manifest = json!({
            "product": ctx.product_name,
            "bundle_identifier": ctx.bundle_identifier,
            "bundle_version": ctx.bundle_version,
            "created_at": Utc::now().to_rfc3339(),
            "ipa": {
                "name": ctx.ipa_name,
                "sha256": sha256_file(&ctx.ipa_path)?,
            },
            "dsym": {
                "name": ctx.dsym_zip_path.file_name().and_then(|n| n.to_str()),
                "sha256": sha256_file(&ctx.dsym_zip_path)?,
            },
            "release_notes": ctx.release_notes,
        });
        let manifest_path = staging.join("manifest.json");
        fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;

        let index_path = staging.join("index.html");
        fs::write(&index_path, Self::index_html(ctx))?;

        let destination = format!("{host}:{remote_path}");
        let uploads = [
            ctx.ipa_path.clone(),
            ctx.dsym_zip_path.clone(),
            manifest_path,
            index_path,
        ];
        for artifact in &uploads {
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

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::Io(err.into())
    }
}
