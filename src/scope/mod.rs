//! Scoped OS-level resources.
//!
//! The signing keychain search path and the installed-profile store are
//! process-wide OS resources. Each scope here performs one temporary
//! mutation and guarantees the inverse on every exit path; the lane
//! assumes no other agent mutates them concurrently.

mod profile;

pub use profile::{ProfileError, ProfileStore, ProvisioningProfile};

use std::path::Path;

use tracing::warn;

use crate::invoke::{InvokeError, Invocation, ToolInvoker};

/// Temporary addition of a keychain to the user search path.
///
/// Construction captures the current search list and prepends the given
/// keychain; `Drop` restores the captured list, so the keychain is
/// removed even when the wrapped operation fails. Restore failures are
/// logged, never panicked, since `Drop` has no error channel.
pub struct KeychainScope<'a> {
    invoker: &'a dyn ToolInvoker,
    saved: Vec<String>,
    restored: bool,
}

impl<'a> KeychainScope<'a> {
    /// Add `keychain` to the front of the user keychain search path.
    pub fn push(invoker: &'a dyn ToolInvoker, keychain: &Path) -> Result<Self, InvokeError> {
        let listing = invoker.capture(
            &Invocation::new("security").args(["list-keychains", "-d", "user"]),
        )?;
        // `security` prints one quoted, indented path per line.
        let saved: Vec<String> = listing
            .lines()
            .map(|line| line.trim().trim_matches('"').to_string())
            .filter(|line| !line.is_empty())
            .collect();

        let mut set = Invocation::new("security")
            .args(["list-keychains", "-d", "user", "-s"])
            .arg(keychain.display().to_string());
        for existing in &saved {
            set = set.arg(existing);
        }
        invoker.run(&set, &mut |_| {})?;

        Ok(Self {
            invoker,
            saved,
            restored: false,
        })
    }

    fn restore(&mut self) -> Result<(), InvokeError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        let mut set = Invocation::new("security").args(["list-keychains", "-d", "user", "-s"]);
        for existing in &self.saved {
            set = set.arg(existing);
        }
        self.invoker.run(&set, &mut |_| {})
    }
}

impl Drop for KeychainScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!(error = %err, "failed to restore keychain search path");
        }
    }
}
