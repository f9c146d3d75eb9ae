use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

/// Installs `package_spec` into the environment at `prefix`, creating the
/// environment first when it does not exist yet.
pub(crate) fn run_conda_install(exec: &Path, prefix: &Path, package_spec: &str) -> Result<()> {
    let subcommand = if prefix.exists() { "install" } else { "create" };
    let output = Command::new(exec)
        .arg(subcommand)
        .arg("--yes")
        .arg("--quiet")
        .arg("--prefix")
        .arg(prefix)
        .arg(package_spec)
        .output()
        .with_context(|| {
            format!(
                "failed launching {} {subcommand} for {package_spec}",
                exec.display()
            )
        })?;
    if !output.status.success() {
        anyhow::bail!(
            "conda {subcommand} of {} into {} failed: {}",
            package_spec,
            prefix.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
