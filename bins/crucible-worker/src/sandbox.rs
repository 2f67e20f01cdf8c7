//! Sandbox launcher invocation.
//!
//! The launcher is an external binary that applies namespaces, seccomp,
//! and rlimits around a single child, driven entirely by a config file.
//! This module renders the per-language config template into the
//! workspace and builds the launcher argument vector.

use std::io;
use std::path::{Path, PathBuf};

/// Placeholder substituted with the absolute workspace path.
pub const WORKSPACE_TOKEN: &str = "{{WORKSPACE}}";

/// File name of the rendered config inside the workspace.
pub const RENDERED_CONFIG_NAME: &str = "sandbox.cfg";

pub fn render_template(template: &str, workspace: &Path) -> String {
    template.replace(WORKSPACE_TOKEN, &workspace.to_string_lossy())
}

/// Load the language's template, substitute the workspace path, and
/// write the result next to the source file.
pub async fn render_config(
    config_dir: &Path,
    template_name: &str,
    workspace: &Path,
) -> io::Result<PathBuf> {
    let template_path = config_dir.join(template_name);
    let template = tokio::fs::read_to_string(&template_path).await.map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("sandbox template {}: {}", template_path.display(), e),
        )
    })?;
    let rendered = render_template(&template, workspace);
    let out = workspace.join(RENDERED_CONFIG_NAME);
    tokio::fs::write(&out, rendered).await?;
    Ok(out)
}

/// Builder for the launcher argument vector:
/// `<launcher> --config <rendered> -- <program...>`.
#[derive(Debug)]
pub struct LauncherCommand {
    launcher: PathBuf,
    config: PathBuf,
    program: Vec<String>,
}

impl LauncherCommand {
    pub fn new(launcher: impl Into<PathBuf>, config: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
            config: config.into(),
            program: Vec::new(),
        }
    }

    /// Set the program invocation that runs inside the sandbox.
    pub fn program(mut self, argv: impl IntoIterator<Item = String>) -> Self {
        self.program = argv.into_iter().collect();
        self
    }

    pub fn build(self) -> Vec<String> {
        let mut args = vec![
            self.launcher.to_string_lossy().into_owned(),
            "--config".to_string(),
            self.config.to_string_lossy().into_owned(),
            "--".to_string(),
        ];
        args.extend(self.program);
        args
    }
}
