//! Disposable sandbox directory.

use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;
use tempfile::TempDir;
use tracing::debug;

use crate::config::{SandboxConfig, MODULE_FILE, TEST_FILE};
use crate::error::{Result, SandboxError};

/// A fresh directory holding the module, the test and placeholder files.
///
/// Removed when dropped, on every exit path.
pub struct SandboxDir {
    dir: TempDir,
}

impl SandboxDir {
    /// Create the directory and write every file the run needs.
    pub async fn prepare(config: &SandboxConfig, module_text: &str, test_text: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("testsmith-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;
        let root = dir.path();

        write(root, MODULE_FILE, module_text).await?;
        write(root, TEST_FILE, &with_prelude(test_text, &config.test_prelude)).await?;

        for name in opened_files(test_text) {
            if !is_placeholder_candidate(&name) {
                continue;
            }
            debug!(file = %name, "creating placeholder file");
            write(root, &name, &config.placeholder_content).await?;
        }

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

async fn write(root: &Path, name: &str, content: &str) -> Result<()> {
    tokio::fs::write(root.join(name), content)
        .await
        .map_err(SandboxError::Workspace)
}

/// File names passed as a string literal to `open(...)`.
pub fn opened_files(test_text: &str) -> Vec<String> {
    static OPEN_CALL: OnceLock<Regex> = OnceLock::new();
    let re = OPEN_CALL.get_or_init(|| {
        Regex::new(r#"open\(\s*["']([^"']+)["']"#).expect("open() pattern is valid")
    });
    let mut names: Vec<String> = Vec::new();
    for caps in re.captures_iter(test_text) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Plain file names only; never the module or test file itself.
fn is_placeholder_candidate(name: &str) -> bool {
    if name == MODULE_FILE || name == TEST_FILE {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Prepend `prelude` to the test, after any `from __future__` imports.
pub fn with_prelude(test_text: &str, prelude: &str) -> String {
    if prelude.is_empty() {
        return test_text.to_string();
    }
    let lines: Vec<&str> = test_text.split_inclusive('\n').collect();
    let split = lines
        .iter()
        .rposition(|line| line.trim_start().starts_with("from __future__ import"))
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut out = String::with_capacity(test_text.len() + prelude.len() + 1);
    for line in &lines[..split] {
        out.push_str(line);
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(prelude);
    if !prelude.ends_with('\n') {
        out.push('\n');
    }
    for line in &lines[split..] {
        out.push_str(line);
    }
    out
}
