use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use devflow_core::error::Result;

/// Subdirectory that extracted files of one kind are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDir {
    Code,
    Tests,
    Deployment,
}

impl ArtifactDir {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactDir::Code => "code",
            ArtifactDir::Tests => "tests",
            ArtifactDir::Deployment => "deployment",
        }
    }
}

/// A fenced block whose opening fence names a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub path: String,
    pub content: String,
}

/// Scan markdown for fenced blocks. The text after the opening fence is the
/// file path; blocks without one are skipped, as is an unclosed final block.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut in_block = false;
    let mut current: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with("```") {
            if in_block {
                if let Some(path) = current.take() {
                    blocks.push(CodeBlock {
                        path,
                        content: body.join("\n"),
                    });
                }
                body.clear();
                in_block = false;
            } else {
                let name = line[3..].trim();
                current = (!name.is_empty()).then(|| name.to_string());
                in_block = true;
            }
            continue;
        }
        if in_block && current.is_some() {
            body.push(line);
        }
    }
    blocks
}

/// Normalize a block path to a relative path that stays inside its
/// category directory. Absolute and escaping paths are refused.
pub fn safe_relative_path(path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Writes step outputs under the project output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write `content` to `<root>/<name>`, creating the directory.
    pub async fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path(name);
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), bytes = content.len(), "Artifact written");
        Ok(path)
    }

    pub async fn write_json(&self, name: &str, value: &serde_json::Value) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(value)?;
        self.write(name, &json).await
    }

    /// Write every named fenced block of `text` under `<root>/<dir>/`.
    ///
    /// Never fails: rejected paths and write errors are logged and skipped.
    pub async fn materialize(&self, dir: ArtifactDir, text: &str) -> Vec<PathBuf> {
        let base = self.root.join(dir.as_str());
        let mut written = Vec::new();

        for block in extract_code_blocks(text) {
            let Some(relative) = safe_relative_path(&block.path) else {
                warn!(path = %block.path, dir = dir.as_str(), "Rejected unsafe artifact path");
                continue;
            };
            let target = base.join(relative);
            if let Some(parent) = target.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!(path = %target.display(), error = %e, "Failed to create artifact directory");
                    continue;
                }
            }
            match tokio::fs::write(&target, &block.content).await {
                Ok(()) => written.push(target),
                Err(e) => warn!(path = %target.display(), error = %e, "Failed to write extracted file"),
            }
        }

        if !written.is_empty() {
            debug!(dir = dir.as_str(), files = written.len(), "Extracted files from fenced blocks");
        }
        written
    }
}
