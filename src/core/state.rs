//! Output directory management: template and manifest paths, atomic writes.

use super::types::SynthManifest;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUT_DIR: &str = "cdk.out";

/// Path of the synthesized template for a stack.
pub fn template_path(out_dir: &Path, stack: &str) -> PathBuf {
    out_dir.join(format!("{}.template.json", stack))
}

/// Path of the manifest for a stack.
pub fn manifest_path(out_dir: &Path, stack: &str) -> PathBuf {
    out_dir.join(format!("{}.manifest.yaml", stack))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write every `(path, contents)` pair to its temp file first, then rename
/// them all into place. If any temp write fails, no target is touched and
/// the temps already written are removed.
pub fn write_all_atomic(files: &[(PathBuf, String)]) -> Result<()> {
    let mut written = Vec::new();
    for (path, contents) in files {
        let tmp = tmp_path(path);
        let staged = match path.parent() {
            Some(parent) => std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e)),
            None => Ok(()),
        }
        .and_then(|()| std::fs::write(&tmp, contents).map_err(|e| Error::io(&tmp, e)));
        if let Err(e) = staged {
            for t in &written {
                let _ = std::fs::remove_file(t);
            }
            return Err(e);
        }
        written.push(tmp);
    }
    for ((path, _), tmp) in files.iter().zip(&written) {
        std::fs::rename(tmp, path).map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}

/// Serialize the template as written to disk: pretty, trailing newline.
pub fn template_text(template: &serde_json::Value) -> Result<String> {
    let mut text = serde_json::to_string_pretty(template)?;
    text.push('\n');
    Ok(text)
}

/// Write the template text and its manifest together. Both are serialized
/// and staged before either replaces the previous pair.
pub fn write_synthesis(out_dir: &Path, text: &str, manifest: &SynthManifest) -> Result<()> {
    let yaml = serde_yaml_ng::to_string(manifest)?;
    write_all_atomic(&[
        (template_path(out_dir, &manifest.stack), text.to_string()),
        (manifest_path(out_dir, &manifest.stack), yaml),
    ])
}

/// Load the manifest for a stack. Returns None if it doesn't exist.
pub fn load_manifest(out_dir: &Path, stack: &str) -> Result<Option<SynthManifest>> {
    let path = manifest_path(out_dir, stack);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    Ok(Some(serde_yaml_ng::from_str(&content)?))
}

/// Create a new empty manifest for a stack.
pub fn new_manifest(stack: &str, template_hash: &str) -> SynthManifest {
    use crate::tripwire::eventlog::now_iso8601;
    SynthManifest {
        schema: "1.0".to_string(),
        stack: stack.to_string(),
        generated_at: now_iso8601(),
        generator: format!("cfalbasg {}", env!("CARGO_PKG_VERSION")),
        template_hash: template_hash.to_string(),
        resources: IndexMap::new(),
        outputs: IndexMap::new(),
    }
}
