//! Drift detection: compare the template on disk to the manifest hashes.
//!
//! The whole-file hash is checked first. Only when it differs is the
//! template parsed and each resource compared, so an untouched output
//! directory costs one streaming hash.

use crate::core::types::SynthManifest;
use crate::error::Result;
use crate::tripwire::hasher;
use std::path::Path;

/// Logical ID used for findings about the template file as a whole.
pub const TEMPLATE_ID: &str = "(template)";

/// A single drift finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftFinding {
    pub resource_id: String,
    pub resource_type: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

fn template_finding(manifest: &SynthManifest, actual: &str, detail: String) -> DriftFinding {
    DriftFinding {
        resource_id: TEMPLATE_ID.to_string(),
        resource_type: "template".to_string(),
        expected_hash: manifest.template_hash.clone(),
        actual_hash: actual.to_string(),
        detail,
    }
}

/// Check the template at `template_path` against `manifest`.
pub fn detect_drift(template_path: &Path, manifest: &SynthManifest) -> Result<Vec<DriftFinding>> {
    if !template_path.exists() {
        return Ok(vec![template_finding(
            manifest,
            "MISSING",
            format!("{} does not exist", template_path.display()),
        )]);
    }

    let actual = hasher::hash_file(template_path)?;
    if actual == manifest.template_hash {
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(template_path)
        .map_err(|e| crate::error::Error::io(template_path, e))?;
    let template: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            return Ok(vec![template_finding(
                manifest,
                &actual,
                format!("template is not valid JSON: {}", e),
            )])
        }
    };
    let empty = serde_json::Map::new();
    let resources = template
        .get("Resources")
        .and_then(|r| r.as_object())
        .unwrap_or(&empty);

    let mut findings = Vec::new();
    for (id, lock) in &manifest.resources {
        match resources.get(id) {
            None => findings.push(DriftFinding {
                resource_id: id.clone(),
                resource_type: lock.resource_type.clone(),
                expected_hash: lock.hash.clone(),
                actual_hash: "MISSING".to_string(),
                detail: format!("{} removed from template", id),
            }),
            Some(body) => {
                let hash = hasher::hash_json(body);
                if hash != lock.hash {
                    findings.push(DriftFinding {
                        resource_id: id.clone(),
                        resource_type: lock.resource_type.clone(),
                        expected_hash: lock.hash.clone(),
                        actual_hash: hash,
                        detail: format!("{} changed since synthesis", id),
                    });
                }
            }
        }
    }

    for (id, body) in resources {
        if manifest.resources.contains_key(id) {
            continue;
        }
        findings.push(DriftFinding {
            resource_id: id.clone(),
            resource_type: body
                .get("Type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown")
                .to_string(),
            expected_hash: "ABSENT".to_string(),
            actual_hash: hasher::hash_json(body),
            detail: format!("{} added outside synthesis", id),
        });
    }

    // Same resources, different bytes (outputs, parameters, formatting).
    if findings.is_empty() {
        findings.push(template_finding(
            manifest,
            &actual,
            "template content changed outside resources".to_string(),
        ));
    }

    Ok(findings)
}
