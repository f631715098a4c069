//! Project file parsing and validation.
//!
//! Parses cfalbasg.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Stack name must be a valid CloudFormation stack name
//! - Required context keys must be present
//! - `allowips` must be a list of `{ip, description}` entries
//!
//! Malformed allowlist addresses are warnings, never errors: synthesis
//! passes them through unchanged.

use super::resolver::parse_allow_ips;
use super::types::*;
use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use std::path::Path;

/// Context keys that have no default.
pub const REQUIRED_KEYS: &[&str] = &["mydomain", "myhost", "keypair", "allowips"];

/// Validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn finding(message: String) -> ValidationError {
    ValidationError { message }
}

/// Parse a cfalbasg.yaml file from disk.
pub fn parse_project_file(path: &Path) -> Result<ProjectConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_project(&content)
}

/// Parse a cfalbasg.yaml from a string.
pub fn parse_project(yaml: &str) -> Result<ProjectConfig> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

fn valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        && name.len() <= 128
}

/// Effective value of a context key: the last override wins over the file.
/// Explicit nulls count as absent.
fn context_value<'a>(
    project: &'a ProjectConfig,
    overrides: &'a [(String, serde_yaml_ng::Value)],
    key: &str,
) -> Option<&'a serde_yaml_ng::Value> {
    overrides
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
        .or_else(|| project.context.get(key))
        .filter(|v| !v.is_null())
}

/// Validate a parsed project together with its `-c` overrides. Returns a
/// list of errors (empty = valid).
pub fn validate_project(
    project: &ProjectConfig,
    overrides: &[(String, serde_yaml_ng::Value)],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if project.version != "1.0" {
        errors.push(finding(format!(
            "version must be \"1.0\", got \"{}\"",
            project.version
        )));
    }

    if project.name.is_empty() {
        errors.push(finding("name must not be empty".to_string()));
    } else if !valid_stack_name(&project.name) {
        errors.push(finding(format!(
            "name '{}' must start with a letter and contain only letters, digits and hyphens",
            project.name
        )));
    }

    for key in REQUIRED_KEYS {
        if context_value(project, overrides, key).is_none() {
            errors.push(finding(format!("context key '{}' is required", key)));
        }
    }

    if let Some(allow) = context_value(project, overrides, "allowips") {
        if let Err(e) = parse_allow_ips(allow) {
            errors.push(finding(e.to_string()));
        }
    }

    if let Some(region) = &project.env.region {
        if region.is_empty() || !region.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            errors.push(finding(format!("env.region '{}' is not a region name", region)));
        }
    }

    errors
}

/// Non-fatal findings: allowlist entries that are not IPv4 addresses.
pub fn project_warnings(
    project: &ProjectConfig,
    overrides: &[(String, serde_yaml_ng::Value)],
) -> Vec<ValidationError> {
    let Some(allow) = context_value(project, overrides, "allowips") else {
        return Vec::new();
    };
    let Ok(entries) = parse_allow_ips(allow) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|e| e.ip.parse::<Ipv4Addr>().is_err())
        .map(|e| {
            finding(format!(
                "allowips entry '{}' is not an IPv4 address; it will be used as '{}/32' unchanged",
                e.ip, e.ip
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
version: "1.0"
name: CfAlbAsgStack
env:
  region: ap-northeast-1
context:
  mydomain: example.com
  myhost: www
  keypair: ops
  allowips:
    - ip: 203.0.113.10
      description: office
"#;

    #[test]
    fn test_parse_valid() {
        let p = parse_project(VALID).unwrap();
        assert_eq!(p.name, "CfAlbAsgStack");
        assert_eq!(p.env.region.as_deref(), Some("ap-northeast-1"));
        assert!(validate_project(&p, &[]).is_empty());
        assert!(project_warnings(&p, &[]).is_empty());
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfalbasg.yaml");
        std::fs::write(&path, VALID).unwrap();
        assert_eq!(parse_project_file(&path).unwrap().name, "CfAlbAsgStack");
        assert!(matches!(
            parse_project_file(&dir.path().join("missing.yaml")),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(matches!(parse_project("version: [\n"), Err(Error::Yaml(_))));
    }

    #[test]
    fn test_bad_version_and_name() {
        let p = parse_project("version: \"2.0\"\nname: 9lives\n").unwrap();
        let errors = validate_project(&p, &[]);
        assert!(errors.iter().any(|e| e.message.contains("version")));
        assert!(errors.iter().any(|e| e.message.contains("must start with a letter")));
    }

    #[test]
    fn test_missing_required_keys() {
        let p = parse_project("version: \"1.0\"\nname: S\ncontext:\n  mydomain: a.io\n").unwrap();
        let errors = validate_project(&p, &[]);
        let missing: Vec<_> = errors
            .iter()
            .filter(|e| e.message.contains("is required"))
            .collect();
        assert_eq!(missing.len(), 3);
    }

    #[test]
    fn test_allowips_shape_error() {
        let yaml = VALID.replace(
            "    - ip: 203.0.113.10\n      description: office\n",
            "    - {description: no-ip}\n",
        );
        let errors = validate_project(&parse_project(&yaml).unwrap(), &[]);
        assert!(errors.iter().any(|e| e.message.contains("allowips")));
    }

    #[test]
    fn test_malformed_ip_is_warning_only() {
        let yaml = VALID.replace("203.0.113.10", "not-an-ip");
        let p = parse_project(&yaml).unwrap();
        assert!(validate_project(&p, &[]).is_empty());
        let warnings = project_warnings(&p, &[]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("not-an-ip/32"));
    }

    #[test]
    fn test_bad_region() {
        let yaml = VALID.replace("ap-northeast-1", "Tokyo");
        let errors = validate_project(&parse_project(&yaml).unwrap(), &[]);
        assert!(errors.iter().any(|e| e.message.contains("region")));
    }

    #[test]
    fn test_overrides_supply_required_keys() {
        let yaml = VALID.replace("  keypair: ops\n", "");
        let p = parse_project(&yaml).unwrap();
        assert_eq!(validate_project(&p, &[]).len(), 1);

        let overrides = vec![crate::core::resolver::parse_override("keypair=ops").unwrap()];
        assert!(validate_project(&p, &overrides).is_empty());

        let null = vec![crate::core::resolver::parse_override("keypair=null").unwrap()];
        assert_eq!(validate_project(&p, &null).len(), 1);
    }

    #[test]
    fn test_override_allowips_checked() {
        let p = parse_project(VALID).unwrap();
        let overrides = vec![crate::core::resolver::parse_override("allowips=[not-an-ip]").unwrap()];
        assert!(validate_project(&p, &overrides).is_empty());
        let warnings = project_warnings(&p, &overrides);
        assert_eq!(warnings.len(), 1);

        let bad = vec![crate::core::resolver::parse_override("allowips={a: 1}").unwrap()];
        assert!(validate_project(&p, &bad)
            .iter()
            .any(|e| e.message.contains("allowips")));
    }
}
