//! AWS CLI engine: `aws cloudformation deploy`.

use super::{DeployRequest, ExecOutput, ProvisioningEngine};
use crate::error::{Error, Result};
use std::process::{Command, Stdio};

/// Capabilities acknowledged on every deploy; the stack creates an IAM role.
pub const CAPABILITIES: &[&str] = &["CAPABILITY_IAM"];

/// Runs the AWS CLI as a child process.
#[derive(Debug, Clone)]
pub struct AwsCliEngine {
    program: String,
}

impl Default for AwsCliEngine {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
        }
    }
}

impl AwsCliEngine {
    /// Use a different executable in place of `aws`.
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    /// Arguments passed to the CLI, without the program name.
    pub fn command_args(&self, req: &DeployRequest) -> Vec<String> {
        let mut args = vec![
            "cloudformation".to_string(),
            "deploy".to_string(),
            "--stack-name".to_string(),
            req.stack.clone(),
            "--template-file".to_string(),
            req.template_path.display().to_string(),
            "--capabilities".to_string(),
        ];
        args.extend(CAPABILITIES.iter().map(|c| c.to_string()));
        args.push("--no-fail-on-empty-changeset".to_string());
        if let Some(region) = &req.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &req.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }
}

impl ProvisioningEngine for AwsCliEngine {
    fn name(&self) -> &str {
        "aws-cli"
    }

    fn describe(&self, req: &DeployRequest) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.command_args(req));
        parts.join(" ")
    }

    fn deploy(&self, req: &DeployRequest) -> Result<ExecOutput> {
        tracing::debug!(command = %self.describe(req), "spawning");
        let output = Command::new(&self.program)
            .args(self.command_args(req))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::io(&self.program, e))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(region: Option<&str>, profile: Option<&str>) -> DeployRequest {
        DeployRequest {
            stack: "Site".to_string(),
            template_path: PathBuf::from("cdk.out/Site.template.json"),
            region: region.map(String::from),
            profile: profile.map(String::from),
        }
    }

    #[test]
    fn test_command_args_minimal() {
        let args = AwsCliEngine::default().command_args(&request(None, None));
        assert_eq!(
            args,
            vec![
                "cloudformation",
                "deploy",
                "--stack-name",
                "Site",
                "--template-file",
                "cdk.out/Site.template.json",
                "--capabilities",
                "CAPABILITY_IAM",
                "--no-fail-on-empty-changeset",
            ]
        );
    }

    #[test]
    fn test_command_args_region_and_profile() {
        let args = AwsCliEngine::default().command_args(&request(Some("ap-northeast-1"), Some("ops")));
        let joined = args.join(" ");
        assert!(joined.ends_with("--region ap-northeast-1 --profile ops"));
    }

    #[test]
    fn test_describe_starts_with_program() {
        let engine = AwsCliEngine::with_program("/opt/aws");
        assert!(engine.describe(&request(None, None)).starts_with("/opt/aws cloudformation deploy"));
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let engine = AwsCliEngine::with_program("/nonexistent/cfalbasg-aws");
        assert!(matches!(engine.deploy(&request(None, None)), Err(Error::Io { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_surfaces_stderr() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-aws");
        std::fs::write(&script, "#!/bin/sh\necho \"stack $4 rejected\" >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = AwsCliEngine::with_program(&script.display().to_string());
        let err = super::super::submit(&engine, &request(None, None)).unwrap_err();
        match err {
            Error::ExternalProvisioningFailure { exit_code, stderr, .. } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "stack Site rejected\n");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
