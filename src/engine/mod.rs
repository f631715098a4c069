//! Provisioning engine hand-off.
//!
//! The engine turns a synthesized template into live resources. This crate
//! only submits the template and surfaces the engine's verdict unchanged;
//! waiting, retries, and rollback are the engine's business.

pub mod aws;

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Output of one engine invocation.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// What to deploy, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub stack: String,
    pub template_path: PathBuf,
    pub region: Option<String>,
    pub profile: Option<String>,
}

/// External system that applies a template.
pub trait ProvisioningEngine {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Command line the engine would run, for dry runs.
    fn describe(&self, req: &DeployRequest) -> String;

    /// Run the deployment. An `Ok` carries the raw output, successful or not.
    fn deploy(&self, req: &DeployRequest) -> Result<ExecOutput>;
}

/// Submit `req` and turn a non-zero exit into `ExternalProvisioningFailure`.
/// stderr is passed through verbatim.
pub fn submit(engine: &dyn ProvisioningEngine, req: &DeployRequest) -> Result<ExecOutput> {
    tracing::info!(engine = engine.name(), stack = %req.stack, "submitting template");
    let out = engine.deploy(req)?;
    if out.success() {
        return Ok(out);
    }
    tracing::error!(stack = %req.stack, exit_code = out.exit_code, "provisioning failed");
    Err(Error::ExternalProvisioningFailure {
        stack: req.stack.clone(),
        exit_code: out.exit_code,
        stderr: out.stderr,
    })
}
