//! Synthesis orchestration.
//!
//! resolve → build → order → render → hash → write template and manifest
//! → events. Nothing reaches the output directory until the whole graph
//! has been built and rendered, and both files are staged before either is
//! renamed into place, so a failure leaves the previous pair untouched.

use super::builder;
use super::codegen;
use super::graph::StackGraph;
use super::planner;
use super::resolver;
use super::state;
use super::types::*;
use crate::engine::{self, DeployRequest, ProvisioningEngine};
use crate::error::Result;
use crate::tripwire::{eventlog, hasher};
use std::path::Path;
use std::time::Instant;

/// Inputs of one synthesis run.
pub struct SynthConfig<'a> {
    pub project: &'a ProjectConfig,
    pub overrides: &'a [(String, serde_yaml_ng::Value)],
    pub env: &'a Environment,
    pub out_dir: &'a Path,
    /// Record provenance events
    pub tripwire: bool,
}

/// A fully built and rendered stack, not yet written.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub config: StackConfig,
    pub graph: StackGraph,
    pub execution_order: Vec<String>,
    pub template: serde_json::Value,
}

impl Synthesis {
    /// Outputs rendered as strings: literals as-is, expressions as JSON.
    pub fn rendered_outputs(&self) -> indexmap::IndexMap<String, String> {
        self.graph
            .outputs()
            .iter()
            .map(|(name, o)| {
                let value = match o.value.as_literal() {
                    Some(s) => s.to_string(),
                    None => codegen::render_token(&o.value).to_string(),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// Build and render without touching the filesystem.
pub fn prepare(cfg: &SynthConfig) -> Result<Synthesis> {
    let config = resolver::resolve_config(cfg.project, cfg.overrides, cfg.env)?;
    let graph = builder::build_topology(&config)?;
    let execution_order = resolver::build_execution_order(&graph)?;
    let template = codegen::render_template(&graph);
    Ok(Synthesis {
        config,
        graph,
        execution_order,
        template,
    })
}

fn log_event(cfg: &SynthConfig, event: ProvenanceEvent) {
    if !cfg.tripwire {
        return;
    }
    if let Err(e) = eventlog::append_event(cfg.out_dir, event) {
        tracing::warn!(error = %e, "could not record provenance event");
    }
}

/// Synthesize the stack into the output directory.
pub fn synthesize(cfg: &SynthConfig) -> Result<SynthResult> {
    let start = Instant::now();
    let run_id = eventlog::generate_run_id();
    let stack = cfg.project.name.clone();

    log_event(
        cfg,
        ProvenanceEvent::SynthStarted {
            stack: stack.clone(),
            run_id: run_id.clone(),
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );

    match synthesize_inner(cfg, &run_id, start) {
        Ok(result) => Ok(result),
        Err(e) => {
            tracing::error!(stack = %stack, error = %e, "synthesis failed");
            log_event(
                cfg,
                ProvenanceEvent::SynthFailed {
                    stack,
                    run_id,
                    error: e.to_string(),
                },
            );
            Err(e)
        }
    }
}

fn synthesize_inner(cfg: &SynthConfig, run_id: &str, start: Instant) -> Result<SynthResult> {
    let synth = prepare(cfg)?;
    let stack = synth.graph.name().to_string();

    let text = state::template_text(&synth.template)?;
    let template_hash = hasher::hash_string(&text);

    let mut manifest = state::new_manifest(&stack, &template_hash);
    manifest.resources =
        planner::hash_rendered_resources(&synth.graph, &synth.template, &synth.execution_order);
    manifest.outputs = synth.rendered_outputs();
    state::write_synthesis(cfg.out_dir, &text, &manifest)?;

    for (id, lock) in &manifest.resources {
        log_event(
            cfg,
            ProvenanceEvent::ResourceDeclared {
                stack: stack.clone(),
                resource: id.clone(),
                resource_type: lock.resource_type.clone(),
                hash: lock.hash.clone(),
            },
        );
    }

    let total_duration = start.elapsed();
    log_event(
        cfg,
        ProvenanceEvent::SynthCompleted {
            stack: stack.clone(),
            run_id: run_id.to_string(),
            resources: manifest.resources.len() as u32,
            outputs: manifest.outputs.len() as u32,
            template_hash: template_hash.clone(),
            total_seconds: total_duration.as_secs_f64(),
        },
    );
    tracing::info!(
        stack = %stack,
        resources = manifest.resources.len(),
        "template written"
    );

    Ok(SynthResult {
        template_path: state::template_path(cfg.out_dir, &stack),
        manifest_path: state::manifest_path(cfg.out_dir, &stack),
        stack,
        template_hash,
        resources: manifest.resources.len() as u32,
        outputs: manifest.outputs,
        total_duration,
    })
}

/// Compare a fresh synthesis against the last written manifest.
pub fn diff(cfg: &SynthConfig) -> Result<DiffPlan> {
    let synth = prepare(cfg)?;
    let previous = state::load_manifest(cfg.out_dir, synth.graph.name())?;
    Ok(planner::plan(
        &synth.graph,
        &synth.template,
        &synth.execution_order,
        previous.as_ref(),
    ))
}

/// Deployment options beyond the synthesis inputs.
pub struct DeployOptions<'a> {
    pub profile: Option<&'a str>,
    pub dry_run: bool,
}

/// Outcome of a deploy: the command line for dry runs, or the engine output.
#[derive(Debug, Clone)]
pub enum DeployOutcome {
    DryRun { command: String },
    Submitted(engine::ExecOutput),
}

/// Synthesize, then hand the template to the provisioning engine.
pub fn deploy(
    cfg: &SynthConfig,
    engine: &dyn ProvisioningEngine,
    opts: &DeployOptions,
) -> Result<(SynthResult, DeployOutcome)> {
    let result = synthesize(cfg)?;
    let region = cfg
        .env
        .region
        .clone()
        .or_else(|| cfg.project.env.region.clone());
    let req = DeployRequest {
        stack: result.stack.clone(),
        template_path: result.template_path.clone(),
        region,
        profile: opts.profile.map(String::from),
    };

    if opts.dry_run {
        let command = engine.describe(&req);
        return Ok((result, DeployOutcome::DryRun { command }));
    }

    let run_id = eventlog::generate_run_id();
    log_event(
        cfg,
        ProvenanceEvent::DeploySubmitted {
            stack: result.stack.clone(),
            run_id: run_id.clone(),
            template_hash: result.template_hash.clone(),
        },
    );
    match engine::submit(engine, &req) {
        Ok(out) => Ok((result, DeployOutcome::Submitted(out))),
        Err(e) => {
            log_event(
                cfg,
                ProvenanceEvent::DeployFailed {
                    stack: result.stack.clone(),
                    run_id,
                    error: e.to_string(),
                },
            );
            Err(e)
        }
    }
}
