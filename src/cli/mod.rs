//! CLI subcommands.

use crate::core::{executor, parser, resolver, state, types};
use crate::engine::aws::AwsCliEngine;
use crate::error::{Error, Result};
use crate::tripwire::{drift, eventlog};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Inputs shared by every command that synthesizes.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Path to cfalbasg.yaml
    #[arg(short, long, default_value = "cfalbasg.yaml")]
    pub file: PathBuf,

    /// Context override (repeatable), wins over the project file
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// Target account
    #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
    pub account: Option<String>,

    /// Target region
    #[arg(long, env = "CDK_DEFAULT_REGION")]
    pub region: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = state::DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,

    /// Do not append to the provenance event log
    #[arg(long)]
    pub no_events: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new project file
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate cfalbasg.yaml without synthesizing
    Validate {
        /// Path to cfalbasg.yaml
        #[arg(short, long, default_value = "cfalbasg.yaml")]
        file: PathBuf,
    },

    /// Synthesize the CloudFormation template
    Synth {
        #[command(flatten)]
        stack: StackArgs,

        /// Also print the template to stdout
        #[arg(long)]
        print: bool,
    },

    /// Show what would change against the last synthesis
    Diff {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Synthesize and hand the template to the provisioning engine
    Deploy {
        #[command(flatten)]
        stack: StackArgs,

        /// Named AWS CLI profile
        #[arg(long)]
        profile: Option<String>,

        /// AWS CLI executable
        #[arg(long, env = "CFALBASG_AWS_CLI", default_value = "aws")]
        aws_cli: String,

        /// Print the engine command without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Detect edits to the synthesized template (tripwire)
    Drift {
        /// Path to cfalbasg.yaml
        #[arg(short, long, default_value = "cfalbasg.yaml")]
        file: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = state::DEFAULT_OUT_DIR)]
        out_dir: PathBuf,

        /// Exit non-zero on any drift (for CI/cron)
        #[arg(long)]
        tripwire: bool,
    },

    /// Show synthesized stacks and recent events
    Status {
        /// Output directory
        #[arg(short, long, default_value = state::DEFAULT_OUT_DIR)]
        out_dir: PathBuf,
    },

    /// Print the JSON schema of cfalbasg.yaml
    Schema,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Synth { stack, print } => cmd_synth(&stack, print),
        Commands::Diff { stack } => cmd_diff(&stack),
        Commands::Deploy {
            stack,
            profile,
            aws_cli,
            dry_run,
        } => cmd_deploy(&stack, profile.as_deref(), &aws_cli, dry_run),
        Commands::Drift {
            file,
            out_dir,
            tripwire,
        } => cmd_drift(&file, &out_dir, tripwire),
        Commands::Status { out_dir } => cmd_status(&out_dir),
        Commands::Schema => cmd_schema(),
    }
}

const PROJECT_TEMPLATE: &str = r#"version: "1.0"
name: CfAlbAsgStack
description: "CloudFront + ALB + Auto Scaling"

env:
  account: null
  region: ap-northeast-1

context:
  mydomain: example.com
  myhost: www
  keypair: my-keypair
  # hostedzoneid: Z0000000000000
  allowips:
    - ip: 203.0.113.10
      description: office
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let config_path = path.join("cfalbasg.yaml");
    if config_path.exists() {
        return Err(Error::Usage(format!(
            "{} already exists",
            config_path.display()
        )));
    }
    std::fs::create_dir_all(path).map_err(|e| Error::io(path, e))?;
    std::fs::write(&config_path, PROJECT_TEMPLATE).map_err(|e| Error::io(&config_path, e))?;

    println!("Initialized cfalbasg project at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn print_warnings(project: &types::ProjectConfig, overrides: &[(String, serde_yaml_ng::Value)]) {
    for w in parser::project_warnings(project, overrides) {
        tracing::warn!("{}", w);
        eprintln!("  WARNING: {}", w);
    }
}

fn cmd_validate(file: &Path) -> Result<()> {
    let project = parser::parse_project_file(file)?;
    let errors = parser::validate_project(&project, &[]);
    print_warnings(&project, &[]);

    if errors.is_empty() {
        println!(
            "OK: {} ({} context keys)",
            project.name,
            project.context.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(Error::Validation {
            count: errors.len(),
        })
    }
}

/// Parse and validate a project file with its overrides applied, returning
/// errors if invalid.
fn parse_and_validate(
    file: &Path,
    overrides: &[(String, serde_yaml_ng::Value)],
) -> Result<types::ProjectConfig> {
    let project = parser::parse_project_file(file)?;
    let errors = parser::validate_project(&project, overrides);
    if errors.is_empty() {
        print_warnings(&project, overrides);
        return Ok(project);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(Error::Validation {
        count: errors.len(),
    })
}

/// Everything a synthesis run needs, owned.
struct Prepared {
    project: types::ProjectConfig,
    overrides: Vec<(String, serde_yaml_ng::Value)>,
    env: types::Environment,
}

impl Prepared {
    fn load(args: &StackArgs) -> Result<Self> {
        let overrides: Vec<_> = args
            .context
            .iter()
            .map(|raw| resolver::parse_override(raw))
            .collect::<Result<_>>()?;
        Ok(Self {
            project: parse_and_validate(&args.file, &overrides)?,
            overrides,
            env: types::Environment {
                account: args.account.clone(),
                region: args.region.clone(),
            },
        })
    }

    fn synth_config<'a>(&'a self, args: &'a StackArgs) -> executor::SynthConfig<'a> {
        executor::SynthConfig {
            project: &self.project,
            overrides: &self.overrides,
            env: &self.env,
            out_dir: &args.out_dir,
            tripwire: !args.no_events,
        }
    }
}

fn print_synth_result(result: &types::SynthResult) {
    println!(
        "Synthesized {}: {} resources ({:.2}s)",
        result.stack,
        result.resources,
        result.total_duration.as_secs_f64()
    );
    println!("  Template: {}", result.template_path.display());
    println!("  Manifest: {}", result.manifest_path.display());
    println!("  Hash:     {}", result.template_hash);
    for (name, value) in &result.outputs {
        println!("  Output {} = {}", name, value);
    }
}

fn cmd_synth(args: &StackArgs, print: bool) -> Result<()> {
    let prepared = Prepared::load(args)?;
    let result = executor::synthesize(&prepared.synth_config(args))?;
    if print {
        let text = std::fs::read_to_string(&result.template_path)
            .map_err(|e| Error::io(&result.template_path, e))?;
        print!("{}", text);
    } else {
        print_synth_result(&result);
    }
    Ok(())
}

/// Display a diff plan to stdout.
fn print_plan(plan: &types::DiffPlan) {
    println!("Diff: {} ({} resources)", plan.name, plan.changes.len());
    println!();
    for change in &plan.changes {
        let symbol = match change.action {
            types::PlanAction::Create => "+",
            types::PlanAction::Update => "~",
            types::PlanAction::Destroy => "-",
            types::PlanAction::NoOp => " ",
        };
        println!("  {} [{}] {}", symbol, change.resource_type, change.description);
    }
    println!();
    println!(
        "Diff: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn cmd_diff(args: &StackArgs) -> Result<()> {
    let prepared = Prepared::load(args)?;
    let plan = executor::diff(&prepared.synth_config(args))?;
    print_plan(&plan);
    Ok(())
}

fn cmd_deploy(args: &StackArgs, profile: Option<&str>, aws_cli: &str, dry_run: bool) -> Result<()> {
    let prepared = Prepared::load(args)?;
    let engine = AwsCliEngine::with_program(aws_cli);
    let (result, outcome) = executor::deploy(
        &prepared.synth_config(args),
        &engine,
        &executor::DeployOptions { profile, dry_run },
    )?;
    print_synth_result(&result);

    match outcome {
        executor::DeployOutcome::DryRun { command } => {
            println!("Dry run, not submitted:");
            println!("  {}", command);
        }
        executor::DeployOutcome::Submitted(out) => {
            print!("{}", out.stdout);
            println!("Deploy submitted: {}", result.stack);
        }
    }
    Ok(())
}

fn cmd_drift(file: &Path, out_dir: &Path, tripwire_mode: bool) -> Result<()> {
    let project = parser::parse_project_file(file)?;
    let manifest = state::load_manifest(out_dir, &project.name)?.ok_or_else(|| {
        Error::Usage(format!(
            "no manifest for {} in {}; run synth first",
            project.name,
            out_dir.display()
        ))
    })?;

    let template = state::template_path(out_dir, &project.name);
    println!(
        "Checking {} ({} resources)...",
        manifest.stack,
        manifest.resources.len()
    );
    let findings = drift::detect_drift(&template, &manifest)?;

    if findings.is_empty() {
        println!("No drift detected.");
        return Ok(());
    }
    for f in &findings {
        println!("  DRIFTED: {} [{}] ({})", f.resource_id, f.resource_type, f.detail);
        println!("    Expected: {}", f.expected_hash);
        println!("    Actual:   {}", f.actual_hash);
    }
    println!();
    println!("Drift detected: {} finding(s)", findings.len());
    if tripwire_mode {
        return Err(Error::Drift {
            count: findings.len(),
        });
    }
    Ok(())
}

fn cmd_status(out_dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(out_dir).map_err(|e| Error::io(out_dir, e))?;

    let mut stacks: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_suffix(".manifest.yaml").map(String::from)
        })
        .collect();
    stacks.sort();

    for stack in &stacks {
        if let Some(m) = state::load_manifest(out_dir, stack)? {
            println!("Stack: {}", m.stack);
            println!("  Generated: {}", m.generated_at);
            println!("  Generator: {}", m.generator);
            println!("  Template:  {}", m.template_hash);
            println!("  Resources: {}", m.resources.len());
            for (name, value) in &m.outputs {
                println!("  Output {} = {}", name, value);
            }
        }
    }
    if stacks.is_empty() {
        println!("No synthesized stacks in {}", out_dir.display());
    }

    let events = eventlog::read_events(out_dir)?;
    if let Some(last) = events.last() {
        println!();
        println!("Events: {} (last at {})", events.len(), last.ts);
    }
    Ok(())
}

fn cmd_schema() -> Result<()> {
    let schema = schemars::schema_for!(types::ProjectConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
