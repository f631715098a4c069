//! Core types: project file schema, resolved stack configuration, graph
//! tokens, diff plan, synthesis manifest, and provenance events.
//!
//! Everything read from or written to disk derives Serialize/Deserialize so
//! the project file and manifest roundtrip through YAML.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Project file (cfalbasg.yaml)
// ============================================================================

/// Root project file: stack identity, environment and the context store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Stack name; also the root of every construct path
    pub name: String,

    /// Optional template description
    #[serde(default)]
    pub description: Option<String>,

    /// Target account / region
    #[serde(default)]
    pub env: Environment,

    /// Context store: deployment-time parameters (order-preserving)
    #[serde(default)]
    #[schemars(with = "std::collections::BTreeMap<String, serde_json::Value>")]
    pub context: IndexMap<String, serde_yaml_ng::Value>,
}

/// Deployment environment. Either field may be filled from the process
/// environment at the CLI boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Environment {
    #[serde(default)]
    pub account: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// One administrator allowlist entry. `ip` is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AllowIp {
    pub ip: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// Flat parameter set consumed by the topology builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub stack_name: String,
    pub description: Option<String>,
    pub environment: Environment,
    pub domain: String,
    pub hostname: String,
    pub keypair: String,
    pub allow_ips: Vec<AllowIp>,
    pub max_azs: u8,
    pub instance_type: String,
    pub bastion_instance_type: String,
    pub user_data: Vec<String>,
    pub cert_host: String,
    pub hosted_zone_id: Option<String>,
}

impl StackConfig {
    /// Fully-qualified name served by the distribution.
    pub fn site_name(&self) -> String {
        format!("{}.{}", self.hostname, self.domain)
    }

    /// Name the certificate is issued for.
    pub fn certificate_name(&self) -> String {
        format!("{}.{}", self.cert_host, self.domain)
    }
}

// ============================================================================
// Graph tokens
// ============================================================================

/// A value inside a resource declaration. Non-literal tokens are cross
/// references the provisioning engine resolves at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    /// Primary identifier of another resource
    Ref(String),
    /// Attribute of another resource
    Att { resource: String, attribute: String },
    /// Template parameter
    Param(String),
    /// N-th availability zone of the deployment region
    AvailabilityZone(u8),
    /// Concatenation of tokens
    Join(Vec<Token>),
}

impl Token {
    pub fn lit(s: impl Into<String>) -> Self {
        Self::Literal(s.into())
    }

    pub fn reference(id: &str) -> Self {
        Self::Ref(id.to_string())
    }

    pub fn att(id: &str, attribute: &str) -> Self {
        Self::Att {
            resource: id.to_string(),
            attribute: attribute.to_string(),
        }
    }

    /// Resource logical IDs this token points at.
    pub fn resource_refs(&self) -> Vec<&str> {
        match self {
            Self::Ref(id) => vec![id.as_str()],
            Self::Att { resource, .. } => vec![resource.as_str()],
            Self::Join(parts) => parts.iter().flat_map(Token::resource_refs).collect(),
            Self::Literal(_) | Self::Param(_) | Self::AvailabilityZone(_) => vec![],
        }
    }

    /// Template parameter names this token points at.
    pub fn param_refs(&self) -> Vec<&str> {
        match self {
            Self::Param(name) => vec![name.as_str()],
            Self::Join(parts) => parts.iter().flat_map(Token::param_refs).collect(),
            _ => vec![],
        }
    }

    /// The literal value, if this token is one.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

// ============================================================================
// Security rules
// ============================================================================

/// IP protocol of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    /// Every protocol, rendered as `-1`
    All,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::All => write!(f, "-1"),
        }
    }
}

/// Traffic source (ingress) or destination (egress).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// CIDR, passed through uninterpreted
    Ipv4(String),
    AnyIpv4,
    SecurityGroup(Token),
}

impl Peer {
    /// Single-address peer: `<ip>/32`.
    pub fn host(ip: &str) -> Self {
        Self::Ipv4(format!("{}/32", ip))
    }
}

/// (protocol, port, peer) triple attached to a security boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRule {
    pub protocol: Protocol,
    pub port: u16,
    pub peer: Peer,
    pub description: Option<String>,
}

impl SecurityRule {
    pub fn tcp(port: u16, peer: Peer) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port,
            peer,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

// ============================================================================
// Diff plan
// ============================================================================

/// Action the engine will take on a resource, relative to the last synth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// Logical ID
    pub resource_id: String,

    /// CloudFormation resource type
    pub resource_type: String,

    pub action: PlanAction,

    /// Human-readable description
    pub description: String,
}

/// Full diff between two synthesis passes.
#[derive(Debug, Clone)]
pub struct DiffPlan {
    /// Stack name
    pub name: String,

    pub changes: Vec<PlannedChange>,

    /// Topological order of the new graph
    pub execution_order: Vec<String>,

    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

impl DiffPlan {
    pub fn has_changes(&self) -> bool {
        self.to_create + self.to_update + self.to_destroy > 0
    }
}

// ============================================================================
// Synthesis manifest
// ============================================================================

/// Record of the last successful synthesis of a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthManifest {
    pub schema: String,

    pub stack: String,

    pub generated_at: String,

    pub generator: String,

    /// BLAKE3 of the template file as written
    pub template_hash: String,

    /// Per-resource hashes, in execution order
    pub resources: IndexMap<String, ResourceLock>,

    /// Output name -> rendered value
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

/// Per-resource manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    #[serde(rename = "type")]
    pub resource_type: String,

    /// BLAKE3 of the rendered resource
    pub hash: String,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Provenance event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    SynthStarted {
        stack: String,
        run_id: String,
        generator_version: String,
    },
    ResourceDeclared {
        stack: String,
        resource: String,
        resource_type: String,
        hash: String,
    },
    SynthCompleted {
        stack: String,
        run_id: String,
        resources: u32,
        outputs: u32,
        template_hash: String,
        total_seconds: f64,
    },
    SynthFailed {
        stack: String,
        run_id: String,
        error: String,
    },
    DeploySubmitted {
        stack: String,
        run_id: String,
        template_hash: String,
    },
    DeployFailed {
        stack: String,
        run_id: String,
        error: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ProvenanceEvent,
}

// ============================================================================
// Synthesis result
// ============================================================================

/// Result of one synthesis pass.
#[derive(Debug, Clone)]
pub struct SynthResult {
    pub stack: String,
    pub template_path: std::path::PathBuf,
    pub manifest_path: std::path::PathBuf,
    pub template_hash: String,
    pub resources: u32,
    pub outputs: IndexMap<String, String>,
    pub total_duration: std::time::Duration,
}

// ============================================================================
// Context value helper
// ============================================================================

/// Convert a serde_yaml_ng::Value scalar to a string.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> Option<String> {
    match val {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
