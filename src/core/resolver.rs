//! Context resolution, construct IDs, and resource ordering.
//!
//! Resolves the context store (project file context plus `-c` overrides)
//! into a flat `StackConfig`. Derives unique IDs from construct paths and
//! computes a topological order of the graph using Kahn's algorithm with
//! deterministic (alphabetical) tie-breaking.

use super::graph::StackGraph;
use super::types::*;
use crate::error::{Error, Result};
use crate::tripwire::hasher::path_hash;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Path component dropped from every ID.
const HIDDEN_ID: &str = "Default";
/// Path component dropped from the human-readable part of an ID only.
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";
const MAX_HUMAN_LEN: usize = 240;

pub const DEFAULT_MAX_AZS: u8 = 2;
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.medium";
pub const DEFAULT_BASTION_INSTANCE_TYPE: &str = "t2.micro";
pub const DEFAULT_USER_DATA: &[&str] = &[
    "sudo amazon-linux-extras install nginx1.12",
    "sudo systemctl start nginx",
];

/// Named key-value store of deployment parameters. Overrides shadow the
/// project file.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    values: IndexMap<String, Value>,
}

impl ContextStore {
    pub fn new(context: &IndexMap<String, Value>) -> Self {
        Self {
            values: context.clone(),
        }
    }

    /// Apply `key=value` overrides. Later overrides win.
    pub fn with_overrides(mut self, overrides: &[(String, Value)]) -> Self {
        for (k, v) in overrides {
            self.values.insert(k.clone(), v.clone());
        }
        self
    }

    /// Look up a key. `None` when absent or explicitly null.
    pub fn try_get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// Look up a required key.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.try_get(key).ok_or_else(|| Error::MissingConfiguration {
            key: key.to_string(),
        })
    }

    /// Required scalar rendered as a string.
    pub fn get_string(&self, key: &str) -> Result<String> {
        scalar(key, self.get(key)?)
    }

    /// Optional scalar rendered as a string, falling back to `default`.
    pub fn string_or(&self, key: &str, default: &str) -> Result<String> {
        match self.try_get(key) {
            Some(v) => scalar(key, v),
            None => Ok(default.to_string()),
        }
    }
}

fn scalar(key: &str, value: &Value) -> Result<String> {
    yaml_value_to_string(value).ok_or_else(|| Error::InvalidContext {
        key: key.to_string(),
        message: "expected a scalar".to_string(),
    })
}

/// Parse a `key=value` override. The value is read as YAML, so lists and
/// numbers keep their type.
pub fn parse_override(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::Usage(format!("context override '{}' is not key=value", raw)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::Usage(format!(
            "context override '{}' has an empty key",
            raw
        )));
    }
    let value = if value.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml_ng::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };
    Ok((key.to_string(), value))
}

/// Parse the `allowips` list. Entries are either `{ip, description}` maps
/// or bare strings. IPs are not validated.
pub fn parse_allow_ips(value: &Value) -> Result<Vec<AllowIp>> {
    let invalid = |message: String| Error::InvalidContext {
        key: "allowips".to_string(),
        message,
    };
    let items = value
        .as_sequence()
        .ok_or_else(|| invalid("expected a list".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Mapping(_) => serde_yaml_ng::from_value::<AllowIp>(item.clone())
                .map_err(|e| invalid(format!("entry {}: {}", i, e))),
            other => yaml_value_to_string(other)
                .map(|ip| AllowIp {
                    ip,
                    description: None,
                })
                .ok_or_else(|| invalid(format!("entry {}: expected a map or string", i))),
        })
        .collect()
}

/// Resolve the context store into the builder's configuration.
///
/// `env` comes from CLI flags and the process environment; any field set
/// there wins over the project file.
pub fn resolve_config(
    project: &ProjectConfig,
    overrides: &[(String, Value)],
    env: &Environment,
) -> Result<StackConfig> {
    let ctx = ContextStore::new(&project.context).with_overrides(overrides);

    let domain = ctx.get_string("mydomain")?;
    let hostname = ctx.get_string("myhost")?;
    let keypair = ctx.get_string("keypair")?;
    let allow_ips = parse_allow_ips(ctx.get("allowips")?)?;

    let max_azs = match ctx.try_get("maxazs") {
        None => DEFAULT_MAX_AZS,
        Some(v) => v
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .filter(|n| (1..=6).contains(n))
            .ok_or_else(|| Error::InvalidContext {
                key: "maxazs".to_string(),
                message: "expected an integer between 1 and 6".to_string(),
            })?,
    };

    let user_data = match ctx.try_get("userdata") {
        None => DEFAULT_USER_DATA.iter().map(|s| s.to_string()).collect(),
        Some(v) => v
            .as_sequence()
            .ok_or_else(|| Error::InvalidContext {
                key: "userdata".to_string(),
                message: "expected a list of commands".to_string(),
            })?
            .iter()
            .map(|c| scalar("userdata", c))
            .collect::<Result<Vec<_>>>()?,
    };

    let cert_host = ctx.string_or("certhost", &hostname)?;
    let hosted_zone_id = match ctx.try_get("hostedzoneid") {
        Some(v) => Some(scalar("hostedzoneid", v)?),
        None => None,
    };

    tracing::debug!(
        domain = %domain,
        hostname = %hostname,
        allowips = allow_ips.len(),
        "context resolved"
    );

    Ok(StackConfig {
        stack_name: project.name.clone(),
        description: project.description.clone(),
        environment: Environment {
            account: env.account.clone().or_else(|| project.env.account.clone()),
            region: env.region.clone().or_else(|| project.env.region.clone()),
        },
        domain,
        hostname,
        keypair,
        allow_ips,
        max_azs,
        instance_type: ctx.string_or("instancetype", DEFAULT_INSTANCE_TYPE)?,
        bastion_instance_type: ctx.string_or("bastioninstancetype", DEFAULT_BASTION_INSTANCE_TYPE)?,
        user_data,
        cert_host,
        hosted_zone_id,
    })
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Unique ID of a construct path.
///
/// `Default` components are dropped. A single remaining component is its
/// own ID. Otherwise the human part (consecutive duplicates collapsed,
/// `Resource` dropped, non-alphanumerics removed) is suffixed with the
/// path hash.
pub fn unique_id(components: &[&str]) -> Result<String> {
    let components: Vec<&str> = components
        .iter()
        .copied()
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    match components.as_slice() {
        [] => Err(Error::Usage(
            "unable to calculate a unique id for an empty path".to_string(),
        )),
        [only] => Ok(remove_non_alphanumeric(only)),
        _ => {
            let hash = path_hash(&components);
            let mut human = String::new();
            let mut prev: Option<&str> = None;
            for c in &components {
                if prev == Some(*c) {
                    continue;
                }
                prev = Some(c);
                if *c != HIDDEN_FROM_HUMAN_ID {
                    human.push_str(&remove_non_alphanumeric(c));
                }
            }
            human.truncate(MAX_HUMAN_LEN);
            Ok(format!("{}{}", human, hash))
        }
    }
}

/// Build a topological execution order from the graph's edges.
/// Uses Kahn's algorithm with alphabetical tie-breaking for determinism.
pub fn build_execution_order(graph: &StackGraph) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for id in graph.nodes().keys() {
        in_degree.insert(id, 0);
        adjacency.insert(id, Vec::new());
    }

    for (id, node) in graph.nodes() {
        for dep in node.edges() {
            let dependents = adjacency
                .get_mut(dep)
                .ok_or_else(|| Error::InvalidReference {
                    from: id.clone(),
                    to: dep.to_string(),
                })?;
            dependents.push(id);
            if let Some(d) = in_degree.get_mut(id.as_str()) {
                *d += 1;
            }
        }
    }

    let mut zero_degree: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    zero_degree.sort_unstable();
    let mut queue: VecDeque<&str> = zero_degree.into();

    let mut order = Vec::with_capacity(graph.nodes().len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready: Vec<&str> = Vec::new();
        if let Some(neighbors) = adjacency.get(current) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(neighbor);
                    }
                }
            }
        }
        next_ready.sort_unstable();
        queue.extend(next_ready);
    }

    if order.len() != graph.nodes().len() {
        let ordered: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let members = graph
            .nodes()
            .keys()
            .filter(|id| !ordered.contains(id.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        return Err(Error::DependencyCycle { members });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::StackGraphBuilder;
    use crate::resources::{cdn, ResourceKind};

    fn project(yaml_context: &str) -> ProjectConfig {
        let yaml = format!(
            "version: \"1.0\"\nname: Site\ncontext:\n{}",
            yaml_context
        );
        serde_yaml_ng::from_str(&yaml).unwrap()
    }

    const FULL: &str = r#"
  mydomain: example.com
  myhost: www
  keypair: ops
  allowips:
    - ip: 203.0.113.10
      description: office
    - 198.51.100.7
"#;

    #[test]
    fn test_resolve_defaults() {
        let cfg = resolve_config(&project(FULL), &[], &Environment::default()).unwrap();
        assert_eq!(cfg.domain, "example.com");
        assert_eq!(cfg.hostname, "www");
        assert_eq!(cfg.keypair, "ops");
        assert_eq!(cfg.max_azs, 2);
        assert_eq!(cfg.instance_type, "t2.medium");
        assert_eq!(cfg.bastion_instance_type, "t2.micro");
        assert_eq!(cfg.cert_host, "www");
        assert_eq!(cfg.user_data.len(), 2);
        assert!(cfg.hosted_zone_id.is_none());
        assert_eq!(cfg.allow_ips.len(), 2);
        assert_eq!(cfg.allow_ips[0].description.as_deref(), Some("office"));
        assert_eq!(cfg.allow_ips[1].ip, "198.51.100.7");
        assert_eq!(cfg.site_name(), "www.example.com");
    }

    #[test]
    fn test_missing_key_is_named() {
        let p = project("  mydomain: example.com\n  myhost: www\n  allowips: []\n");
        let err = resolve_config(&p, &[], &Environment::default()).unwrap_err();
        assert!(matches!(err, Error::MissingConfiguration { ref key } if key == "keypair"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let p = project("  mydomain: ~\n  myhost: www\n  keypair: k\n  allowips: []\n");
        let err = resolve_config(&p, &[], &Environment::default()).unwrap_err();
        assert!(matches!(err, Error::MissingConfiguration { ref key } if key == "mydomain"));
    }

    #[test]
    fn test_empty_allowlist_is_valid() {
        let p = project("  mydomain: a.io\n  myhost: h\n  keypair: k\n  allowips: []\n");
        let cfg = resolve_config(&p, &[], &Environment::default()).unwrap();
        assert!(cfg.allow_ips.is_empty());
    }

    #[test]
    fn test_allowips_wrong_shape() {
        let p = project("  mydomain: a.io\n  myhost: h\n  keypair: k\n  allowips: 10.0.0.1\n");
        let err = resolve_config(&p, &[], &Environment::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidContext { ref key, .. } if key == "allowips"));
    }

    #[test]
    fn test_overrides_win() {
        let overrides = vec![
            parse_override("myhost=api").unwrap(),
            parse_override("maxazs=3").unwrap(),
            parse_override("certhost=cfalbasg").unwrap(),
        ];
        let cfg = resolve_config(&project(FULL), &overrides, &Environment::default()).unwrap();
        assert_eq!(cfg.hostname, "api");
        assert_eq!(cfg.max_azs, 3);
        assert_eq!(cfg.certificate_name(), "cfalbasg.example.com");
    }

    #[test]
    fn test_maxazs_out_of_range() {
        let overrides = vec![parse_override("maxazs=0").unwrap()];
        let err = resolve_config(&project(FULL), &overrides, &Environment::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidContext { ref key, .. } if key == "maxazs"));
    }

    #[test]
    fn test_env_flags_win_over_file() {
        let mut p = project(FULL);
        p.env.region = Some("us-east-1".to_string());
        p.env.account = Some("111111111111".to_string());
        let env = Environment {
            account: None,
            region: Some("ap-northeast-1".to_string()),
        };
        let cfg = resolve_config(&p, &[], &env).unwrap();
        assert_eq!(cfg.environment.region.as_deref(), Some("ap-northeast-1"));
        assert_eq!(cfg.environment.account.as_deref(), Some("111111111111"));
    }

    #[test]
    fn test_parse_override_forms() {
        let (k, v) = parse_override("allowips=[1.2.3.4]").unwrap();
        assert_eq!(k, "allowips");
        assert_eq!(parse_allow_ips(&v).unwrap()[0].ip, "1.2.3.4");
        let (_, v) = parse_override("myhost=").unwrap();
        assert_eq!(v, Value::String(String::new()));
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=x").is_err());
    }

    #[test]
    fn test_unique_id_single_component() {
        assert_eq!(unique_id(&["Site"]).unwrap(), "Site");
        assert_eq!(unique_id(&["my-site"]).unwrap(), "mysite");
        assert!(unique_id(&[]).is_err());
        assert!(unique_id(&["Default"]).is_err());
    }

    #[test]
    fn test_unique_id_path() {
        let id = unique_id(&["Site", "vpc"]).unwrap();
        assert!(id.starts_with("Sitevpc"));
        assert_eq!(id.len(), "Sitevpc".len() + 8);
        assert!(id[7..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_unique_id_hides_resource_and_default() {
        let a = unique_id(&["vpc", "Resource"]).unwrap();
        assert!(a.starts_with("vpc"));
        assert_eq!(a.len(), 3 + 8);
        assert_eq!(
            unique_id(&["vpc", "Default", "Resource"]).unwrap(),
            unique_id(&["vpc", "Resource"]).unwrap()
        );
        // hash still covers components hidden from the human part
        let b = unique_id(&["vpc", "Resource", "Resource"]).unwrap();
        assert_eq!(&b[..3], "vpc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_unique_id_collapses_duplicates() {
        let id = unique_id(&["alb", "alb", "x"]).unwrap();
        assert!(id.starts_with("albx"));
    }

    fn bucket() -> ResourceKind {
        ResourceKind::Bucket(cdn::Bucket)
    }

    #[test]
    fn test_execution_order_alphabetical_ties() {
        let mut b = StackGraphBuilder::new("S", None);
        b.add("c", "S/c", bucket()).unwrap();
        b.add("a", "S/a", bucket()).unwrap();
        b.add("b", "S/b", bucket()).unwrap();
        b.depends_on("a", "c").unwrap();
        let order = build_execution_order(&b.finish()).unwrap();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_execution_order_respects_token_edges() {
        use crate::resources::network;
        let mut b = StackGraphBuilder::new("S", None);
        b.add(
            "zvpc",
            "S/vpc",
            ResourceKind::Vpc(network::Vpc {
                cidr: "10.0.0.0/16".to_string(),
                max_azs: 1,
            }),
        )
        .unwrap();
        b.add(
            "artable",
            "S/rt",
            ResourceKind::RouteTable(network::RouteTable {
                vpc: Token::reference("zvpc"),
            }),
        )
        .unwrap();
        let order = build_execution_order(&b.finish()).unwrap();
        assert_eq!(order, vec!["zvpc", "artable"]);
    }
}
