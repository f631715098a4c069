//! Diff generation: compare a fresh synthesis against the last manifest.

use super::graph::StackGraph;
use super::types::*;
use crate::tripwire::hasher;
use indexmap::IndexMap;
use serde_json::Value;

/// Hash every rendered resource of `template`, keyed by logical ID, in
/// `execution_order`.
pub fn hash_rendered_resources(
    graph: &StackGraph,
    template: &Value,
    execution_order: &[String],
) -> IndexMap<String, ResourceLock> {
    execution_order
        .iter()
        .filter_map(|id| {
            let node = graph.get(id)?;
            let body = template.get("Resources")?.get(id)?;
            Some((
                id.clone(),
                ResourceLock {
                    resource_type: node.kind.type_name().to_string(),
                    hash: hasher::hash_json(body),
                },
            ))
        })
        .collect()
}

/// Generate a diff plan by comparing the new template to the manifest of
/// the previous synthesis. With no manifest, everything is a create.
pub fn plan(
    graph: &StackGraph,
    template: &Value,
    execution_order: &[String],
    previous: Option<&SynthManifest>,
) -> DiffPlan {
    let desired = hash_rendered_resources(graph, template, execution_order);
    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut to_destroy = 0u32;
    let mut unchanged = 0u32;

    for (id, lock) in &desired {
        let action = match previous.and_then(|m| m.resources.get(id)) {
            None => PlanAction::Create,
            Some(old) if old.hash == lock.hash && old.resource_type == lock.resource_type => {
                PlanAction::NoOp
            }
            Some(_) => PlanAction::Update,
        };
        match action {
            PlanAction::Create => to_create += 1,
            PlanAction::Update => to_update += 1,
            PlanAction::Destroy => to_destroy += 1,
            PlanAction::NoOp => unchanged += 1,
        }
        let summary = graph
            .get(id)
            .map(|n| n.kind.summary())
            .unwrap_or_default();
        changes.push(PlannedChange {
            resource_id: id.clone(),
            resource_type: lock.resource_type.clone(),
            description: describe_action(id, &summary, &action),
            action,
        });
    }

    if let Some(manifest) = previous {
        for (id, old) in &manifest.resources {
            if desired.contains_key(id) {
                continue;
            }
            to_destroy += 1;
            changes.push(PlannedChange {
                resource_id: id.clone(),
                resource_type: old.resource_type.clone(),
                description: describe_action(id, &old.resource_type, &PlanAction::Destroy),
                action: PlanAction::Destroy,
            });
        }
    }

    DiffPlan {
        name: graph.name().to_string(),
        changes,
        execution_order: execution_order.to_vec(),
        to_create,
        to_update,
        to_destroy,
        unchanged,
    }
}

fn describe_action(id: &str, summary: &str, action: &PlanAction) -> String {
    match action {
        PlanAction::Create => format!("{}: create {}", id, summary),
        PlanAction::Update => format!("{}: update {}", id, summary),
        PlanAction::Destroy => format!("{}: destroy {}", id, summary),
        PlanAction::NoOp => format!("{}: no changes", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codegen::render_template;
    use crate::core::graph::StackGraphBuilder;
    use crate::core::resolver::build_execution_order;
    use crate::resources::{cdn, network, ResourceKind};

    fn graph(cidr: &str, with_bucket: bool) -> StackGraph {
        let mut b = StackGraphBuilder::new("S", None);
        b.add(
            "vpc",
            "S/vpc",
            ResourceKind::Vpc(network::Vpc {
                cidr: cidr.to_string(),
                max_azs: 2,
            }),
        )
        .unwrap();
        if with_bucket {
            b.add("logs", "S/logs", ResourceKind::Bucket(cdn::Bucket))
                .unwrap();
        }
        b.finish()
    }

    fn manifest_for(g: &StackGraph) -> SynthManifest {
        let order = build_execution_order(g).unwrap();
        let template = render_template(g);
        SynthManifest {
            schema: "1.0".to_string(),
            stack: "S".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            generator: "test".to_string(),
            template_hash: hasher::hash_json(&template),
            resources: hash_rendered_resources(g, &template, &order),
            outputs: IndexMap::new(),
        }
    }

    fn diff(g: &StackGraph, previous: Option<&SynthManifest>) -> DiffPlan {
        let order = build_execution_order(g).unwrap();
        plan(g, &render_template(g), &order, previous)
    }

    #[test]
    fn test_plan_without_manifest_creates_all() {
        let g = graph("10.0.0.0/16", true);
        let p = diff(&g, None);
        assert_eq!(p.to_create, 2);
        assert!(p.has_changes());
        assert!(p.changes.iter().all(|c| c.action == PlanAction::Create));
        assert!(p.changes[0].description.contains("create"));
    }

    #[test]
    fn test_plan_against_own_manifest_is_noop() {
        let g = graph("10.0.0.0/16", true);
        let p = diff(&g, Some(&manifest_for(&g)));
        assert_eq!(p.unchanged, 2);
        assert!(!p.has_changes());
    }

    #[test]
    fn test_plan_update_and_destroy() {
        let old = manifest_for(&graph("10.0.0.0/16", true));
        let p = diff(&graph("10.1.0.0/16", false), Some(&old));
        assert_eq!(p.to_update, 1);
        assert_eq!(p.to_destroy, 1);
        let destroyed = p
            .changes
            .iter()
            .find(|c| c.action == PlanAction::Destroy)
            .unwrap();
        assert_eq!(destroyed.resource_id, "logs");
        assert_eq!(destroyed.resource_type, "AWS::S3::Bucket");
    }

    #[test]
    fn test_hashes_follow_execution_order() {
        let g = graph("10.0.0.0/16", true);
        let order = vec!["logs".to_string(), "vpc".to_string()];
        let hashes = hash_rendered_resources(&g, &render_template(&g), &order);
        let ids: Vec<&String> = hashes.keys().collect();
        assert_eq!(ids, vec!["logs", "vpc"]);
        assert!(hashes["vpc"].hash.starts_with("blake3:"));
    }
}
