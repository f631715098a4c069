//! The stack graph: parameters, resource nodes, and outputs.
//!
//! `StackGraphBuilder` is the only way to add nodes. Every token a node
//! carries must point at an already-declared resource or parameter, so the
//! graph is acyclic by construction and no reference can dangle.
//! `finish` hands back an immutable `StackGraph`.

use super::types::Token;
use crate::error::{Error, Result};
use crate::resources::ResourceKind;
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Template parameter, resolved by the engine at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub param_type: String,
    pub default: String,
    pub description: Option<String>,
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Construct path, `Stack/child/...`
    pub path: String,
    pub kind: ResourceKind,
    /// Explicit ordering edges beyond the token references
    pub depends_on: Vec<String>,
}

impl Node {
    /// Logical IDs this node references through its tokens.
    pub fn references(&self) -> BTreeSet<&str> {
        self.kind
            .tokens()
            .into_iter()
            .flat_map(Token::resource_refs)
            .collect()
    }

    /// All upstream logical IDs: token references plus explicit edges.
    pub fn edges(&self) -> BTreeSet<&str> {
        let mut edges = self.references();
        edges.extend(self.depends_on.iter().map(String::as_str));
        edges
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub value: Token,
    pub description: Option<String>,
}

/// Finished, immutable resource graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackGraph {
    name: String,
    description: Option<String>,
    parameters: IndexMap<String, Parameter>,
    nodes: IndexMap<String, Node>,
    outputs: IndexMap<String, Output>,
}

impl StackGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &IndexMap<String, Parameter> {
        &self.parameters
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &IndexMap<String, Node> {
        &self.nodes
    }

    pub fn outputs(&self) -> &IndexMap<String, Output> {
        &self.outputs
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Logical IDs of every node whose resource type matches.
    pub fn ids_of_type(&self, type_name: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.kind.type_name() == type_name)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Declaration order with IDs erased: (type, path, sorted edge paths).
    /// Two graphs with the same shape compare equal here even if their
    /// logical IDs differ.
    pub fn shape(&self) -> Vec<(String, String, Vec<String>)> {
        self.nodes
            .values()
            .map(|n| {
                let edges = n
                    .edges()
                    .into_iter()
                    .filter_map(|e| self.nodes.get(e).map(|up| up.path.clone()))
                    .collect();
                (n.kind.type_name().to_string(), n.path.clone(), edges)
            })
            .collect()
    }
}

/// Mutable graph under construction.
#[derive(Debug)]
pub struct StackGraphBuilder {
    graph: StackGraph,
}

impl StackGraphBuilder {
    pub fn new(name: &str, description: Option<String>) -> Self {
        Self {
            graph: StackGraph {
                name: name.to_string(),
                description,
                parameters: IndexMap::new(),
                nodes: IndexMap::new(),
                outputs: IndexMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.graph.name
    }

    /// Declare a template parameter and return a token pointing at it.
    pub fn add_parameter(&mut self, name: &str, parameter: Parameter) -> Result<Token> {
        if self.graph.parameters.contains_key(name) || self.graph.nodes.contains_key(name) {
            return Err(Error::DuplicateResource {
                id: name.to_string(),
            });
        }
        self.graph.parameters.insert(name.to_string(), parameter);
        Ok(Token::Param(name.to_string()))
    }

    /// Declare a resource. Fails if `id` is taken or any token refers to
    /// something not declared yet.
    pub fn add(&mut self, id: &str, path: &str, kind: ResourceKind) -> Result<String> {
        if self.graph.nodes.contains_key(id) || self.graph.parameters.contains_key(id) {
            return Err(Error::DuplicateResource { id: id.to_string() });
        }
        for token in kind.tokens() {
            self.check_token(id, token)?;
        }
        tracing::debug!(resource = id, r#type = kind.type_name(), "declared");
        self.graph.nodes.insert(
            id.to_string(),
            Node {
                path: path.to_string(),
                kind,
                depends_on: Vec::new(),
            },
        );
        Ok(id.to_string())
    }

    /// Add an explicit ordering edge `id` → `on`.
    pub fn depends_on(&mut self, id: &str, on: &str) -> Result<()> {
        if !self.graph.nodes.contains_key(on) {
            return Err(Error::InvalidReference {
                from: id.to_string(),
                to: on.to_string(),
            });
        }
        let node = self
            .graph
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::InvalidReference {
                from: on.to_string(),
                to: id.to_string(),
            })?;
        if !node.depends_on.iter().any(|d| d == on) {
            node.depends_on.push(on.to_string());
        }
        Ok(())
    }

    pub fn add_output(&mut self, name: &str, value: Token, description: Option<String>) -> Result<()> {
        if self.graph.outputs.contains_key(name) {
            return Err(Error::DuplicateResource {
                id: name.to_string(),
            });
        }
        self.check_token(name, &value)?;
        self.graph
            .outputs
            .insert(name.to_string(), Output { value, description });
        Ok(())
    }

    fn check_token(&self, from: &str, token: &Token) -> Result<()> {
        for to in token.resource_refs() {
            if !self.graph.nodes.contains_key(to) {
                return Err(Error::InvalidReference {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        for to in token.param_refs() {
            if !self.graph.parameters.contains_key(to) {
                return Err(Error::InvalidReference {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Freeze the graph.
    pub fn finish(self) -> StackGraph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{cdn, network};

    fn vpc() -> ResourceKind {
        ResourceKind::Vpc(network::Vpc {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
        })
    }

    fn route_table(vpc: &str) -> ResourceKind {
        ResourceKind::RouteTable(network::RouteTable {
            vpc: Token::reference(vpc),
        })
    }

    #[test]
    fn test_add_in_order() {
        let mut b = StackGraphBuilder::new("S", None);
        b.add("vpc", "S/vpc", vpc()).unwrap();
        b.add("rt", "S/vpc/rt", route_table("vpc")).unwrap();
        let g = b.finish();
        assert_eq!(g.nodes().len(), 2);
        let refs: Vec<_> = g.get("rt").unwrap().references().into_iter().collect();
        assert_eq!(refs, vec!["vpc"]);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut b = StackGraphBuilder::new("S", None);
        let err = b.add("rt", "S/rt", route_table("vpc")).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidReference { ref from, ref to } if from == "rt" && to == "vpc"
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut b = StackGraphBuilder::new("S", None);
        b.add("vpc", "S/vpc", vpc()).unwrap();
        assert!(matches!(
            b.add("vpc", "S/vpc", vpc()),
            Err(Error::DuplicateResource { .. })
        ));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let mut b = StackGraphBuilder::new("S", None);
        let err = b
            .add_output("out", Token::Param("Missing".to_string()), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReference { .. }));

        b.add_parameter(
            "Image",
            Parameter {
                param_type: "String".to_string(),
                default: "ami".to_string(),
                description: None,
            },
        )
        .unwrap();
        b.add_output("out", Token::Param("Image".to_string()), None)
            .unwrap();
    }

    #[test]
    fn test_depends_on_dedup_and_validation() {
        let mut b = StackGraphBuilder::new("S", None);
        b.add("a", "S/a", ResourceKind::Bucket(cdn::Bucket)).unwrap();
        b.add("b", "S/b", ResourceKind::Bucket(cdn::Bucket)).unwrap();
        b.depends_on("b", "a").unwrap();
        b.depends_on("b", "a").unwrap();
        assert!(b.depends_on("b", "ghost").is_err());
        let g = b.finish();
        assert_eq!(g.get("b").unwrap().depends_on, vec!["a"]);
        assert_eq!(g.get("b").unwrap().edges().len(), 1);
    }

    #[test]
    fn test_shape_ignores_ids() {
        let build = |vpc_id: &str, rt_id: &str| {
            let mut b = StackGraphBuilder::new("S", None);
            b.add(vpc_id, "S/vpc", vpc()).unwrap();
            b.add(rt_id, "S/vpc/rt", route_table(vpc_id)).unwrap();
            b.finish()
        };
        assert_eq!(build("v1", "r1").shape(), build("v2", "r2").shape());
    }
}
