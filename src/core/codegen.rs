//! Template generation: dispatch to resource family renderers.
//!
//! Each node renders to one entry under `Resources`:
//! - `Type`: the CloudFormation type
//! - `Properties`: produced by the family module
//! - `DependsOn`: explicit ordering edges only (token references are
//!   implied by `Ref`/`Fn::GetAtt`)
//!
//! Template objects are key-sorted, so `Resources` lists logical IDs
//! alphabetically whatever the declaration order.

use super::graph::{Node, StackGraph};
use super::types::Token;
use crate::resources::{self, ResourceKind};
use serde_json::{json, Map, Value};

/// Render a token as a template expression.
pub fn render_token(token: &Token) -> Value {
    match token {
        Token::Literal(s) => json!(s),
        Token::Ref(id) => json!({ "Ref": id }),
        Token::Att {
            resource,
            attribute,
        } => json!({ "Fn::GetAtt": [resource, attribute] }),
        Token::Param(name) => json!({ "Ref": name }),
        Token::AvailabilityZone(i) => json!({ "Fn::Select": [i, { "Fn::GetAZs": "" }] }),
        Token::Join(parts) => {
            json!({ "Fn::Join": ["", parts.iter().map(render_token).collect::<Vec<_>>()] })
        }
    }
}

/// Render the `Properties` block of a node.
pub fn properties(node: &Node) -> Value {
    use resources::{cdn, compute, dns, loadbalancer, network, security};

    let path = node.path.as_str();
    match &node.kind {
        ResourceKind::Vpc(v) => network::vpc_properties(v, path),
        ResourceKind::Subnet(s) => network::subnet_properties(s, path),
        ResourceKind::InternetGateway => network::internet_gateway_properties(path),
        ResourceKind::GatewayAttachment(a) => network::gateway_attachment_properties(a),
        ResourceKind::RouteTable(rt) => network::route_table_properties(rt, path),
        ResourceKind::RouteTableAssociation(a) => network::route_table_association_properties(a),
        ResourceKind::Route(r) => network::route_properties(r),
        ResourceKind::ElasticIp => network::eip_properties(path),
        ResourceKind::NatGateway(n) => network::nat_gateway_properties(n, path),
        ResourceKind::SecurityGroup(sg) => security::security_group_properties(sg),
        ResourceKind::SecurityGroupIngress(r) => security::ingress_properties(r),
        ResourceKind::SecurityGroupEgress(r) => security::egress_properties(r),
        ResourceKind::Certificate(c) => dns::certificate_properties(c),
        ResourceKind::RecordSet(r) => dns::record_set_properties(r),
        ResourceKind::LoadBalancer(lb) => loadbalancer::load_balancer_properties(lb),
        ResourceKind::Listener(l) => loadbalancer::listener_properties(l),
        ResourceKind::ListenerRule(r) => loadbalancer::listener_rule_properties(r),
        ResourceKind::TargetGroup(tg) => loadbalancer::target_group_properties(tg),
        ResourceKind::Role(r) => compute::role_properties(r),
        ResourceKind::InstanceProfile(p) => compute::instance_profile_properties(p),
        ResourceKind::LaunchConfiguration(lc) => compute::launch_configuration_properties(lc),
        ResourceKind::AutoScalingGroup(asg) => compute::auto_scaling_group_properties(asg),
        ResourceKind::LaunchTemplate(lt) => compute::launch_template_properties(lt),
        ResourceKind::Ec2Fleet(f) => compute::ec2_fleet_properties(f),
        ResourceKind::Bucket(b) => cdn::bucket_properties(b),
        ResourceKind::BucketPolicy(p) => cdn::bucket_policy_properties(p),
        ResourceKind::OriginAccessIdentity(o) => cdn::origin_access_identity_properties(o),
        ResourceKind::Distribution(d) => cdn::distribution_properties(d),
    }
}

/// Render one node's full template entry.
pub fn resource_body(node: &Node) -> Value {
    let mut body = Map::new();
    body.insert("Type".to_string(), json!(node.kind.type_name()));
    let props = properties(node);
    if props.as_object().is_some_and(|o| !o.is_empty()) {
        body.insert("Properties".to_string(), props);
    }
    if !node.depends_on.is_empty() {
        let mut deps = node.depends_on.clone();
        deps.sort();
        body.insert("DependsOn".to_string(), json!(deps));
    }
    if node.kind.retained() {
        body.insert("UpdateReplacePolicy".to_string(), json!("Retain"));
        body.insert("DeletionPolicy".to_string(), json!("Retain"));
    }
    body.insert("Metadata".to_string(), json!({ "cfalbasg:path": node.path }));
    Value::Object(body)
}

/// Render the whole stack as a CloudFormation template.
pub fn render_template(graph: &StackGraph) -> Value {
    let mut template = Map::new();
    template.insert(
        "AWSTemplateFormatVersion".to_string(),
        json!("2010-09-09"),
    );
    if let Some(d) = graph.description() {
        template.insert("Description".to_string(), json!(d));
    }

    if !graph.parameters().is_empty() {
        let mut params = Map::new();
        for (name, p) in graph.parameters() {
            let mut body = json!({ "Type": p.param_type, "Default": p.default });
            if let Some(d) = &p.description {
                body["Description"] = json!(d);
            }
            params.insert(name.clone(), body);
        }
        template.insert("Parameters".to_string(), Value::Object(params));
    }

    let resources: Map<String, Value> = graph
        .nodes()
        .iter()
        .map(|(id, node)| (id.clone(), resource_body(node)))
        .collect();
    template.insert("Resources".to_string(), Value::Object(resources));

    if !graph.outputs().is_empty() {
        let mut outputs = Map::new();
        for (name, o) in graph.outputs() {
            let mut body = json!({ "Value": render_token(&o.value) });
            if let Some(d) = &o.description {
                body["Description"] = json!(d);
            }
            outputs.insert(name.clone(), body);
        }
        template.insert("Outputs".to_string(), Value::Object(outputs));
    }

    Value::Object(template)
}
