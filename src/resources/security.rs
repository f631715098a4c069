//! Security family: security groups and cross-group rules.
//!
//! CIDR rules are rendered inline on the group. Rules whose peer is another
//! group are standalone ingress/egress resources so two groups can point at
//! each other without a cycle.

use crate::core::codegen::render_token;
use crate::core::types::{Peer, Protocol, SecurityRule, Token};
use serde_json::{json, Value};

/// A security boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub description: String,
    pub vpc: Token,
    pub group_name: Option<String>,
    pub ingress: Vec<SecurityRule>,
    pub egress: Vec<SecurityRule>,
    pub allow_all_outbound: bool,
}

/// Standalone rule attached to an existing group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRule {
    pub group: Token,
    pub rule: SecurityRule,
}

impl SecurityGroup {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.vpc];
        for rule in self.ingress.iter().chain(self.egress.iter()) {
            if let Peer::SecurityGroup(t) = &rule.peer {
                tokens.push(t);
            }
        }
        tokens
    }
}

impl GroupRule {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.group];
        if let Peer::SecurityGroup(t) = &self.rule.peer {
            tokens.push(t);
        }
        tokens
    }
}

/// Human-readable peer, used for default rule descriptions.
fn peer_label(peer: &Peer) -> String {
    match peer {
        Peer::Ipv4(cidr) => cidr.clone(),
        Peer::AnyIpv4 => "0.0.0.0/0".to_string(),
        Peer::SecurityGroup(t) => t
            .resource_refs()
            .first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "group".to_string()),
    }
}

fn default_description(direction: &str, rule: &SecurityRule) -> String {
    format!("{} {}:{}", direction, peer_label(&rule.peer), rule.port)
}

fn rule_body(rule: &SecurityRule, direction: &str) -> Value {
    let description = rule
        .description
        .clone()
        .unwrap_or_else(|| default_description(direction, rule));
    let mut body = json!({
        "IpProtocol": rule.protocol.to_string(),
        "FromPort": rule.port,
        "ToPort": rule.port,
        "Description": description,
    });
    let peer_key = |sg: bool| match (direction, sg) {
        ("from", true) => "SourceSecurityGroupId",
        ("to", true) => "DestinationSecurityGroupId",
        _ => "CidrIp",
    };
    match &rule.peer {
        Peer::Ipv4(cidr) => body[peer_key(false)] = json!(cidr),
        Peer::AnyIpv4 => body[peer_key(false)] = json!("0.0.0.0/0"),
        Peer::SecurityGroup(t) => body[peer_key(true)] = render_token(t),
    }
    body
}

pub fn security_group_properties(sg: &SecurityGroup) -> Value {
    let ingress: Vec<Value> = sg.ingress.iter().map(|r| rule_body(r, "from")).collect();
    let egress: Vec<Value> = if sg.allow_all_outbound {
        vec![json!({
            "CidrIp": "0.0.0.0/0",
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": Protocol::All.to_string(),
        })]
    } else if sg.egress.is_empty() {
        // Placeholder that matches nothing; an empty list means allow-all.
        vec![json!({
            "CidrIp": "255.255.255.255/32",
            "Description": "Disallow all traffic",
            "FromPort": 252,
            "IpProtocol": "icmp",
            "ToPort": 86,
        })]
    } else {
        sg.egress.iter().map(|r| rule_body(r, "to")).collect()
    };

    let mut props = json!({
        "GroupDescription": sg.description,
        "VpcId": render_token(&sg.vpc),
        "SecurityGroupIngress": ingress,
        "SecurityGroupEgress": egress,
    });
    if let Some(name) = &sg.group_name {
        props["GroupName"] = json!(name);
    }
    props
}

pub fn ingress_properties(r: &GroupRule) -> Value {
    let mut body = rule_body(&r.rule, "from");
    body["GroupId"] = render_token(&r.group);
    body
}

pub fn egress_properties(r: &GroupRule) -> Value {
    let mut body = rule_body(&r.rule, "to");
    body["GroupId"] = render_token(&r.group);
    body
}
