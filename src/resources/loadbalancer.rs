//! Load-balancing family: ALB, listener, routing rules, target group.

use crate::core::codegen::render_token;
use crate::core::types::Token;
use serde_json::{json, Value};

/// Account that writes ALB access logs in each legacy region.
const ELB_LOG_ACCOUNTS: &[(&str, &str)] = &[
    ("us-east-1", "127311923021"),
    ("us-east-2", "033677994240"),
    ("us-west-1", "027434742980"),
    ("us-west-2", "797873946194"),
    ("ca-central-1", "985666609251"),
    ("eu-central-1", "054676820928"),
    ("eu-west-1", "156460612806"),
    ("eu-west-2", "652711504416"),
    ("eu-west-3", "009996457667"),
    ("eu-north-1", "897822967062"),
    ("ap-northeast-1", "582318560864"),
    ("ap-northeast-2", "600734575887"),
    ("ap-northeast-3", "383597477331"),
    ("ap-southeast-1", "114774131450"),
    ("ap-southeast-2", "783225319266"),
    ("ap-south-1", "718504428378"),
    ("sa-east-1", "507241528517"),
];

/// Log-delivery account for `region`, if it is a legacy region.
/// Newer regions use the `logdelivery.elasticloadbalancing.amazonaws.com`
/// service principal instead.
pub fn elb_log_account(region: &str) -> Option<&'static str> {
    ELB_LOG_ACCOUNTS
        .iter()
        .find(|(r, _)| *r == region)
        .map(|(_, account)| *account)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogs {
    pub bucket: Token,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancer {
    pub internet_facing: bool,
    pub subnets: Vec<Token>,
    pub security_groups: Vec<Token>,
    pub access_logs: Option<AccessLogs>,
}

/// What a listener or rule does with a matched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerAction {
    FixedResponse {
        status_code: u16,
        content_type: String,
        message_body: String,
    },
    Forward {
        target_group: Token,
    },
}

/// Request match condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    HttpHeader { name: String, values: Vec<Token> },
}

/// Listener bound to one port and one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub load_balancer: Token,
    pub port: u16,
    pub protocol: String,
    pub certificates: Vec<Token>,
    pub default_action: ListenerAction,
}

/// Routing rule. Lower priority value is evaluated first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRule {
    pub listener: Token,
    pub priority: u32,
    pub conditions: Vec<Condition>,
    pub actions: Vec<ListenerAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroup {
    pub vpc: Token,
    pub port: u16,
    pub protocol: String,
}

impl LoadBalancer {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens: Vec<&Token> = self.subnets.iter().chain(&self.security_groups).collect();
        if let Some(logs) = &self.access_logs {
            tokens.push(&logs.bucket);
        }
        tokens
    }
}

impl ListenerAction {
    pub fn tokens(&self) -> Vec<&Token> {
        match self {
            Self::FixedResponse { .. } => vec![],
            Self::Forward { target_group } => vec![target_group],
        }
    }
}

impl Listener {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.load_balancer];
        tokens.extend(&self.certificates);
        tokens.extend(self.default_action.tokens());
        tokens
    }
}

impl ListenerRule {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.listener];
        for c in &self.conditions {
            match c {
                Condition::HttpHeader { values, .. } => tokens.extend(values),
            }
        }
        for a in &self.actions {
            tokens.extend(a.tokens());
        }
        tokens
    }

    /// Header values this rule requires, by header name.
    pub fn header_values(&self, header: &str) -> Vec<&Token> {
        self.conditions
            .iter()
            .flat_map(|c| match c {
                Condition::HttpHeader { name, values } if name == header => values.iter().collect(),
                _ => vec![],
            })
            .collect()
    }
}

fn action_body(action: &ListenerAction) -> Value {
    match action {
        ListenerAction::FixedResponse {
            status_code,
            content_type,
            message_body,
        } => json!({
            "Type": "fixed-response",
            "FixedResponseConfig": {
                "StatusCode": status_code.to_string(),
                "ContentType": content_type,
                "MessageBody": message_body,
            },
        }),
        ListenerAction::Forward { target_group } => json!({
            "Type": "forward",
            "TargetGroupArn": render_token(target_group),
        }),
    }
}

fn condition_body(condition: &Condition) -> Value {
    match condition {
        Condition::HttpHeader { name, values } => json!({
            "Field": "http-header",
            "HttpHeaderConfig": {
                "HttpHeaderName": name,
                "Values": values.iter().map(render_token).collect::<Vec<_>>(),
            },
        }),
    }
}

pub fn load_balancer_properties(lb: &LoadBalancer) -> Value {
    let mut attributes = vec![];
    if let Some(logs) = &lb.access_logs {
        attributes.push(json!({ "Key": "access_logs.s3.enabled", "Value": "true" }));
        attributes.push(json!({ "Key": "access_logs.s3.bucket", "Value": render_token(&logs.bucket) }));
        attributes.push(json!({ "Key": "access_logs.s3.prefix", "Value": logs.prefix }));
    }
    json!({
        "Type": "application",
        "Scheme": if lb.internet_facing { "internet-facing" } else { "internal" },
        "Subnets": lb.subnets.iter().map(render_token).collect::<Vec<_>>(),
        "SecurityGroups": lb.security_groups.iter().map(render_token).collect::<Vec<_>>(),
        "LoadBalancerAttributes": attributes,
    })
}

pub fn listener_properties(l: &Listener) -> Value {
    json!({
        "LoadBalancerArn": render_token(&l.load_balancer),
        "Port": l.port,
        "Protocol": l.protocol,
        "Certificates": l
            .certificates
            .iter()
            .map(|c| json!({ "CertificateArn": render_token(c) }))
            .collect::<Vec<_>>(),
        "DefaultActions": [action_body(&l.default_action)],
    })
}

pub fn listener_rule_properties(r: &ListenerRule) -> Value {
    json!({
        "ListenerArn": render_token(&r.listener),
        "Priority": r.priority,
        "Conditions": r.conditions.iter().map(condition_body).collect::<Vec<_>>(),
        "Actions": r.actions.iter().map(action_body).collect::<Vec<_>>(),
    })
}

pub fn target_group_properties(tg: &TargetGroup) -> Value {
    json!({
        "VpcId": render_token(&tg.vpc),
        "Port": tg.port,
        "Protocol": tg.protocol,
        "TargetType": "instance",
    })
}
