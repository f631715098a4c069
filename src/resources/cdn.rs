//! CDN family: buckets, bucket policies, origin access identity, and the
//! distribution.

use crate::core::codegen::render_token;
use crate::core::types::Token;
use indexmap::IndexMap;
use serde_json::{json, Value};

/// Storage bucket. Retained on stack deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket;

/// Who a policy statement grants access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    CanonicalUser(Token),
    Account(String),
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub principal: Principal,
    pub resources: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPolicy {
    pub bucket: Token,
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAccessIdentity {
    pub comment: String,
}

/// Cache behavior of an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behavior {
    /// `None` marks the default behavior
    pub path_pattern: Option<String>,
    pub forward_query_string: bool,
    pub forward_cookies: String,
    pub forward_headers: Vec<String>,
}

impl Behavior {
    pub fn default_behavior() -> Self {
        Self {
            path_pattern: None,
            forward_query_string: false,
            forward_cookies: "none".to_string(),
            forward_headers: Vec::new(),
        }
    }

    pub fn for_path(pattern: &str) -> Self {
        Self {
            path_pattern: Some(pattern.to_string()),
            ..Self::default_behavior()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginSource {
    Custom {
        domain_name: Token,
        protocol_policy: String,
        ssl_protocols: Vec<String>,
    },
    S3 {
        bucket_domain: Token,
        identity: Token,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub source: OriginSource,
    /// Headers added to every request sent to this origin
    pub custom_headers: IndexMap<String, Token>,
    pub behaviors: Vec<Behavior>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionLogging {
    pub bucket: Token,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub aliases: Vec<String>,
    pub certificate: Token,
    pub security_policy: String,
    pub origins: Vec<Origin>,
    pub price_class: String,
    pub logging: Option<DistributionLogging>,
    pub comment: String,
    pub default_root_object: String,
}

impl BucketPolicy {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.bucket];
        for s in &self.statements {
            if let Principal::CanonicalUser(t) = &s.principal {
                tokens.push(t);
            }
            tokens.extend(&s.resources);
        }
        tokens
    }
}

impl Origin {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = match &self.source {
            OriginSource::Custom { domain_name, .. } => vec![domain_name],
            OriginSource::S3 {
                bucket_domain,
                identity,
            } => vec![bucket_domain, identity],
        };
        tokens.extend(self.custom_headers.values());
        tokens
    }
}

impl Distribution {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.certificate];
        for o in &self.origins {
            tokens.extend(o.tokens());
        }
        if let Some(l) = &self.logging {
            tokens.push(&l.bucket);
        }
        tokens
    }

    /// Value of a custom origin header across all origins that set it.
    pub fn origin_header_values(&self, header: &str) -> Vec<&Token> {
        self.origins
            .iter()
            .filter_map(|o| o.custom_headers.get(header))
            .collect()
    }
}

pub fn bucket_properties(_bucket: &Bucket) -> Value {
    json!({})
}

fn principal_body(p: &Principal) -> Value {
    match p {
        Principal::CanonicalUser(t) => json!({ "CanonicalUser": render_token(t) }),
        Principal::Account(account) => json!({
            "AWS": { "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":iam::", account, ":root"]] }
        }),
        Principal::Service(service) => json!({ "Service": service }),
    }
}

pub fn bucket_policy_properties(policy: &BucketPolicy) -> Value {
    let statements: Vec<Value> = policy
        .statements
        .iter()
        .map(|s| {
            json!({
                "Action": s.actions,
                "Effect": "Allow",
                "Principal": principal_body(&s.principal),
                "Resource": s.resources.iter().map(render_token).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "Bucket": render_token(&policy.bucket),
        "PolicyDocument": { "Version": "2012-10-17", "Statement": statements },
    })
}

pub fn origin_access_identity_properties(oai: &OriginAccessIdentity) -> Value {
    json!({
        "CloudFrontOriginAccessIdentityConfig": { "Comment": oai.comment },
    })
}

fn behavior_body(b: &Behavior, origin_id: &str) -> Value {
    let mut body = json!({
        "TargetOriginId": origin_id,
        "ViewerProtocolPolicy": "redirect-to-https",
        "AllowedMethods": ["GET", "HEAD"],
        "CachedMethods": ["GET", "HEAD"],
        "Compress": true,
        "ForwardedValues": {
            "QueryString": b.forward_query_string,
            "Cookies": { "Forward": b.forward_cookies },
        },
    });
    if !b.forward_headers.is_empty() {
        body["ForwardedValues"]["Headers"] = json!(b.forward_headers);
    }
    if let Some(p) = &b.path_pattern {
        body["PathPattern"] = json!(p);
    }
    body
}

pub fn distribution_properties(d: &Distribution) -> Value {
    let mut origins = Vec::new();
    let mut default_behavior = None;
    let mut cache_behaviors = Vec::new();

    for (i, origin) in d.origins.iter().enumerate() {
        let origin_id = format!("origin{}", i + 1);
        let mut body = json!({ "Id": origin_id });
        match &origin.source {
            OriginSource::Custom {
                domain_name,
                protocol_policy,
                ssl_protocols,
            } => {
                body["DomainName"] = render_token(domain_name);
                body["CustomOriginConfig"] = json!({
                    "HTTPPort": 80,
                    "HTTPSPort": 443,
                    "OriginProtocolPolicy": protocol_policy,
                    "OriginSSLProtocols": ssl_protocols,
                });
            }
            OriginSource::S3 {
                bucket_domain,
                identity,
            } => {
                body["DomainName"] = render_token(bucket_domain);
                body["S3OriginConfig"] = json!({
                    "OriginAccessIdentity": {
                        "Fn::Join": ["", ["origin-access-identity/cloudfront/", render_token(identity)]]
                    },
                });
            }
        }
        if !origin.custom_headers.is_empty() {
            body["OriginCustomHeaders"] = json!(origin
                .custom_headers
                .iter()
                .map(|(name, value)| json!({
                    "HeaderName": name,
                    "HeaderValue": render_token(value),
                }))
                .collect::<Vec<_>>());
        }
        origins.push(body);

        for b in &origin.behaviors {
            let rendered = behavior_body(b, &origin_id);
            if b.path_pattern.is_none() {
                default_behavior = Some(rendered);
            } else {
                cache_behaviors.push(rendered);
            }
        }
    }

    let mut config = json!({
        "Aliases": d.aliases,
        "Comment": d.comment,
        "DefaultRootObject": d.default_root_object,
        "Enabled": true,
        "HttpVersion": "http2",
        "IPV6Enabled": true,
        "Origins": origins,
        "PriceClass": d.price_class,
        "ViewerCertificate": {
            "AcmCertificateArn": render_token(&d.certificate),
            "SslSupportMethod": "sni-only",
            "MinimumProtocolVersion": d.security_policy,
        },
    });
    if let Some(b) = default_behavior {
        config["DefaultCacheBehavior"] = b;
    }
    if !cache_behaviors.is_empty() {
        config["CacheBehaviors"] = json!(cache_behaviors);
    }
    if let Some(l) = &d.logging {
        config["Logging"] = json!({
            "Bucket": render_token(&l.bucket),
            "IncludeCookies": false,
            "Prefix": l.prefix,
        });
    }
    json!({ "DistributionConfig": config })
}
