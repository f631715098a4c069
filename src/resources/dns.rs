//! DNS family: certificate issuance and the alias record.
//!
//! The hosted zone itself is looked up, not declared; it reaches this module
//! as a literal zone ID token. Certificate validation happens inside the
//! provisioning engine and is never awaited here.

use crate::core::codegen::render_token;
use crate::core::types::Token;
use serde_json::{json, Value};

/// Fixed hosted zone ID for every CloudFront alias target.
pub const CLOUDFRONT_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// DNS-validated certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub domain_name: String,
    pub hosted_zone: Token,
}

/// Alias record in a hosted zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    pub zone: Token,
    pub zone_name: String,
    pub record_name: String,
    pub record_type: String,
    pub alias_target: Token,
    pub alias_zone_id: String,
}

impl Certificate {
    pub fn tokens(&self) -> Vec<&Token> {
        vec![&self.hosted_zone]
    }
}

impl RecordSet {
    pub fn tokens(&self) -> Vec<&Token> {
        vec![&self.zone, &self.alias_target]
    }

    /// Fully-qualified record name with trailing dot.
    pub fn fqdn(&self) -> String {
        if self.record_name.ends_with(&format!("{}.", self.zone_name))
            || self.record_name.ends_with(&self.zone_name)
        {
            let name = self.record_name.trim_end_matches('.');
            format!("{}.", name)
        } else {
            format!("{}.{}.", self.record_name, self.zone_name)
        }
    }
}

pub fn certificate_properties(cert: &Certificate) -> Value {
    json!({
        "DomainName": cert.domain_name,
        "ValidationMethod": "DNS",
        "DomainValidationOptions": [{
            "DomainName": cert.domain_name,
            "HostedZoneId": render_token(&cert.hosted_zone),
        }],
    })
}

pub fn record_set_properties(r: &RecordSet) -> Value {
    json!({
        "Name": r.fqdn(),
        "Type": r.record_type,
        "HostedZoneId": render_token(&r.zone),
        "AliasTarget": {
            "DNSName": render_token(&r.alias_target),
            "HostedZoneId": r.alias_zone_id,
        },
    })
}
