//! Network family: VPC, subnets, gateways, and routing.

use crate::core::codegen::render_token;
use crate::core::types::Token;
use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::net::Ipv4Addr;

/// Isolated address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    pub cidr: String,
    pub max_azs: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub vpc: Token,
    pub cidr: String,
    pub availability_zone: Token,
    pub public: bool,
    /// `Public` or `Private`, emitted as the `subnet-name` tag
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAttachment {
    pub vpc: Token,
    pub gateway: Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    pub vpc: Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableAssociation {
    pub route_table: Token,
    pub subnet: Token,
}

/// Where a route sends matching traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Gateway(Token),
    NatGateway(Token),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub route_table: Token,
    pub destination: String,
    pub target: RouteTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatGateway {
    pub subnet: Token,
    pub allocation: Token,
}

/// Split `base` (an IPv4 /16 or wider) into `count` equal subnets.
///
/// The prefix grows by the number of bits needed to hold `count` blocks,
/// so 4 subnets of a /16 are /18s.
pub fn subnet_cidrs(base: &str, count: usize) -> Result<Vec<String>> {
    let invalid = |message: String| Error::InvalidContext {
        key: "cidr".to_string(),
        message,
    };
    let (addr, prefix) = base
        .split_once('/')
        .ok_or_else(|| invalid(format!("'{}' is not a CIDR block", base)))?;
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| invalid(format!("'{}' is not an IPv4 address", addr)))?;
    let prefix: u32 = prefix
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a prefix length", prefix)))?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let extra_bits = usize::BITS - (count - 1).leading_zeros();
    let new_prefix = prefix + extra_bits;
    if new_prefix > 28 {
        return Err(invalid(format!(
            "cannot split {} into {} subnets",
            base, count
        )));
    }
    let block = 1u32 << (32 - new_prefix);
    let start = u32::from(addr);

    Ok((0..count as u32)
        .map(|i| format!("{}/{}", Ipv4Addr::from(start + i * block), new_prefix))
        .collect())
}

fn name_tag(name: &str) -> Value {
    json!([{ "Key": "Name", "Value": name }])
}

pub fn vpc_properties(vpc: &Vpc, path_name: &str) -> Value {
    json!({
        "CidrBlock": vpc.cidr,
        "EnableDnsHostnames": true,
        "EnableDnsSupport": true,
        "InstanceTenancy": "default",
        "Tags": name_tag(path_name),
    })
}

pub fn subnet_properties(subnet: &Subnet, path_name: &str) -> Value {
    json!({
        "CidrBlock": subnet.cidr,
        "VpcId": render_token(&subnet.vpc),
        "AvailabilityZone": render_token(&subnet.availability_zone),
        "MapPublicIpOnLaunch": subnet.public,
        "Tags": [
            { "Key": "Name", "Value": path_name },
            { "Key": "subnet-name", "Value": subnet.name },
            { "Key": "subnet-type", "Value": if subnet.public { "Public" } else { "Private" } },
        ],
    })
}

pub fn internet_gateway_properties(path_name: &str) -> Value {
    json!({ "Tags": name_tag(path_name) })
}

pub fn gateway_attachment_properties(a: &GatewayAttachment) -> Value {
    json!({
        "VpcId": render_token(&a.vpc),
        "InternetGatewayId": render_token(&a.gateway),
    })
}

pub fn route_table_properties(rt: &RouteTable, path_name: &str) -> Value {
    json!({
        "VpcId": render_token(&rt.vpc),
        "Tags": name_tag(path_name),
    })
}

pub fn route_table_association_properties(a: &RouteTableAssociation) -> Value {
    json!({
        "RouteTableId": render_token(&a.route_table),
        "SubnetId": render_token(&a.subnet),
    })
}

pub fn route_properties(route: &Route) -> Value {
    let mut props = json!({
        "RouteTableId": render_token(&route.route_table),
        "DestinationCidrBlock": route.destination,
    });
    match &route.target {
        RouteTarget::Gateway(t) => props["GatewayId"] = render_token(t),
        RouteTarget::NatGateway(t) => props["NatGatewayId"] = render_token(t),
    }
    props
}

pub fn eip_properties(path_name: &str) -> Value {
    json!({ "Domain": "vpc", "Tags": name_tag(path_name) })
}

pub fn nat_gateway_properties(nat: &NatGateway, path_name: &str) -> Value {
    json!({
        "AllocationId": render_token(&nat.allocation),
        "SubnetId": render_token(&nat.subnet),
        "Tags": name_tag(path_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_cidrs_two_azs() {
        let cidrs = subnet_cidrs("10.0.0.0/16", 4).unwrap();
        assert_eq!(
            cidrs,
            vec![
                "10.0.0.0/18",
                "10.0.64.0/18",
                "10.0.128.0/18",
                "10.0.192.0/18"
            ]
        );
    }

    #[test]
    fn test_subnet_cidrs_three_azs() {
        let cidrs = subnet_cidrs("10.0.0.0/16", 6).unwrap();
        assert_eq!(cidrs.len(), 6);
        assert_eq!(cidrs[0], "10.0.0.0/19");
        assert_eq!(cidrs[5], "10.0.160.0/19");
    }

    #[test]
    fn test_subnet_cidrs_single() {
        assert_eq!(subnet_cidrs("10.0.0.0/16", 1).unwrap(), vec!["10.0.0.0/16"]);
        assert!(subnet_cidrs("10.0.0.0/16", 0).unwrap().is_empty());
    }

    #[test]
    fn test_subnet_cidrs_rejects_garbage() {
        assert!(subnet_cidrs("10.0.0.0", 2).is_err());
        assert!(subnet_cidrs("ten/16", 2).is_err());
        assert!(subnet_cidrs("10.0.0.0/26", 8).is_err());
    }

    #[test]
    fn test_route_properties_targets() {
        let igw = Route {
            route_table: Token::reference("rt"),
            destination: "0.0.0.0/0".to_string(),
            target: RouteTarget::Gateway(Token::reference("igw")),
        };
        let p = route_properties(&igw);
        assert_eq!(p["GatewayId"], json!({ "Ref": "igw" }));
        assert!(p.get("NatGatewayId").is_none());

        let nat = Route {
            target: RouteTarget::NatGateway(Token::reference("nat")),
            ..igw
        };
        let p = route_properties(&nat);
        assert_eq!(p["NatGatewayId"], json!({ "Ref": "nat" }));
    }

    #[test]
    fn test_subnet_properties_public_flag() {
        let s = Subnet {
            vpc: Token::reference("vpc"),
            cidr: "10.0.0.0/18".to_string(),
            availability_zone: Token::AvailabilityZone(0),
            public: true,
            name: "Public".to_string(),
        };
        let p = subnet_properties(&s, "S/vpc/PublicSubnet1");
        assert_eq!(p["MapPublicIpOnLaunch"], json!(true));
        assert_eq!(
            p["AvailabilityZone"],
            json!({ "Fn::Select": [0, { "Fn::GetAZs": "" }] })
        );
    }
}
