//! Resource families: typed descriptors and their CloudFormation rendering.
//!
//! Each family module owns:
//! 1. The typed descriptor structs the topology builder fills in
//! 2. `tokens()` on each descriptor, listing its cross references
//! 3. A `*_properties` function rendering the `Properties` block

pub mod cdn;
pub mod compute;
pub mod dns;
pub mod loadbalancer;
pub mod network;
pub mod security;

use crate::core::types::Token;

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Vpc(network::Vpc),
    Subnet(network::Subnet),
    InternetGateway,
    GatewayAttachment(network::GatewayAttachment),
    RouteTable(network::RouteTable),
    RouteTableAssociation(network::RouteTableAssociation),
    Route(network::Route),
    ElasticIp,
    NatGateway(network::NatGateway),
    SecurityGroup(security::SecurityGroup),
    SecurityGroupIngress(security::GroupRule),
    SecurityGroupEgress(security::GroupRule),
    Certificate(dns::Certificate),
    RecordSet(dns::RecordSet),
    LoadBalancer(loadbalancer::LoadBalancer),
    Listener(loadbalancer::Listener),
    ListenerRule(loadbalancer::ListenerRule),
    TargetGroup(loadbalancer::TargetGroup),
    Role(compute::Role),
    InstanceProfile(compute::InstanceProfile),
    LaunchConfiguration(compute::LaunchConfiguration),
    AutoScalingGroup(compute::AutoScalingGroup),
    LaunchTemplate(compute::LaunchTemplate),
    Ec2Fleet(compute::Ec2Fleet),
    Bucket(cdn::Bucket),
    BucketPolicy(cdn::BucketPolicy),
    OriginAccessIdentity(cdn::OriginAccessIdentity),
    Distribution(cdn::Distribution),
}

impl ResourceKind {
    /// CloudFormation resource type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Vpc(_) => "AWS::EC2::VPC",
            Self::Subnet(_) => "AWS::EC2::Subnet",
            Self::InternetGateway => "AWS::EC2::InternetGateway",
            Self::GatewayAttachment(_) => "AWS::EC2::VPCGatewayAttachment",
            Self::RouteTable(_) => "AWS::EC2::RouteTable",
            Self::RouteTableAssociation(_) => "AWS::EC2::SubnetRouteTableAssociation",
            Self::Route(_) => "AWS::EC2::Route",
            Self::ElasticIp => "AWS::EC2::EIP",
            Self::NatGateway(_) => "AWS::EC2::NatGateway",
            Self::SecurityGroup(_) => "AWS::EC2::SecurityGroup",
            Self::SecurityGroupIngress(_) => "AWS::EC2::SecurityGroupIngress",
            Self::SecurityGroupEgress(_) => "AWS::EC2::SecurityGroupEgress",
            Self::Certificate(_) => "AWS::CertificateManager::Certificate",
            Self::RecordSet(_) => "AWS::Route53::RecordSet",
            Self::LoadBalancer(_) => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::Listener(_) => "AWS::ElasticLoadBalancingV2::Listener",
            Self::ListenerRule(_) => "AWS::ElasticLoadBalancingV2::ListenerRule",
            Self::TargetGroup(_) => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::Role(_) => "AWS::IAM::Role",
            Self::InstanceProfile(_) => "AWS::IAM::InstanceProfile",
            Self::LaunchConfiguration(_) => "AWS::AutoScaling::LaunchConfiguration",
            Self::AutoScalingGroup(_) => "AWS::AutoScaling::AutoScalingGroup",
            Self::LaunchTemplate(_) => "AWS::EC2::LaunchTemplate",
            Self::Ec2Fleet(_) => "AWS::EC2::EC2Fleet",
            Self::Bucket(_) => "AWS::S3::Bucket",
            Self::BucketPolicy(_) => "AWS::S3::BucketPolicy",
            Self::OriginAccessIdentity(_) => "AWS::CloudFront::CloudFrontOriginAccessIdentity",
            Self::Distribution(_) => "AWS::CloudFront::Distribution",
        }
    }

    /// Every token in the declaration that may point at another resource.
    pub fn tokens(&self) -> Vec<&Token> {
        match self {
            Self::Vpc(_) | Self::InternetGateway | Self::ElasticIp => vec![],
            Self::Subnet(s) => vec![&s.vpc, &s.availability_zone],
            Self::GatewayAttachment(a) => vec![&a.vpc, &a.gateway],
            Self::RouteTable(rt) => vec![&rt.vpc],
            Self::RouteTableAssociation(a) => vec![&a.route_table, &a.subnet],
            Self::Route(r) => match &r.target {
                network::RouteTarget::Gateway(t) | network::RouteTarget::NatGateway(t) => {
                    vec![&r.route_table, t]
                }
            },
            Self::NatGateway(n) => vec![&n.subnet, &n.allocation],
            Self::SecurityGroup(sg) => sg.tokens(),
            Self::SecurityGroupIngress(r) | Self::SecurityGroupEgress(r) => r.tokens(),
            Self::Certificate(c) => c.tokens(),
            Self::RecordSet(r) => r.tokens(),
            Self::LoadBalancer(lb) => lb.tokens(),
            Self::Listener(l) => l.tokens(),
            Self::ListenerRule(r) => r.tokens(),
            Self::TargetGroup(tg) => vec![&tg.vpc],
            Self::Role(_) => vec![],
            Self::InstanceProfile(p) => p.tokens(),
            Self::LaunchConfiguration(lc) => lc.tokens(),
            Self::AutoScalingGroup(asg) => asg.tokens(),
            Self::LaunchTemplate(lt) => lt.tokens(),
            Self::Ec2Fleet(f) => f.tokens(),
            Self::Bucket(_) => vec![],
            Self::BucketPolicy(p) => p.tokens(),
            Self::OriginAccessIdentity(_) => vec![],
            Self::Distribution(d) => d.tokens(),
        }
    }

    /// Resources are retained on stack deletion when they hold data.
    pub fn retained(&self) -> bool {
        matches!(self, Self::Bucket(_))
    }

    /// Short description used in diff output.
    pub fn summary(&self) -> String {
        match self {
            Self::Vpc(v) => format!("vpc {} ({} AZs)", v.cidr, v.max_azs),
            Self::Subnet(s) => format!(
                "{} subnet {}",
                if s.public { "public" } else { "private" },
                s.cidr
            ),
            Self::SecurityGroup(sg) => format!(
                "security group ({} ingress rule(s))",
                sg.ingress.len()
            ),
            Self::SecurityGroupIngress(r) => format!("ingress {}:{}", r.rule.protocol, r.rule.port),
            Self::SecurityGroupEgress(r) => format!("egress {}:{}", r.rule.protocol, r.rule.port),
            Self::Certificate(c) => format!("certificate {}", c.domain_name),
            Self::RecordSet(r) => format!("{} record {}", r.record_type, r.fqdn()),
            Self::Listener(l) => format!("listener {}:{}", l.protocol, l.port),
            Self::ListenerRule(r) => format!("listener rule priority {}", r.priority),
            Self::TargetGroup(tg) => format!("target group {}:{}", tg.protocol, tg.port),
            Self::LaunchConfiguration(lc) => format!("launch configuration {}", lc.instance_type),
            Self::AutoScalingGroup(a) => format!("auto scaling group {}..{}", a.min_size, a.max_size),
            Self::LaunchTemplate(lt) => format!("launch template {}", lt.instance_type),
            Self::Ec2Fleet(f) => format!("{} fleet x{}", f.default_capacity_type, f.total_capacity),
            Self::Distribution(d) => format!("distribution {}", d.aliases.join(", ")),
            other => other.type_name().rsplit("::").next().unwrap_or("resource").to_string(),
        }
    }
}
