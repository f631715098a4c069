//! Topology builder: assembles the stack graph in dependency order.
//!
//! network → security → certificate → load balancing → compute → CDN →
//! DNS → bastion. Every step only references resources declared by an
//! earlier step, so `StackGraphBuilder::add` never sees a forward
//! reference. Any failure aborts the whole build.

use super::graph::{Parameter, StackGraph, StackGraphBuilder};
use super::resolver::unique_id;
use super::types::{Peer, SecurityRule, StackConfig, Token};
use crate::error::{Error, Result};
use crate::resources::cdn::{
    Behavior, Bucket, BucketPolicy, Distribution, DistributionLogging, Origin,
    OriginAccessIdentity, OriginSource, PolicyStatement, Principal,
};
use crate::resources::compute::{
    AutoScalingGroup, Ec2Fleet, FleetOverride, InstanceProfile, InstanceTag, LaunchConfiguration,
    LaunchTemplate, Role, UserData,
};
use crate::resources::dns::{Certificate, RecordSet, CLOUDFRONT_ZONE_ID};
use crate::resources::loadbalancer::{
    elb_log_account, AccessLogs, Condition, Listener, ListenerAction, ListenerRule, LoadBalancer,
    TargetGroup,
};
use crate::resources::network::{
    subnet_cidrs, GatewayAttachment, NatGateway, Route, RouteTable, RouteTableAssociation,
    RouteTarget, Subnet, Vpc,
};
use crate::resources::security::{GroupRule, SecurityGroup};
use crate::resources::ResourceKind;
use indexmap::IndexMap;

pub const VPC_CIDR: &str = "10.0.0.0/16";
/// Header the distribution adds and the listener rule requires.
pub const ORIGIN_HEADER: &str = "cf-origin-custom-header";
pub const ORIGIN_RULE_PRIORITY: u32 = 2;
pub const SHEBANG: &str = "#!/bin/env bash";
pub const IMAGE_PARAMETER_PATH: &str =
    "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2";
pub const FLEET_MANAGED_POLICIES: &[&str] = &["service-role/AmazonEC2RoleforSSM"];
pub const BASTION_NAME_TAG: &str = "cfalbasg-bastion";
/// Hosted zone placeholder when no zone ID was supplied.
pub const DUMMY_ZONE_ID: &str = "DUMMY";

/// Adds nodes under the stack's construct path.
struct Scope {
    builder: StackGraphBuilder,
}

impl Scope {
    fn add(&mut self, path: &[&str], kind: ResourceKind) -> Result<String> {
        let id = unique_id(path)?;
        let full_path = format!("{}/{}", self.builder.name(), path.join("/"));
        self.builder.add(&id, &full_path, kind)
    }
}

struct NetworkIds {
    vpc: String,
    public_subnets: Vec<String>,
    private_subnets: Vec<String>,
}

struct GroupIds {
    alb: String,
    fleet: String,
    bastion: String,
}

struct LoadBalancerIds {
    alb: String,
    target_group: String,
}

fn group_id(id: &str) -> Token {
    Token::att(id, "GroupId")
}

fn default_group(vpc: &str) -> Token {
    Token::att(vpc, "DefaultSecurityGroup")
}

fn refs(ids: &[String]) -> Vec<Token> {
    ids.iter().map(|id| Token::reference(id)).collect()
}

fn image_parameter_name() -> String {
    let alnum: String = IMAGE_PARAMETER_PATH
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("SsmParameterValue{}Parameter", alnum)
}

/// Unique ID carried by the origin-verification header: the VPC's.
pub fn origin_verification_id(stack_name: &str) -> Result<String> {
    unique_id(&[stack_name, "vpc"])
}

/// Build the full resource graph for `cfg`.
pub fn build_topology(cfg: &StackConfig) -> Result<StackGraph> {
    tracing::info!(stack = %cfg.stack_name, site = %cfg.site_name(), "building topology");
    let mut scope = Scope {
        builder: StackGraphBuilder::new(&cfg.stack_name, cfg.description.clone()),
    };
    let uid = origin_verification_id(&cfg.stack_name)?;

    let image = scope.builder.add_parameter(
        &image_parameter_name(),
        Parameter {
            param_type: "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>".to_string(),
            default: IMAGE_PARAMETER_PATH.to_string(),
            description: Some("Amazon Linux 2 image".to_string()),
        },
    )?;

    let net = network(&mut scope, cfg)?;
    let groups = security(&mut scope, cfg, &net)?;

    let zone = match &cfg.hosted_zone_id {
        Some(id) => Token::lit(id.as_str()),
        None => {
            tracing::warn!(
                domain = %cfg.domain,
                "no hostedzoneid in context; using placeholder '{}'",
                DUMMY_ZONE_ID
            );
            Token::lit(DUMMY_ZONE_ID)
        }
    };
    let cert = scope.add(
        &["mycert", "Resource"],
        ResourceKind::Certificate(Certificate {
            domain_name: cfg.certificate_name(),
            hosted_zone: zone.clone(),
        }),
    )?;

    let lb = load_balancing(&mut scope, cfg, &net, &groups, &cert, &uid)?;
    compute(&mut scope, cfg, &net, &groups, &lb, &image)?;
    let distribution = cdn(&mut scope, cfg, &lb, &cert, &uid)?;

    scope.add(
        &["host", "Resource"],
        ResourceKind::RecordSet(RecordSet {
            zone,
            zone_name: cfg.domain.clone(),
            record_name: cfg.hostname.clone(),
            record_type: "A".to_string(),
            alias_target: Token::att(&distribution, "DomainName"),
            alias_zone_id: CLOUDFRONT_ZONE_ID.to_string(),
        }),
    )?;

    bastion(&mut scope, cfg, &net, &groups, &image)?;

    // Both outputs carry the same value.
    scope
        .builder
        .add_output("uid", Token::lit(uid.as_str()), None)?;
    scope
        .builder
        .add_output("uid2", Token::lit(uid.as_str()), None)?;

    let graph = scope.builder.finish();
    check_origin_verification(&graph)?;
    tracing::info!(resources = graph.nodes().len(), "topology built");
    Ok(graph)
}

fn network(scope: &mut Scope, cfg: &StackConfig) -> Result<NetworkIds> {
    let azs = usize::from(cfg.max_azs);
    let cidrs = subnet_cidrs(VPC_CIDR, azs * 2)?;
    let vpc = scope.add(
        &["vpc", "Resource"],
        ResourceKind::Vpc(Vpc {
            cidr: VPC_CIDR.to_string(),
            max_azs: cfg.max_azs,
        }),
    )?;

    let igw = scope.add(&["vpc", "IGW"], ResourceKind::InternetGateway)?;
    let attachment = scope.add(
        &["vpc", "VPCGW"],
        ResourceKind::GatewayAttachment(GatewayAttachment {
            vpc: Token::reference(&vpc),
            gateway: Token::reference(&igw),
        }),
    )?;

    let mut public_subnets = Vec::new();
    let mut nats = Vec::new();
    for (i, cidr) in cidrs[..azs].iter().enumerate() {
        let name = format!("PublicSubnet{}", i + 1);
        let (subnet, rt) = subnet_with_table(scope, &vpc, &name, cidr, i, true)?;
        let route = scope.add(
            &["vpc", &name, "DefaultRoute"],
            ResourceKind::Route(Route {
                route_table: Token::reference(&rt),
                destination: "0.0.0.0/0".to_string(),
                target: RouteTarget::Gateway(Token::reference(&igw)),
            }),
        )?;
        scope.builder.depends_on(&route, &attachment)?;

        let eip = scope.add(&["vpc", &name, "EIP"], ResourceKind::ElasticIp)?;
        let nat = scope.add(
            &["vpc", &name, "NATGateway"],
            ResourceKind::NatGateway(NatGateway {
                subnet: Token::reference(&subnet),
                allocation: Token::att(&eip, "AllocationId"),
            }),
        )?;
        public_subnets.push(subnet);
        nats.push(nat);
    }

    let mut private_subnets = Vec::new();
    for (i, cidr) in cidrs[azs..].iter().enumerate() {
        let name = format!("PrivateSubnet{}", i + 1);
        let (subnet, rt) = subnet_with_table(scope, &vpc, &name, cidr, i, false)?;
        scope.add(
            &["vpc", &name, "DefaultRoute"],
            ResourceKind::Route(Route {
                route_table: Token::reference(&rt),
                destination: "0.0.0.0/0".to_string(),
                target: RouteTarget::NatGateway(Token::reference(&nats[i])),
            }),
        )?;
        private_subnets.push(subnet);
    }

    tracing::debug!(
        public = public_subnets.len(),
        private = private_subnets.len(),
        "network declared"
    );
    Ok(NetworkIds {
        vpc,
        public_subnets,
        private_subnets,
    })
}

fn subnet_with_table(
    scope: &mut Scope,
    vpc: &str,
    name: &str,
    cidr: &str,
    az: usize,
    public: bool,
) -> Result<(String, String)> {
    let az = u8::try_from(az).map_err(|_| Error::InvalidContext {
        key: "maxazs".to_string(),
        message: format!("availability zone index {} out of range", az),
    })?;
    let subnet = scope.add(
        &["vpc", name, "Subnet"],
        ResourceKind::Subnet(Subnet {
            vpc: Token::reference(vpc),
            cidr: cidr.to_string(),
            availability_zone: Token::AvailabilityZone(az),
            public,
            name: if public { "Public" } else { "Private" }.to_string(),
        }),
    )?;
    let rt = scope.add(
        &["vpc", name, "RouteTable"],
        ResourceKind::RouteTable(RouteTable {
            vpc: Token::reference(vpc),
        }),
    )?;
    scope.add(
        &["vpc", name, "RouteTableAssociation"],
        ResourceKind::RouteTableAssociation(RouteTableAssociation {
            route_table: Token::reference(&rt),
            subnet: Token::reference(&subnet),
        }),
    )?;
    Ok((subnet, rt))
}

fn security(scope: &mut Scope, cfg: &StackConfig, net: &NetworkIds) -> Result<GroupIds> {
    let stack = cfg.stack_name.as_str();
    let vpc = Token::reference(&net.vpc);

    let alb = scope.add(
        &["alb", "SecurityGroup", "Resource"],
        ResourceKind::SecurityGroup(SecurityGroup {
            description: format!(
                "Automatically created Security Group for ELB {}",
                unique_id(&[stack, "alb"])?
            ),
            vpc: vpc.clone(),
            group_name: None,
            ingress: vec![SecurityRule::tcp(443, Peer::AnyIpv4)
                .with_description(Some("Allow from anyone on port 443".to_string()))],
            egress: Vec::new(),
            allow_all_outbound: false,
        }),
    )?;

    let fleet = scope.add(
        &["asg", "InstanceSecurityGroup", "Resource"],
        ResourceKind::SecurityGroup(SecurityGroup {
            description: format!("{}/asg/InstanceSecurityGroup", stack),
            vpc: vpc.clone(),
            group_name: None,
            ingress: Vec::new(),
            egress: Vec::new(),
            allow_all_outbound: true,
        }),
    )?;

    // Group-to-group rules are standalone so the two groups stay acyclic.
    let to_fleet = format!("to {}:80", unique_id(&[stack, "asg", "InstanceSecurityGroup"])?);
    scope.add(
        &["alb", "SecurityGroup", &to_fleet],
        ResourceKind::SecurityGroupEgress(GroupRule {
            group: group_id(&alb),
            rule: SecurityRule::tcp(80, Peer::SecurityGroup(group_id(&fleet)))
                .with_description(Some("Load balancer to target".to_string())),
        }),
    )?;
    let from_alb = format!("from {}:80", unique_id(&[stack, "alb", "SecurityGroup"])?);
    scope.add(
        &["asg", "InstanceSecurityGroup", &from_alb],
        ResourceKind::SecurityGroupIngress(GroupRule {
            group: group_id(&fleet),
            rule: SecurityRule::tcp(80, Peer::SecurityGroup(group_id(&alb)))
                .with_description(Some("Load balancer to target".to_string())),
        }),
    )?;

    // One /32 rule per allowlist entry. Entries are not validated.
    let ingress: Vec<SecurityRule> = cfg
        .allow_ips
        .iter()
        .map(|a| SecurityRule::tcp(22, Peer::host(&a.ip)).with_description(a.description.clone()))
        .collect();
    tracing::debug!(rules = ingress.len(), "bastion allowlist");
    let bastion = scope.add(
        &["bastionsg", "Resource"],
        ResourceKind::SecurityGroup(SecurityGroup {
            description: format!("{}/bastionsg", stack),
            vpc,
            group_name: Some("bastionsg".to_string()),
            ingress,
            egress: Vec::new(),
            allow_all_outbound: true,
        }),
    )?;

    Ok(GroupIds {
        alb,
        fleet,
        bastion,
    })
}

fn load_balancing(
    scope: &mut Scope,
    cfg: &StackConfig,
    net: &NetworkIds,
    groups: &GroupIds,
    cert: &str,
    uid: &str,
) -> Result<LoadBalancerIds> {
    let log_bucket = scope.add(&["alblog", "Resource"], ResourceKind::Bucket(Bucket))?;

    let region = cfg.environment.region.as_deref().unwrap_or_default();
    let principal = match elb_log_account(region) {
        Some(account) => Principal::Account(account.to_string()),
        None => Principal::Service("logdelivery.elasticloadbalancing.amazonaws.com".to_string()),
    };
    let account_path = cfg.environment.account.as_deref().unwrap_or("*");
    let log_policy = scope.add(
        &["alblog", "Policy", "Resource"],
        ResourceKind::BucketPolicy(BucketPolicy {
            bucket: Token::reference(&log_bucket),
            statements: vec![PolicyStatement {
                actions: vec!["s3:PutObject".to_string()],
                principal,
                resources: vec![Token::Join(vec![
                    Token::att(&log_bucket, "Arn"),
                    Token::lit(format!("/alblog/AWSLogs/{}/*", account_path)),
                ])],
            }],
        }),
    )?;

    let alb = scope.add(
        &["alb", "Resource"],
        ResourceKind::LoadBalancer(LoadBalancer {
            internet_facing: true,
            subnets: refs(&net.public_subnets),
            security_groups: vec![group_id(&groups.alb)],
            access_logs: Some(AccessLogs {
                bucket: Token::reference(&log_bucket),
                prefix: "alblog".to_string(),
            }),
        }),
    )?;
    scope.builder.depends_on(&alb, &log_policy)?;

    let listener = scope.add(
        &["alb", "listener", "Resource"],
        ResourceKind::Listener(Listener {
            load_balancer: Token::reference(&alb),
            port: 443,
            protocol: "HTTPS".to_string(),
            certificates: vec![Token::reference(cert)],
            default_action: ListenerAction::FixedResponse {
                status_code: 403,
                content_type: "text/plain".to_string(),
                message_body: "wrong route".to_string(),
            },
        }),
    )?;

    let target_group = scope.add(
        &["albtg1", "Resource"],
        ResourceKind::TargetGroup(TargetGroup {
            vpc: Token::reference(&net.vpc),
            port: 80,
            protocol: "HTTP".to_string(),
        }),
    )?;

    scope.add(
        &["albrule"],
        ResourceKind::ListenerRule(ListenerRule {
            listener: Token::reference(&listener),
            priority: ORIGIN_RULE_PRIORITY,
            conditions: vec![Condition::HttpHeader {
                name: ORIGIN_HEADER.to_string(),
                values: vec![Token::lit(uid)],
            }],
            actions: vec![ListenerAction::Forward {
                target_group: Token::reference(&target_group),
            }],
        }),
    )?;

    Ok(LoadBalancerIds { alb, target_group })
}

fn compute(
    scope: &mut Scope,
    cfg: &StackConfig,
    net: &NetworkIds,
    groups: &GroupIds,
    lb: &LoadBalancerIds,
    image: &Token,
) -> Result<()> {
    let role = scope.add(
        &["asg", "InstanceRole", "Resource"],
        ResourceKind::Role(Role {
            assumed_by: "ec2.amazonaws.com".to_string(),
            managed_policies: FLEET_MANAGED_POLICIES.iter().map(|p| p.to_string()).collect(),
        }),
    )?;
    let profile = scope.add(
        &["asg", "InstanceProfile"],
        ResourceKind::InstanceProfile(InstanceProfile {
            roles: vec![Token::reference(&role)],
        }),
    )?;

    let mut user_data = UserData::for_linux(SHEBANG);
    user_data.add_commands(cfg.user_data.iter().cloned());

    let launch_config = scope.add(
        &["asg", "LaunchConfig"],
        ResourceKind::LaunchConfiguration(LaunchConfiguration {
            image: image.clone(),
            instance_type: cfg.instance_type.clone(),
            key_name: cfg.keypair.clone(),
            security_groups: vec![group_id(&groups.fleet), default_group(&net.vpc)],
            user_data,
            instance_profile: Token::reference(&profile),
        }),
    )?;
    scope.builder.depends_on(&launch_config, &role)?;

    scope.add(
        &["asg", "ASG"],
        ResourceKind::AutoScalingGroup(AutoScalingGroup {
            launch_configuration: Token::reference(&launch_config),
            min_size: 1,
            max_size: 1,
            subnets: refs(&net.private_subnets),
            target_groups: vec![Token::reference(&lb.target_group)],
        }),
    )?;
    Ok(())
}

fn cdn(
    scope: &mut Scope,
    cfg: &StackConfig,
    lb: &LoadBalancerIds,
    cert: &str,
    uid: &str,
) -> Result<String> {
    let images = scope.add(&["s3img", "Resource"], ResourceKind::Bucket(Bucket))?;
    let logs = scope.add(&["cflog", "Resource"], ResourceKind::Bucket(Bucket))?;
    let oai = scope.add(
        &["OAI"],
        ResourceKind::OriginAccessIdentity(OriginAccessIdentity {
            comment: format!("access-identity-{}", cfg.hostname),
        }),
    )?;
    scope.add(
        &["s3img", "Policy", "Resource"],
        ResourceKind::BucketPolicy(BucketPolicy {
            bucket: Token::reference(&images),
            statements: vec![PolicyStatement {
                actions: vec!["s3:GetObject".to_string()],
                principal: Principal::CanonicalUser(Token::att(&oai, "S3CanonicalUserId")),
                resources: vec![Token::Join(vec![
                    Token::att(&images, "Arn"),
                    Token::lit("/*"),
                ])],
            }],
        }),
    )?;

    let mut headers = IndexMap::new();
    headers.insert(ORIGIN_HEADER.to_string(), Token::lit(uid));

    let dynamic = Origin {
        source: OriginSource::Custom {
            domain_name: Token::att(&lb.alb, "DNSName"),
            protocol_policy: "match-viewer".to_string(),
            ssl_protocols: vec!["TLSv1.1".to_string()],
        },
        custom_headers: headers,
        behaviors: vec![Behavior {
            forward_query_string: true,
            forward_cookies: "all".to_string(),
            forward_headers: vec!["*".to_string()],
            ..Behavior::default_behavior()
        }],
    };
    let assets = Origin {
        source: OriginSource::S3 {
            bucket_domain: Token::att(&images, "RegionalDomainName"),
            identity: Token::reference(&oai),
        },
        custom_headers: IndexMap::new(),
        behaviors: vec![Behavior::for_path("/images/*")],
    };

    scope.add(
        &["cf", "CFDistribution"],
        ResourceKind::Distribution(Distribution {
            aliases: vec![cfg.site_name()],
            certificate: Token::reference(cert),
            security_policy: "TLSv1.1_2016".to_string(),
            origins: vec![dynamic, assets],
            price_class: "PriceClass_100".to_string(),
            logging: Some(DistributionLogging {
                bucket: Token::att(&logs, "RegionalDomainName"),
                prefix: "cflog".to_string(),
            }),
            comment: cfg.stack_name.clone(),
            default_root_object: String::new(),
        }),
    )
}

fn bastion(
    scope: &mut Scope,
    cfg: &StackConfig,
    net: &NetworkIds,
    groups: &GroupIds,
    image: &Token,
) -> Result<()> {
    let first_public = net.public_subnets.first().ok_or_else(|| Error::InvalidContext {
        key: "maxazs".to_string(),
        message: "the bastion needs at least one public subnet".to_string(),
    })?;

    let template = scope.add(
        &["ltemp"],
        ResourceKind::LaunchTemplate(LaunchTemplate {
            image: image.clone(),
            instance_type: cfg.bastion_instance_type.clone(),
            key_name: cfg.keypair.clone(),
            security_groups: vec![group_id(&groups.bastion), default_group(&net.vpc)],
            tags: vec![InstanceTag {
                resource_type: "instance".to_string(),
                key: "Name".to_string(),
                value: BASTION_NAME_TAG.to_string(),
            }],
        }),
    )?;

    scope.add(
        &["bastion"],
        ResourceKind::Ec2Fleet(Ec2Fleet {
            launch_template: Token::reference(&template),
            version: Token::att(&template, "LatestVersionNumber"),
            overrides: vec![FleetOverride {
                availability_zone: Token::AvailabilityZone(0),
                subnet: Token::reference(first_public),
            }],
            total_capacity: 1,
            default_capacity_type: "spot".to_string(),
        }),
    )?;
    Ok(())
}

/// Every distribution must send the origin header, and each value it sends
/// must match a listener rule.
fn check_origin_verification(graph: &StackGraph) -> Result<()> {
    let rule_values: Vec<&Token> = graph
        .nodes()
        .values()
        .filter_map(|n| match &n.kind {
            ResourceKind::ListenerRule(r) => Some(r.header_values(ORIGIN_HEADER)),
            _ => None,
        })
        .flatten()
        .collect();

    for (id, node) in graph.nodes() {
        if let ResourceKind::Distribution(d) = &node.kind {
            let values = d.origin_header_values(ORIGIN_HEADER);
            if values.is_empty() {
                return Err(Error::InvalidContext {
                    key: ORIGIN_HEADER.to_string(),
                    message: format!("distribution '{}' sends no origin header", id),
                });
            }
            for value in values {
                if !rule_values.contains(&value) {
                    return Err(Error::InvalidContext {
                        key: ORIGIN_HEADER.to_string(),
                        message: format!("distribution '{}' sends a header no rule accepts", id),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AllowIp, Environment};
    use proptest::prelude::*;

    fn config(allow: &[&str]) -> StackConfig {
        StackConfig {
            stack_name: "CfAlbAsgStack".to_string(),
            description: None,
            environment: Environment {
                account: Some("123456789012".to_string()),
                region: Some("ap-northeast-1".to_string()),
            },
            domain: "example.com".to_string(),
            hostname: "www".to_string(),
            keypair: "ops".to_string(),
            allow_ips: allow
                .iter()
                .map(|ip| AllowIp {
                    ip: ip.to_string(),
                    description: Some(format!("admin {}", ip)),
                })
                .collect(),
            max_azs: 2,
            instance_type: "t2.medium".to_string(),
            bastion_instance_type: "t2.micro".to_string(),
            user_data: vec!["echo hi".to_string()],
            cert_host: "www".to_string(),
            hosted_zone_id: Some("Z0123".to_string()),
        }
    }

    fn bastion_group(graph: &StackGraph) -> &SecurityGroup {
        graph
            .nodes()
            .values()
            .find_map(|n| match &n.kind {
                ResourceKind::SecurityGroup(sg) if sg.group_name.as_deref() == Some("bastionsg") => {
                    Some(sg)
                }
                _ => None,
            })
            .unwrap()
    }

    fn listener_rules(graph: &StackGraph) -> Vec<&ListenerRule> {
        graph
            .nodes()
            .values()
            .filter_map(|n| match &n.kind {
                ResourceKind::ListenerRule(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn distribution(graph: &StackGraph) -> &Distribution {
        graph
            .nodes()
            .values()
            .find_map(|n| match &n.kind {
                ResourceKind::Distribution(d) => Some(d),
                _ => None,
            })
            .unwrap()
    }

    fn graph_with_header(header: Option<&str>, rule_value: &str) -> StackGraph {
        let mut b = StackGraphBuilder::new("S", None);
        b.add(
            "albrule",
            "S/albrule",
            ResourceKind::ListenerRule(ListenerRule {
                listener: Token::lit("listener"),
                priority: ORIGIN_RULE_PRIORITY,
                conditions: vec![Condition::HttpHeader {
                    name: ORIGIN_HEADER.to_string(),
                    values: vec![Token::lit(rule_value)],
                }],
                actions: Vec::new(),
            }),
        )
        .unwrap();
        let mut custom_headers = IndexMap::new();
        if let Some(value) = header {
            custom_headers.insert(ORIGIN_HEADER.to_string(), Token::lit(value));
        }
        b.add(
            "cf",
            "S/cf",
            ResourceKind::Distribution(Distribution {
                aliases: vec!["www.example.com".to_string()],
                certificate: Token::lit("arn:cert"),
                security_policy: "TLSv1.1_2016".to_string(),
                origins: vec![Origin {
                    source: OriginSource::Custom {
                        domain_name: Token::lit("alb.example.com"),
                        protocol_policy: "match-viewer".to_string(),
                        ssl_protocols: vec!["TLSv1.1".to_string()],
                    },
                    custom_headers,
                    behaviors: vec![Behavior::default_behavior()],
                }],
                price_class: "PriceClass_100".to_string(),
                logging: None,
                comment: "S".to_string(),
                default_root_object: String::new(),
            }),
        )
        .unwrap();
        b.finish()
    }

    #[test]
    fn test_origin_check_accepts_matching_header() {
        check_origin_verification(&graph_with_header(Some("uid"), "uid")).unwrap();
    }

    #[test]
    fn test_origin_check_rejects_missing_header() {
        let err = check_origin_verification(&graph_with_header(None, "uid")).unwrap_err();
        assert!(
            matches!(err, Error::InvalidContext { ref message, .. } if message.contains("sends no origin header"))
        );
    }

    #[test]
    fn test_origin_check_rejects_unmatched_header() {
        let err = check_origin_verification(&graph_with_header(Some("other"), "uid")).unwrap_err();
        assert!(matches!(err, Error::InvalidContext { ref key, .. } if key == ORIGIN_HEADER));
    }

    #[test]
    fn test_origin_header_matches_rule_condition() {
        let g = build_topology(&config(&["203.0.113.1"])).unwrap();
        let rules = listener_rules(&g);
        assert_eq!(rules.len(), 1);
        let rule_values = rules[0].header_values(ORIGIN_HEADER);
        let origin_values = distribution(&g).origin_header_values(ORIGIN_HEADER);
        assert_eq!(rule_values.len(), 1);
        assert_eq!(rule_values, origin_values);
        let uid = origin_verification_id("CfAlbAsgStack").unwrap();
        assert_eq!(rule_values[0], &Token::lit(uid.as_str()));
    }

    #[test]
    fn test_uid_outputs_identical() {
        let g = build_topology(&config(&[])).unwrap();
        assert_eq!(g.outputs()["uid"].value, g.outputs()["uid2"].value);
        let uid = origin_verification_id("CfAlbAsgStack").unwrap();
        assert_eq!(g.outputs()["uid"].value.as_literal(), Some(uid.as_str()));
        assert!(uid.starts_with("CfAlbAsgStackvpc"));
    }

    #[test]
    fn test_one_rule_per_allowlist_entry() {
        let g = build_topology(&config(&["203.0.113.1", "198.51.100.2"])).unwrap();
        let sg = bastion_group(&g);
        assert_eq!(sg.ingress.len(), 2);
        assert_eq!(sg.ingress[0].peer, Peer::Ipv4("203.0.113.1/32".to_string()));
        assert_eq!(sg.ingress[1].peer, Peer::Ipv4("198.51.100.2/32".to_string()));
        assert!(sg.ingress.iter().all(|r| r.port == 22));
        assert_eq!(sg.ingress[0].description.as_deref(), Some("admin 203.0.113.1"));
    }

    #[test]
    fn test_empty_allowlist_no_ingress() {
        let g = build_topology(&config(&[])).unwrap();
        assert!(bastion_group(&g).ingress.is_empty());
    }

    #[test]
    fn test_malformed_ip_passes_through() {
        // Known gap: allowlist entries are not validated.
        let g = build_topology(&config(&["not-an-ip"])).unwrap();
        let sg = bastion_group(&g);
        assert_eq!(sg.ingress[0].peer, Peer::Ipv4("not-an-ip/32".to_string()));
    }

    #[test]
    fn test_default_action_denies_and_rule_forwards() {
        let g = build_topology(&config(&[])).unwrap();
        let listener = g
            .nodes()
            .values()
            .find_map(|n| match &n.kind {
                ResourceKind::Listener(l) => Some(l),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            listener.default_action,
            ListenerAction::FixedResponse {
                status_code: 403,
                content_type: "text/plain".to_string(),
                message_body: "wrong route".to_string(),
            }
        );

        let target_groups = g.ids_of_type("AWS::ElasticLoadBalancingV2::TargetGroup");
        assert_eq!(target_groups.len(), 1);
        let rule = listener_rules(&g)[0];
        assert_eq!(rule.priority, ORIGIN_RULE_PRIORITY);
        assert_eq!(
            rule.actions,
            vec![ListenerAction::Forward {
                target_group: Token::reference(target_groups[0]),
            }]
        );
    }

    #[test]
    fn test_fleet_registered_and_grouped() {
        let g = build_topology(&config(&[])).unwrap();
        let tg = g.ids_of_type("AWS::ElasticLoadBalancingV2::TargetGroup")[0];
        let asg = g
            .nodes()
            .values()
            .find_map(|n| match &n.kind {
                ResourceKind::AutoScalingGroup(a) => Some(a),
                _ => None,
            })
            .unwrap();
        assert_eq!(asg.target_groups, vec![Token::reference(tg)]);
        assert_eq!((asg.min_size, asg.max_size), (1, 1));
        assert_eq!(asg.subnets.len(), 2);

        let lc = g
            .nodes()
            .values()
            .find_map(|n| match &n.kind {
                ResourceKind::LaunchConfiguration(lc) => Some(lc),
                _ => None,
            })
            .unwrap();
        assert_eq!(lc.security_groups.len(), 2);
        assert_eq!(lc.user_data.shebang, SHEBANG);
        assert_eq!(lc.user_data.commands, vec!["echo hi"]);
    }

    #[test]
    fn test_network_shape() {
        let mut cfg = config(&[]);
        cfg.max_azs = 3;
        let g = build_topology(&cfg).unwrap();
        assert_eq!(g.ids_of_type("AWS::EC2::Subnet").len(), 6);
        assert_eq!(g.ids_of_type("AWS::EC2::NatGateway").len(), 3);
        assert_eq!(g.ids_of_type("AWS::EC2::VPC").len(), 1);
    }

    #[test]
    fn test_missing_zone_uses_placeholder() {
        let mut cfg = config(&[]);
        cfg.hosted_zone_id = None;
        let g = build_topology(&cfg).unwrap();
        let cert = g
            .nodes()
            .values()
            .find_map(|n| match &n.kind {
                ResourceKind::Certificate(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(cert.hosted_zone, Token::lit(DUMMY_ZONE_ID));
        assert_eq!(cert.domain_name, "www.example.com");
    }

    #[test]
    fn test_bastion_fleet_in_first_public_subnet() {
        let g = build_topology(&config(&[])).unwrap();
        let fleet = g
            .nodes()
            .values()
            .find_map(|n| match &n.kind {
                ResourceKind::Ec2Fleet(f) => Some(f),
                _ => None,
            })
            .unwrap();
        assert_eq!(fleet.default_capacity_type, "spot");
        assert_eq!(fleet.total_capacity, 1);
        let subnet = fleet.overrides[0].subnet.resource_refs()[0];
        match &g.get(subnet).unwrap().kind {
            ResourceKind::Subnet(s) => {
                assert!(s.public);
                assert_eq!(s.availability_zone, Token::AvailabilityZone(0));
            }
            other => panic!("expected subnet, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = build_topology(&config(&["203.0.113.1"])).unwrap();
        let b = build_topology(&config(&["203.0.113.1"])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape(), b.shape());
    }

    proptest! {
        #[test]
        fn prop_allowlist_rule_count(ips in proptest::collection::vec("[0-9a-z.:-]{1,20}", 0..8)) {
            let refs: Vec<&str> = ips.iter().map(String::as_str).collect();
            let g = build_topology(&config(&refs)).unwrap();
            let sg = bastion_group(&g);
            prop_assert_eq!(sg.ingress.len(), ips.len());
            for (rule, ip) in sg.ingress.iter().zip(&ips) {
                prop_assert_eq!(&rule.peer, &Peer::Ipv4(format!("{}/32", ip)));
            }
        }

        #[test]
        fn prop_shape_independent_of_stack_name(name in "[A-Z][A-Za-z0-9]{0,15}") {
            let mut a = config(&["10.1.1.1"]);
            a.stack_name = name.clone();
            let mut b = a.clone();
            b.stack_name = format!("{}X", name);
            let shape_a: Vec<_> = build_topology(&a).unwrap().shape()
                .into_iter().map(|(t, _, e)| (t, e.len())).collect();
            let shape_b: Vec<_> = build_topology(&b).unwrap().shape()
                .into_iter().map(|(t, _, e)| (t, e.len())).collect();
            prop_assert_eq!(shape_a, shape_b);
        }
    }
}
