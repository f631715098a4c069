//! Compute family: IAM role, launch configuration, auto-scaling group,
//! bastion launch template and spot fleet.

use crate::core::codegen::render_token;
use crate::core::types::Token;
use base64::Engine as _;
use serde_json::{json, Value};

/// Service role assumed by instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub assumed_by: String,
    pub managed_policies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceProfile {
    pub roles: Vec<Token>,
}

/// Boot script handed to the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub shebang: String,
    pub commands: Vec<String>,
}

impl UserData {
    pub fn for_linux(shebang: &str) -> Self {
        Self {
            shebang: shebang.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn add_commands<I, S>(&mut self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
    }

    /// Full script text.
    pub fn render(&self) -> String {
        let mut lines = vec![self.shebang.clone()];
        lines.extend(self.commands.iter().cloned());
        lines.join("\n")
    }

    /// Script text as the base64 payload the instance metadata expects.
    pub fn encoded(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.render())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfiguration {
    pub image: Token,
    pub instance_type: String,
    pub key_name: String,
    pub security_groups: Vec<Token>,
    pub user_data: UserData,
    pub instance_profile: Token,
}

/// Fleet of identical instances. Membership in target groups is declared here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoScalingGroup {
    pub launch_configuration: Token,
    pub min_size: u32,
    pub max_size: u32,
    pub subnets: Vec<Token>,
    pub target_groups: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceTag {
    pub resource_type: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTemplate {
    pub image: Token,
    pub instance_type: String,
    pub key_name: String,
    pub security_groups: Vec<Token>,
    pub tags: Vec<InstanceTag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetOverride {
    pub availability_zone: Token,
    pub subnet: Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ec2Fleet {
    pub launch_template: Token,
    pub version: Token,
    pub overrides: Vec<FleetOverride>,
    pub total_capacity: u32,
    pub default_capacity_type: String,
}

impl InstanceProfile {
    pub fn tokens(&self) -> Vec<&Token> {
        self.roles.iter().collect()
    }
}

impl LaunchConfiguration {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.image, &self.instance_profile];
        tokens.extend(&self.security_groups);
        tokens
    }
}

impl AutoScalingGroup {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.launch_configuration];
        tokens.extend(&self.subnets);
        tokens.extend(&self.target_groups);
        tokens
    }
}

impl LaunchTemplate {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.image];
        tokens.extend(&self.security_groups);
        tokens
    }
}

impl Ec2Fleet {
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![&self.launch_template, &self.version];
        for o in &self.overrides {
            tokens.push(&o.availability_zone);
            tokens.push(&o.subnet);
        }
        tokens
    }
}

fn tokens_json(tokens: &[Token]) -> Vec<Value> {
    tokens.iter().map(render_token).collect()
}

pub fn role_properties(role: &Role) -> Value {
    json!({
        "AssumeRolePolicyDocument": {
            "Version": "2012-10-17",
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": role.assumed_by },
            }],
        },
        "ManagedPolicyArns": role
            .managed_policies
            .iter()
            .map(|p| json!({
                "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":iam::aws:policy/", p]]
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn instance_profile_properties(p: &InstanceProfile) -> Value {
    json!({ "Roles": tokens_json(&p.roles) })
}

pub fn launch_configuration_properties(lc: &LaunchConfiguration) -> Value {
    json!({
        "ImageId": render_token(&lc.image),
        "InstanceType": lc.instance_type,
        "KeyName": lc.key_name,
        "IamInstanceProfile": render_token(&lc.instance_profile),
        "SecurityGroups": tokens_json(&lc.security_groups),
        "UserData": lc.user_data.encoded(),
    })
}

pub fn auto_scaling_group_properties(asg: &AutoScalingGroup) -> Value {
    json!({
        "LaunchConfigurationName": render_token(&asg.launch_configuration),
        "MinSize": asg.min_size.to_string(),
        "MaxSize": asg.max_size.to_string(),
        "VPCZoneIdentifier": tokens_json(&asg.subnets),
        "TargetGroupARNs": tokens_json(&asg.target_groups),
    })
}

pub fn launch_template_properties(lt: &LaunchTemplate) -> Value {
    let tag_specs: Vec<Value> = lt
        .tags
        .iter()
        .map(|t| {
            json!({
                "ResourceType": t.resource_type,
                "Tags": [{ "Key": t.key, "Value": t.value }],
            })
        })
        .collect();
    json!({
        "LaunchTemplateData": {
            "ImageId": render_token(&lt.image),
            "InstanceType": lt.instance_type,
            "KeyName": lt.key_name,
            "SecurityGroupIds": tokens_json(&lt.security_groups),
            "TagSpecifications": tag_specs,
        },
    })
}

pub fn ec2_fleet_properties(fleet: &Ec2Fleet) -> Value {
    json!({
        "LaunchTemplateConfigs": [{
            "LaunchTemplateSpecification": {
                "LaunchTemplateId": render_token(&fleet.launch_template),
                "Version": render_token(&fleet.version),
            },
            "Overrides": fleet
                .overrides
                .iter()
                .map(|o| json!({
                    "AvailabilityZone": render_token(&o.availability_zone),
                    "SubnetId": render_token(&o.subnet),
                }))
                .collect::<Vec<_>>(),
        }],
        "TargetCapacitySpecification": {
            "TotalTargetCapacity": fleet.total_capacity,
            "DefaultTargetCapacityType": fleet.default_capacity_type,
        },
    })
}
