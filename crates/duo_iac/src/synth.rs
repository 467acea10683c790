//! CloudFormation template synthesis.
//!
//! [`TemplateSynthesizer`] implements [`ProvisioningBackend`] by writing
//! resource declarations into a template. Nothing is contacted; the
//! template is applied later by the deployment engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tracing::{debug, info};

use crate::backend::{NetworkRef, ProvisioningBackend, ResourceKind, ResourceRef, ServiceWiring};
use crate::context::ContextCache;
use crate::error::{IacError, IacResult};
use crate::topology::{
    ClusterSpec, ImageAsset, ListenerSpec, LoadBalancerSpec, ServiceSpec, StackOutput,
    StackProfile, TargetGroupSpec, TaskDefinitionSpec, Value,
};

/// Placeholder ids used until the default VPC lookup is resolved.
const DUMMY_VPC_ID: &str = "vpc-12345";
const DUMMY_SUBNET_IDS: &[&str] = &["p-12345", "p-67890"];

/// Bootstrap repository that receives container image assets.
const ASSET_REPOSITORY: &str = "cdk-hnb659fds-container-assets-${AWS::AccountId}-${AWS::Region}";

/// Context query the engine must answer before the template is usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingContext {
    pub key: String,
    pub provider: String,
    pub props: BTreeMap<String, Json>,
}

/// Docker image asset to be built and pushed before deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerImageAsset {
    pub id: String,
    pub directory: String,
    pub dockerfile: String,
    pub repository_name: String,
    pub image_tag: String,
}

/// A synthesized template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    pub resources: BTreeMap<String, Json>,
    pub outputs: BTreeMap<String, Json>,
}

impl Template {
    /// Resources of a given CloudFormation type.
    pub fn resources_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = (&'a String, &'a Json)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r["Type"] == resource_type)
    }
}

/// Backend that authors a CloudFormation template.
#[derive(Debug, Clone)]
pub struct TemplateSynthesizer {
    profile: StackProfile,
    context: ContextCache,
    template: Template,
    assets: Vec<DockerImageAsset>,
    missing_context: Vec<MissingContext>,
}

impl TemplateSynthesizer {
    pub fn new(profile: StackProfile) -> Self {
        Self {
            template: Template {
                format_version: "2010-09-09".to_string(),
                description: format!("{} - containerized web app on Fargate", profile.stack_name),
                ..Template::default()
            },
            profile,
            context: ContextCache::default(),
            assets: Vec::new(),
            missing_context: Vec::new(),
        }
    }

    /// Answer lookups from `context` before recording them as missing.
    pub fn with_context(mut self, context: ContextCache) -> Self {
        self.context = context;
        self
    }

    /// Context key of the default VPC lookup for this profile.
    pub fn network_lookup_key(&self) -> String {
        format!(
            "vpc-provider:account={}:filter.isDefault=true:region={}:returnAsymmetricSubnets=true",
            self.account(),
            self.profile.region
        )
    }

    fn account(&self) -> String {
        self.profile.account.clone().unwrap_or_else(|| "unknown-account".to_string())
    }

    pub fn profile(&self) -> &StackProfile {
        &self.profile
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn assets(&self) -> &[DockerImageAsset] {
        &self.assets
    }

    pub fn missing_context(&self) -> &[MissingContext] {
        &self.missing_context
    }

    fn add_resource(&mut self, logical_id: &str, resource: Json) -> IacResult<()> {
        if self.template.resources.contains_key(logical_id) {
            return Err(IacError::DuplicateLogicalId(logical_id.to_string()));
        }
        debug!("Declared {} ({})", logical_id, resource["Type"]);
        self.template.resources.insert(logical_id.to_string(), resource);
        Ok(())
    }

    fn require(&self, resource: &ResourceRef) -> IacResult<()> {
        if self.template.resources.contains_key(&resource.logical_id)
            || (resource.kind == ResourceKind::ImageAsset
                && self.assets.iter().any(|a| a.id == resource.logical_id))
        {
            Ok(())
        } else {
            Err(IacError::UnknownResource(resource.logical_id.clone()))
        }
    }

    fn image_uri(&self, image: &ResourceRef) -> IacResult<Value> {
        let asset = self
            .assets
            .iter()
            .find(|a| a.id == image.logical_id)
            .ok_or_else(|| IacError::UnknownResource(image.logical_id.clone()))?;
        Ok(Value::Sub(format!(
            "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}:{}",
            asset.repository_name, asset.image_tag
        )))
    }
}

impl ProvisioningBackend for TemplateSynthesizer {
    fn image_asset(&mut self, asset: &ImageAsset) -> IacResult<ResourceRef> {
        if self.assets.iter().any(|a| a.id == asset.id) {
            return Err(IacError::DuplicateLogicalId(asset.id.clone()));
        }
        let tag = if asset.fingerprint.is_empty() {
            "latest".to_string()
        } else {
            asset.fingerprint.clone()
        };
        self.assets.push(DockerImageAsset {
            id: asset.id.clone(),
            directory: asset.directory.to_string_lossy().to_string(),
            dockerfile: asset.descriptor.clone(),
            repository_name: ASSET_REPOSITORY.to_string(),
            image_tag: tag,
        });
        Ok(ResourceRef::new(&asset.id, ResourceKind::ImageAsset))
    }

    fn lookup_default_network(&mut self) -> IacResult<NetworkRef> {
        let key = self.network_lookup_key();
        if let Some(network) = self.context.network(&key)? {
            info!("Using cached default VPC {}", network.vpc_id);
            return Ok(network);
        }

        let account = self.account();
        let props = BTreeMap::from([
            ("account".to_string(), json!(account)),
            ("region".to_string(), json!(self.profile.region)),
            ("filter".to_string(), json!({ "isDefault": "true" })),
            ("returnAsymmetricSubnets".to_string(), json!(true)),
        ]);
        info!("Default VPC lookup deferred: {}", key);
        self.missing_context.push(MissingContext {
            key,
            provider: "vpc-provider".to_string(),
            props,
        });

        Ok(NetworkRef {
            vpc_id: DUMMY_VPC_ID.to_string(),
            public_subnet_ids: DUMMY_SUBNET_IDS.iter().map(|s| s.to_string()).collect(),
            placeholder: true,
        })
    }

    fn cluster(&mut self, spec: &ClusterSpec, _network: &NetworkRef) -> IacResult<ResourceRef> {
        self.add_resource(
            &spec.id,
            json!({
                "Type": "AWS::ECS::Cluster",
                "Properties": { "ClusterName": spec.cluster_name }
            }),
        )?;
        Ok(ResourceRef::new(&spec.id, ResourceKind::Cluster))
    }

    fn task_definition(&mut self, spec: &TaskDefinitionSpec, image: &ResourceRef) -> IacResult<ResourceRef> {
        self.require(image)?;
        let image_uri = self.image_uri(image)?;

        let execution_role = format!("{}ExecutionRole", spec.id);
        self.add_resource(
            &execution_role,
            json!({
                "Type": "AWS::IAM::Role",
                "Properties": {
                    "AssumeRolePolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Action": "sts:AssumeRole",
                            "Effect": "Allow",
                            "Principal": { "Service": "ecs-tasks.amazonaws.com" }
                        }]
                    },
                    "ManagedPolicyArns": [
                        "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy"
                    ]
                }
            }),
        )?;

        let mut containers = Vec::with_capacity(spec.containers.len());
        for container in &spec.containers {
            let environment: Vec<_> = container
                .environment
                .iter()
                .map(|(name, value)| json!({ "Name": name, "Value": value }))
                .collect();
            let port_mappings: Vec<_> = container
                .port_mappings
                .iter()
                .map(|p| json!({ "ContainerPort": p.container_port, "Protocol": p.protocol }))
                .collect();

            let mut definition = json!({
                "Name": container.name,
                "Image": image_uri.to_json(),
                "Essential": true,
                "Environment": environment,
                "PortMappings": port_mappings,
            });

            if let Some(logging) = &container.logging {
                let log_group = format!("{}LogGroup", container.name);
                self.add_resource(
                    &log_group,
                    json!({
                        "Type": "AWS::Logs::LogGroup",
                        "UpdateReplacePolicy": "Retain",
                        "DeletionPolicy": "Retain"
                    }),
                )?;
                definition["LogConfiguration"] = json!({
                    "LogDriver": "awslogs",
                    "Options": {
                        "awslogs-group": { "Ref": log_group },
                        "awslogs-stream-prefix": logging.stream_prefix,
                        "awslogs-region": { "Ref": "AWS::Region" }
                    }
                });
            }
            containers.push(definition);
        }

        self.add_resource(
            &spec.id,
            json!({
                "Type": "AWS::ECS::TaskDefinition",
                "Properties": {
                    "Cpu": spec.cpu.to_string(),
                    "Memory": spec.memory_limit_mib.to_string(),
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                    "ExecutionRoleArn": { "Fn::GetAtt": [execution_role, "Arn"] },
                    "ContainerDefinitions": containers
                }
            }),
        )?;
        Ok(ResourceRef::new(&spec.id, ResourceKind::TaskDefinition))
    }

    fn load_balancer(&mut self, spec: &LoadBalancerSpec, network: &NetworkRef) -> IacResult<ResourceRef> {
        let security_group = format!("{}SecurityGroup", spec.id);
        self.add_resource(
            &security_group,
            json!({
                "Type": "AWS::EC2::SecurityGroup",
                "Properties": {
                    "GroupDescription": format!("{} load balancer", self.profile.stack_name),
                    "VpcId": network.vpc_id,
                    "SecurityGroupIngress": [{
                        "CidrIp": "0.0.0.0/0",
                        "IpProtocol": "tcp",
                        "FromPort": 80,
                        "ToPort": 80
                    }]
                }
            }),
        )?;

        let scheme = if spec.internet_facing { "internet-facing" } else { "internal" };
        self.add_resource(
            &spec.id,
            json!({
                "Type": "AWS::ElasticLoadBalancingV2::LoadBalancer",
                "Properties": {
                    "Type": "application",
                    "Scheme": scheme,
                    "Subnets": network.public_subnet_ids,
                    "SecurityGroups": [{ "Fn::GetAtt": [security_group, "GroupId"] }]
                }
            }),
        )?;
        Ok(ResourceRef::new(&spec.id, ResourceKind::LoadBalancer))
    }

    fn target_group(&mut self, spec: &TargetGroupSpec, network: &NetworkRef) -> IacResult<ResourceRef> {
        self.add_resource(
            &spec.id,
            json!({
                "Type": "AWS::ElasticLoadBalancingV2::TargetGroup",
                "Properties": {
                    "Port": spec.port,
                    "Protocol": spec.protocol.as_str(),
                    "TargetType": spec.target_type.as_str(),
                    "VpcId": network.vpc_id,
                    "HealthCheckPath": spec.health_check.path,
                    "Matcher": { "HttpCode": spec.health_check.healthy_http_codes }
                }
            }),
        )?;
        Ok(ResourceRef::new(&spec.id, ResourceKind::TargetGroup))
    }

    fn listener(
        &mut self,
        spec: &ListenerSpec,
        load_balancer: &ResourceRef,
        target_group: &ResourceRef,
    ) -> IacResult<ResourceRef> {
        self.require(load_balancer)?;
        self.require(target_group)?;
        self.add_resource(
            &spec.id,
            json!({
                "Type": "AWS::ElasticLoadBalancingV2::Listener",
                "Properties": {
                    "LoadBalancerArn": load_balancer.reference().to_json(),
                    "Port": spec.port,
                    "Protocol": spec.protocol.as_str(),
                    "DefaultActions": [{
                        "Type": "forward",
                        "TargetGroupArn": target_group.reference().to_json()
                    }]
                }
            }),
        )?;
        Ok(ResourceRef::new(&spec.id, ResourceKind::Listener))
    }

    fn service(&mut self, spec: &ServiceSpec, wiring: &ServiceWiring) -> IacResult<ResourceRef> {
        for dependency in [
            &wiring.cluster,
            &wiring.task_definition,
            &wiring.target_group,
            &wiring.load_balancer,
            &wiring.listener,
        ] {
            self.require(dependency)?;
        }

        // Only the load balancer may reach the container port.
        let security_group = format!("{}SecurityGroup", spec.id);
        self.add_resource(
            &security_group,
            json!({
                "Type": "AWS::EC2::SecurityGroup",
                "Properties": {
                    "GroupDescription": format!("{} service", self.profile.stack_name),
                    "VpcId": wiring.network.vpc_id
                }
            }),
        )?;
        self.add_resource(
            &format!("{}IngressFromLoadBalancer", spec.id),
            json!({
                "Type": "AWS::EC2::SecurityGroupIngress",
                "Properties": {
                    "IpProtocol": "tcp",
                    "FromPort": spec.container_port,
                    "ToPort": spec.container_port,
                    "GroupId": { "Fn::GetAtt": [security_group, "GroupId"] },
                    "SourceSecurityGroupId": {
                        "Fn::GetAtt": [format!("{}SecurityGroup", wiring.load_balancer.logical_id), "GroupId"]
                    }
                }
            }),
        )?;

        let assign_public_ip = if spec.assign_public_ip { "ENABLED" } else { "DISABLED" };
        self.add_resource(
            &spec.id,
            json!({
                "Type": "AWS::ECS::Service",
                "DependsOn": [wiring.listener.logical_id],
                "Properties": {
                    "Cluster": wiring.cluster.reference().to_json(),
                    "TaskDefinition": wiring.task_definition.reference().to_json(),
                    "DesiredCount": spec.desired_count,
                    "LaunchType": "FARGATE",
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": assign_public_ip,
                            "Subnets": wiring.network.public_subnet_ids,
                            "SecurityGroups": [{ "Fn::GetAtt": [security_group, "GroupId"] }]
                        }
                    },
                    "LoadBalancers": [{
                        "ContainerName": spec.container_name,
                        "ContainerPort": spec.container_port,
                        "TargetGroupArn": wiring.target_group.reference().to_json()
                    }]
                }
            }),
        )?;
        Ok(ResourceRef::new(&spec.id, ResourceKind::Service))
    }

    fn output(&mut self, output: &StackOutput) -> IacResult<()> {
        let mut entry = json!({ "Value": output.value.to_json() });
        if let Some(description) = &output.description {
            entry["Description"] = json!(description);
        }
        self.template.outputs.insert(output.name.clone(), entry);
        Ok(())
    }
}
