//! In-memory backend for testing.
//!
//! Records every declaration and resolves references to deterministic fake
//! values, so topology code can be exercised without a cloud account.

use std::collections::{BTreeMap, HashSet};

use crate::backend::{NetworkRef, ProvisioningBackend, ResourceKind, ResourceRef, ServiceWiring};
use crate::error::{IacError, IacResult};
use crate::topology::{
    ClusterSpec, ImageAsset, ListenerSpec, LoadBalancerSpec, ServiceSpec, StackOutput,
    TargetGroupSpec, TaskDefinitionSpec, Value,
};

/// One recorded declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    ImageAsset(ImageAsset),
    NetworkLookup,
    Cluster(ClusterSpec),
    TaskDefinition(TaskDefinitionSpec),
    LoadBalancer(LoadBalancerSpec),
    TargetGroup(TargetGroupSpec),
    Listener {
        spec: ListenerSpec,
        load_balancer: String,
        target_group: String,
    },
    Service {
        spec: ServiceSpec,
        cluster: String,
        task_definition: String,
        target_group: String,
    },
    Output(StackOutput),
}

/// Recording backend.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    region: String,
    network: Option<NetworkRef>,
    declarations: Vec<Declaration>,
    ids: HashSet<String>,
    attributes: BTreeMap<(String, String), String>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            region: crate::settings::DEFAULT_REGION.to_string(),
            network: Some(NetworkRef {
                vpc_id: "vpc-fake".to_string(),
                public_subnet_ids: vec!["subnet-fake-a".to_string(), "subnet-fake-b".to_string()],
                placeholder: false,
            }),
            declarations: Vec::new(),
            ids: HashSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Simulate an account without a default VPC.
    pub fn without_default_network(mut self) -> Self {
        self.network = None;
        self
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Number of declared resources of a kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.declarations
            .iter()
            .filter(|d| declaration_kind(d) == Some(kind))
            .count()
    }

    pub fn outputs(&self) -> Vec<&StackOutput> {
        self.declarations
            .iter()
            .filter_map(|d| match d {
                Declaration::Output(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    /// Resolve a value the way the engine would after apply.
    pub fn resolve(&self, value: &Value) -> IacResult<String> {
        match value {
            Value::Literal(s) => Ok(s.clone()),
            Value::Ref(id) => self.attribute(id, "Ref"),
            Value::GetAtt {
                logical_id,
                attribute,
            } => self.attribute(logical_id, attribute),
            Value::Join(parts) => parts.iter().map(|p| self.resolve(p)).collect(),
            Value::Sub(template) => Ok(template
                .replace("${AWS::Region}", &self.region)
                .replace("${AWS::AccountId}", "000000000000")
                .replace("${AWS::URLSuffix}", "amazonaws.com")),
        }
    }

    fn attribute(&self, logical_id: &str, attribute: &str) -> IacResult<String> {
        self.attributes
            .get(&(logical_id.to_string(), attribute.to_string()))
            .cloned()
            .ok_or_else(|| IacError::UnknownResource(format!("{}.{}", logical_id, attribute)))
    }

    fn register(&mut self, id: &str, kind: ResourceKind, declaration: Declaration) -> IacResult<ResourceRef> {
        if !self.ids.insert(id.to_string()) {
            return Err(IacError::DuplicateLogicalId(id.to_string()));
        }
        self.declarations.push(declaration);
        Ok(ResourceRef::new(id, kind))
    }

    fn known(&self, resource: &ResourceRef) -> IacResult<()> {
        if self.ids.contains(&resource.logical_id) {
            Ok(())
        } else {
            Err(IacError::UnknownResource(resource.logical_id.clone()))
        }
    }

    fn set_attr(&mut self, id: &str, attribute: &str, value: String) {
        self.attributes.insert((id.to_string(), attribute.to_string()), value);
    }
}

fn declaration_kind(declaration: &Declaration) -> Option<ResourceKind> {
    match declaration {
        Declaration::ImageAsset(_) => Some(ResourceKind::ImageAsset),
        Declaration::Cluster(_) => Some(ResourceKind::Cluster),
        Declaration::TaskDefinition(_) => Some(ResourceKind::TaskDefinition),
        Declaration::LoadBalancer(_) => Some(ResourceKind::LoadBalancer),
        Declaration::TargetGroup(_) => Some(ResourceKind::TargetGroup),
        Declaration::Listener { .. } => Some(ResourceKind::Listener),
        Declaration::Service { .. } => Some(ResourceKind::Service),
        Declaration::NetworkLookup | Declaration::Output(_) => None,
    }
}

impl ProvisioningBackend for RecordingBackend {
    fn image_asset(&mut self, asset: &ImageAsset) -> IacResult<ResourceRef> {
        let uri = format!("000000000000.dkr.ecr.{}.amazonaws.com/fake:{}", self.region, asset.fingerprint);
        self.set_attr(&asset.id, "ImageUri", uri);
        self.register(&asset.id, ResourceKind::ImageAsset, Declaration::ImageAsset(asset.clone()))
    }

    fn lookup_default_network(&mut self) -> IacResult<NetworkRef> {
        self.declarations.push(Declaration::NetworkLookup);
        self.network
            .clone()
            .ok_or_else(|| IacError::UnknownResource("default vpc".to_string()))
    }

    fn cluster(&mut self, spec: &ClusterSpec, _network: &NetworkRef) -> IacResult<ResourceRef> {
        self.set_attr(&spec.id, "Ref", spec.cluster_name.clone());
        self.register(&spec.id, ResourceKind::Cluster, Declaration::Cluster(spec.clone()))
    }

    fn task_definition(&mut self, spec: &TaskDefinitionSpec, image: &ResourceRef) -> IacResult<ResourceRef> {
        self.known(image)?;
        self.set_attr(&spec.id, "Ref", format!("arn:aws:ecs:{}:task-definition/{}:1", self.region, spec.id));
        self.register(&spec.id, ResourceKind::TaskDefinition, Declaration::TaskDefinition(spec.clone()))
    }

    fn load_balancer(&mut self, spec: &LoadBalancerSpec, _network: &NetworkRef) -> IacResult<ResourceRef> {
        let dns = format!("{}-fake.{}.elb.amazonaws.com", spec.id.to_lowercase(), self.region);
        self.set_attr(&spec.id, "DNSName", dns);
        self.set_attr(&spec.id, "Ref", format!("arn:aws:elasticloadbalancing:{}:loadbalancer/{}", self.region, spec.id));
        self.register(&spec.id, ResourceKind::LoadBalancer, Declaration::LoadBalancer(spec.clone()))
    }

    fn target_group(&mut self, spec: &TargetGroupSpec, _network: &NetworkRef) -> IacResult<ResourceRef> {
        self.set_attr(&spec.id, "Ref", format!("arn:aws:elasticloadbalancing:{}:targetgroup/{}", self.region, spec.id));
        self.register(&spec.id, ResourceKind::TargetGroup, Declaration::TargetGroup(spec.clone()))
    }

    fn listener(
        &mut self,
        spec: &ListenerSpec,
        load_balancer: &ResourceRef,
        target_group: &ResourceRef,
    ) -> IacResult<ResourceRef> {
        self.known(load_balancer)?;
        self.known(target_group)?;
        self.register(
            &spec.id,
            ResourceKind::Listener,
            Declaration::Listener {
                spec: spec.clone(),
                load_balancer: load_balancer.logical_id.clone(),
                target_group: target_group.logical_id.clone(),
            },
        )
    }

    fn service(&mut self, spec: &ServiceSpec, wiring: &ServiceWiring) -> IacResult<ResourceRef> {
        self.known(&wiring.cluster)?;
        self.known(&wiring.task_definition)?;
        self.known(&wiring.target_group)?;
        self.known(&wiring.listener)?;
        self.register(
            &spec.id,
            ResourceKind::Service,
            Declaration::Service {
                spec: spec.clone(),
                cluster: wiring.cluster.logical_id.clone(),
                task_definition: wiring.task_definition.logical_id.clone(),
                target_group: wiring.target_group.logical_id.clone(),
            },
        )
    }

    fn output(&mut self, output: &StackOutput) -> IacResult<()> {
        self.declarations.push(Declaration::Output(output.clone()));
        Ok(())
    }
}
