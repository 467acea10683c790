//! Seam between topology declaration and the engine that applies it.

use serde::{Deserialize, Serialize};

use crate::error::IacResult;
use crate::topology::{
    ClusterSpec, ImageAsset, ListenerSpec, LoadBalancerSpec, ServiceSpec, StackOutput,
    TargetGroupSpec, TaskDefinitionSpec, Value,
};

/// Kinds of declared resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ImageAsset,
    Cluster,
    TaskDefinition,
    LoadBalancer,
    TargetGroup,
    Listener,
    Service,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ImageAsset => "image_asset",
            ResourceKind::Cluster => "cluster",
            ResourceKind::TaskDefinition => "task_definition",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::TargetGroup => "target_group",
            ResourceKind::Listener => "listener",
            ResourceKind::Service => "service",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle to a declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub logical_id: String,
    pub kind: ResourceKind,
}

impl ResourceRef {
    pub fn new(logical_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
        }
    }

    pub fn reference(&self) -> Value {
        Value::Ref(self.logical_id.clone())
    }

    pub fn attr(&self, attribute: impl Into<String>) -> Value {
        Value::GetAtt {
            logical_id: self.logical_id.clone(),
            attribute: attribute.into(),
        }
    }
}

/// Existing network found by lookup. Never created by this tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
    pub vpc_id: String,
    pub public_subnet_ids: Vec<String>,
    /// True when the ids are placeholders awaiting a real lookup.
    pub placeholder: bool,
}

/// Declarative provisioning interface.
///
/// Implementations only author desired state. Failures of the real
/// resources (e.g. no default VPC) surface when the engine applies it.
#[cfg_attr(test, mockall::automock)]
pub trait ProvisioningBackend {
    fn image_asset(&mut self, asset: &ImageAsset) -> IacResult<ResourceRef>;

    fn lookup_default_network(&mut self) -> IacResult<NetworkRef>;

    fn cluster(&mut self, spec: &ClusterSpec, network: &NetworkRef) -> IacResult<ResourceRef>;

    fn task_definition(
        &mut self,
        spec: &TaskDefinitionSpec,
        image: &ResourceRef,
    ) -> IacResult<ResourceRef>;

    fn load_balancer(
        &mut self,
        spec: &LoadBalancerSpec,
        network: &NetworkRef,
    ) -> IacResult<ResourceRef>;

    fn target_group(
        &mut self,
        spec: &TargetGroupSpec,
        network: &NetworkRef,
    ) -> IacResult<ResourceRef>;

    fn listener(
        &mut self,
        spec: &ListenerSpec,
        load_balancer: &ResourceRef,
        target_group: &ResourceRef,
    ) -> IacResult<ResourceRef>;

    fn service(&mut self, spec: &ServiceSpec, wiring: &ServiceWiring) -> IacResult<ResourceRef>;

    fn output(&mut self, output: &StackOutput) -> IacResult<()>;
}

/// Resources a service is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceWiring {
    pub cluster: ResourceRef,
    pub task_definition: ResourceRef,
    pub target_group: ResourceRef,
    pub load_balancer: ResourceRef,
    pub listener: ResourceRef,
    pub network: NetworkRef,
}
