//! Topology provisioning.
//!
//! Declares the whole stack once, in dependency order, against a
//! [`ProvisioningBackend`].

use std::path::PathBuf;

use tracing::{info, warn};

use crate::backend::{ProvisioningBackend, ResourceRef, ServiceWiring};
use crate::error::IacResult;
use crate::settings::{Settings, REQUIRED_SETTINGS};
use crate::topology::{
    ClusterSpec, ContainerSpec, ImageAsset, ListenerSpec, LoadBalancerSpec, ServiceSpec,
    StackOutput, StackProfile, TargetGroupSpec, TaskDefinitionSpec, Value, CONTAINER_PORT,
};

pub const CLUSTER_NAME_OUTPUT: &str = "ClusterName";
pub const LOAD_BALANCER_URL_OUTPUT: &str = "LoadBalancerURL";

const CONTAINER_NAME: &str = "DuolingoContainer";
const LOG_STREAM_PREFIX: &str = "duolingo-cdk";

/// Declares the deployment topology for one stack.
#[derive(Debug, Clone)]
pub struct TopologyProvisioner {
    profile: StackProfile,
    image: ImageAsset,
}

impl TopologyProvisioner {
    pub fn new(profile: StackProfile, app_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            image: ImageAsset::new(app_dir),
        }
    }

    /// Use a pre-computed image asset (e.g. one carrying a fingerprint).
    pub fn with_image(mut self, image: ImageAsset) -> Self {
        self.image = image;
        self
    }

    pub fn profile(&self) -> &StackProfile {
        &self.profile
    }

    /// Container definition with its environment bound from `settings`.
    ///
    /// Missing values become empty strings. Callers are expected to have run
    /// preflight first; each empty binding is logged.
    pub fn container(&self, settings: &Settings) -> ContainerSpec {
        let mut container = ContainerSpec::new(CONTAINER_NAME)
            .port(CONTAINER_PORT)
            .env("NODE_ENV", "production")
            .logging(LOG_STREAM_PREFIX);

        for setting in REQUIRED_SETTINGS {
            let value = settings.get_or_default(setting.name);
            if value.is_empty() {
                warn!("Binding empty value for {} in container environment", setting.name);
            }
            container = container.env(setting.name, value);
        }

        container
    }

    /// Declare every resource and the two stack outputs.
    pub fn provision(
        &self,
        settings: &Settings,
        backend: &mut dyn ProvisioningBackend,
    ) -> IacResult<ProvisionedStack> {
        info!("Declaring topology for stack {}", self.profile.stack_name);

        let image = backend.image_asset(&self.image)?;
        let network = backend.lookup_default_network()?;
        if network.placeholder {
            warn!("Default VPC not resolved yet; the lookup happens at deploy time");
        }

        let cluster = backend.cluster(&ClusterSpec::default(), &network)?;

        let container = self.container(settings);
        let task_spec = TaskDefinitionSpec::new(container.clone());
        let task_definition = backend.task_definition(&task_spec, &image)?;

        let load_balancer = backend.load_balancer(&LoadBalancerSpec::default(), &network)?;

        let port = container.primary_port().unwrap_or(CONTAINER_PORT);
        let target_group = backend.target_group(&TargetGroupSpec::for_port(port), &network)?;

        let listener = backend.listener(&ListenerSpec::default(), &load_balancer, &target_group)?;

        let wiring = ServiceWiring {
            cluster: cluster.clone(),
            task_definition: task_definition.clone(),
            target_group: target_group.clone(),
            load_balancer: load_balancer.clone(),
            listener: listener.clone(),
            network,
        };
        let service = backend.service(&ServiceSpec::for_container(&container), &wiring)?;

        let outputs = vec![
            StackOutput::new(CLUSTER_NAME_OUTPUT, cluster.reference()),
            StackOutput::new(
                LOAD_BALANCER_URL_OUTPUT,
                Value::join([Value::literal("http://"), load_balancer.attr("DNSName")]),
            )
            .with_description("URL to access your app"),
        ];
        for output in &outputs {
            backend.output(output)?;
        }

        info!("Topology declared: cluster={}, service={}", cluster.logical_id, service.logical_id);

        Ok(ProvisionedStack {
            image,
            cluster,
            task_definition,
            load_balancer,
            target_group,
            listener,
            service,
            outputs,
        })
    }
}

/// Handles to everything declared by one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionedStack {
    pub image: ResourceRef,
    pub cluster: ResourceRef,
    pub task_definition: ResourceRef,
    pub load_balancer: ResourceRef,
    pub target_group: ResourceRef,
    pub listener: ResourceRef,
    pub service: ResourceRef,
    pub outputs: Vec<StackOutput>,
}

impl ProvisionedStack {
    pub fn output(&self, name: &str) -> Option<&StackOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }
}
