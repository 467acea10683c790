//! Declarations for the deployment topology.
//!
//! image -> cluster -> task definition -> service -> load balancer -> listener
//! -> target group. Defaults match the production web app.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Port the web app listens on inside the container.
pub const CONTAINER_PORT: u16 = 3000;

/// Port the load balancer accepts traffic on.
pub const LISTENER_PORT: u16 = 80;

/// Stack-level identity and target environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackProfile {
    pub stack_name: String,
    pub account: Option<String>,
    pub region: String,
}

impl Default for StackProfile {
    fn default() -> Self {
        Self {
            stack_name: "DuolingoInfrastructureStack".to_string(),
            account: None,
            region: crate::settings::DEFAULT_REGION.to_string(),
        }
    }
}

impl StackProfile {
    pub fn with_account(mut self, account: Option<String>) -> Self {
        self.account = account;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Environment string in the `aws://account/region` form.
    pub fn environment(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region
        )
    }
}

/// Container image built from a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: String,
    pub directory: PathBuf,
    pub descriptor: String,
    /// Content hash of the build context. Empty until fingerprinted.
    pub fingerprint: String,
}

impl ImageAsset {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            id: "DuolingoDockerImage".to_string(),
            directory: directory.into(),
            descriptor: crate::preflight::DEFAULT_DESCRIPTOR.to_string(),
            fingerprint: String::new(),
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: String,
    pub cluster_name: String,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            id: "DuolingoCluster".to_string(),
            cluster_name: "duolingo-cdk-cluster".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: PortProtocol,
}

/// `awslogs` log driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDriver {
    pub stream_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub port_mappings: Vec<PortMapping>,
    pub environment: BTreeMap<String, String>,
    pub logging: Option<LogDriver>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port_mappings: Vec::new(),
            environment: BTreeMap::new(),
            logging: None,
        }
    }

    pub fn port(mut self, container_port: u16) -> Self {
        self.port_mappings.push(PortMapping {
            container_port,
            protocol: PortProtocol::Tcp,
        });
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn logging(mut self, stream_prefix: impl Into<String>) -> Self {
        self.logging = Some(LogDriver {
            stream_prefix: stream_prefix.into(),
        });
        self
    }

    /// First mapped port, the one the load balancer routes to.
    pub fn primary_port(&self) -> Option<u16> {
        self.port_mappings.first().map(|p| p.container_port)
    }
}

/// Fargate task definition. CPU is in units, memory in MiB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinitionSpec {
    pub id: String,
    pub cpu: u32,
    pub memory_limit_mib: u32,
    pub containers: Vec<ContainerSpec>,
}

impl TaskDefinitionSpec {
    pub fn new(container: ContainerSpec) -> Self {
        Self {
            id: "DuolingoTaskDef".to_string(),
            cpu: 512,
            memory_limit_mib: 1024,
            containers: vec![container],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub id: String,
    pub internet_facing: bool,
}

impl Default for LoadBalancerSpec {
    fn default() -> Self {
        Self {
            id: "DuolingoALB".to_string(),
            internet_facing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpProtocol {
    Http,
    Https,
}

impl HttpProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpProtocol::Http => "HTTP",
            HttpProtocol::Https => "HTTPS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Ip,
    Instance,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Ip => "ip",
            TargetType::Instance => "instance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub path: String,
    pub healthy_http_codes: String,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            healthy_http_codes: "200".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub id: String,
    pub port: u16,
    pub protocol: HttpProtocol,
    pub target_type: TargetType,
    pub health_check: HealthCheck,
}

impl TargetGroupSpec {
    pub fn for_port(port: u16) -> Self {
        Self {
            id: "DuolingoTargets".to_string(),
            port,
            protocol: HttpProtocol::Http,
            target_type: TargetType::Ip,
            health_check: HealthCheck::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub id: String,
    pub port: u16,
    pub protocol: HttpProtocol,
}

impl Default for ListenerSpec {
    fn default() -> Self {
        Self {
            id: "DuolingoListener".to_string(),
            port: LISTENER_PORT,
            protocol: HttpProtocol::Http,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub id: String,
    pub desired_count: u32,
    pub assign_public_ip: bool,
    /// Container and port registered with the target group.
    pub container_name: String,
    pub container_port: u16,
}

impl ServiceSpec {
    pub fn for_container(container: &ContainerSpec) -> Self {
        Self {
            id: "DuolingoService".to_string(),
            desired_count: 1,
            assign_public_ip: true,
            container_name: container.name.clone(),
            container_port: container.primary_port().unwrap_or(CONTAINER_PORT),
        }
    }
}

/// A template value: a literal or a reference resolved at apply time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Literal(String),
    Ref(String),
    GetAtt { logical_id: String, attribute: String },
    Join(Vec<Value>),
    Sub(String),
}

impl Value {
    pub fn literal(s: impl Into<String>) -> Self {
        Value::Literal(s.into())
    }

    /// Concatenate values with no separator.
    pub fn join(parts: impl IntoIterator<Item = Value>) -> Self {
        Value::Join(parts.into_iter().collect())
    }

    /// CloudFormation intrinsic form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Literal(s) => json!(s),
            Value::Ref(id) => json!({ "Ref": id }),
            Value::GetAtt {
                logical_id,
                attribute,
            } => json!({ "Fn::GetAtt": [logical_id, attribute] }),
            Value::Join(parts) => {
                let parts: Vec<_> = parts.iter().map(Value::to_json).collect();
                json!({ "Fn::Join": ["", parts] })
            }
            Value::Sub(template) => json!({ "Fn::Sub": template }),
        }
    }
}

/// Named stack output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
}

impl StackOutput {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
