//! # duo_iac
//!
//! Deployment infrastructure for the Duolingo web app.
//!
//! This crate runs the pre-deploy safety checks and declares the Fargate
//! topology (image, cluster, task definition, service, load balancer,
//! listener, target group) as a CloudFormation template.
//!
//! ## Features
//!
//! - Preflight validation of required settings and the Dockerfile
//! - Backend-agnostic topology declaration through [`ProvisioningBackend`]
//! - Template synthesis and cloud assembly output
//! - In-memory recording backend for tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use duo_iac::{
//!     CloudAssembly, PreflightValidator, Settings, StackProfile, TemplateFormat,
//!     TemplateSynthesizer, TopologyProvisioner,
//! };
//! use std::path::Path;
//!
//! let settings = Settings::from_env();
//! let report = PreflightValidator::new("../duolingo").validate(&settings);
//! if !report.passed {
//!     std::process::exit(1);
//! }
//!
//! let profile = StackProfile::default().with_account(settings.account().map(String::from));
//! let mut synth = TemplateSynthesizer::new(profile.clone());
//! TopologyProvisioner::new(profile, "../duolingo")
//!     .provision(&settings, &mut synth)
//!     .unwrap();
//! CloudAssembly::write(Path::new("cdk.out"), &synth, TemplateFormat::Json).unwrap();
//! ```

pub mod assembly;
pub mod assets;
pub mod backend;
pub mod context;
pub mod error;
pub mod preflight;
pub mod provisioner;
pub mod recorder;
pub mod settings;
pub mod synth;
pub mod topology;

pub use assembly::{CloudAssembly, TemplateFormat};
pub use backend::{NetworkRef, ProvisioningBackend, ResourceKind, ResourceRef, ServiceWiring};
pub use context::{ContextCache, CONTEXT_FILE};
pub use error::{IacError, IacResult};
pub use preflight::{PreflightCheck, PreflightReport, PreflightValidator};
pub use provisioner::{ProvisionedStack, TopologyProvisioner, CLUSTER_NAME_OUTPUT, LOAD_BALANCER_URL_OUTPUT};
pub use recorder::{Declaration, RecordingBackend};
pub use settings::{EnvFile, RequiredSetting, Settings, ACCOUNT_VAR, DEFAULT_REGION, REQUIRED_SETTINGS};
pub use synth::{MissingContext, Template, TemplateSynthesizer};
pub use topology::{
    ClusterSpec, ContainerSpec, HealthCheck, ImageAsset, ListenerSpec, LoadBalancerSpec,
    ServiceSpec, StackOutput, StackProfile, TargetGroupSpec, TaskDefinitionSpec, Value,
};
