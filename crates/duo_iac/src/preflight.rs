//! Pre-deploy safety checks.
//!
//! Every check runs; failures are collected into the report instead of
//! stopping at the first one. The caller decides whether to abort.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::settings::{Settings, REQUIRED_SETTINGS};

/// Build descriptor that must sit at the root of the app directory.
pub const DEFAULT_DESCRIPTOR: &str = "Dockerfile";

/// Validates settings and the build artifact before anything is provisioned.
#[derive(Debug, Clone)]
pub struct PreflightValidator {
    app_dir: PathBuf,
    descriptor: String,
}

impl PreflightValidator {
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
            descriptor: DEFAULT_DESCRIPTOR.to_string(),
        }
    }

    /// Use a different descriptor file name.
    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.app_dir.join(&self.descriptor)
    }

    /// Run all checks against a settings snapshot.
    pub fn validate(&self, settings: &Settings) -> PreflightReport {
        info!("Running pre-deploy safety checks");
        let mut report = PreflightReport::new();

        for setting in REQUIRED_SETTINGS {
            if settings.get(setting.name).is_none() {
                warn!("Missing env variable: {}", setting.name);
                report.add_check(
                    setting.name,
                    false,
                    &format!("Missing env variable: {}", setting.name),
                );
            }
        }

        let descriptor_path = self.descriptor_path();
        if descriptor_path.is_file() {
            debug!("Found build descriptor at {:?}", descriptor_path);
            report.add_check(&self.descriptor, true, &format!("{} found.", self.descriptor));
        } else {
            warn!("Build descriptor missing at {:?}", descriptor_path);
            report.add_check(
                &self.descriptor,
                false,
                &format!("{} not found in: {}", self.descriptor, resolve_dir(&self.app_dir).display()),
            );
        }

        info!(passed = report.passed, checks = report.checks.len(), "Preflight finished");
        report
    }
}

/// Resolved form of `dir` for diagnostics. Falls back to folding `..`
/// lexically when the directory does not exist.
fn resolve_dir(dir: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(dir) {
        return resolved;
    }
    let mut resolved = PathBuf::new();
    for component in dir.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(resolved.components().next_back(), Some(Component::Normal(_))) {
                    resolved.pop();
                } else {
                    resolved.push(component);
                }
            }
            other => resolved.push(other),
        }
    }
    resolved
}

/// Outcome of a preflight run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightReport {
    pub checks: Vec<PreflightCheck>,
    pub passed: bool,
}

impl PreflightReport {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            passed: true,
        }
    }

    pub fn add_check(&mut self, name: &str, passed: bool, message: &str) {
        if !passed {
            self.passed = false;
        }
        self.checks.push(PreflightCheck {
            name: name.to_string(),
            passed,
            message: message.to_string(),
        });
    }

    /// Human-readable lines, one per check, in check order.
    pub fn diagnostics(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.message.clone()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PreflightCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

impl Default for PreflightReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
}
