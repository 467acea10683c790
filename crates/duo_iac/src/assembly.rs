//! Cloud assembly output.
//!
//! Writes the synthesized template together with an asset manifest and a
//! top-level `manifest.json` describing the stack artifact.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{IacError, IacResult};
use crate::synth::TemplateSynthesizer;

/// Manifest schema version written to `manifest.json`.
pub const MANIFEST_VERSION: &str = "36.0.0";

/// Serialization format of the stack template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yaml",
        }
    }

    pub fn parse(s: &str) -> IacResult<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            other => Err(IacError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Paths of a written assembly.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    pub directory: PathBuf,
    pub template: PathBuf,
    pub assets: PathBuf,
    pub manifest: PathBuf,
}

impl CloudAssembly {
    /// Write everything the synthesizer produced into `out_dir`.
    pub fn write(out_dir: &Path, synth: &TemplateSynthesizer, format: TemplateFormat) -> IacResult<Self> {
        fs::create_dir_all(out_dir)?;
        let stack = &synth.profile().stack_name;

        let template_file = format!("{}.template.{}", stack, format.as_str());
        let template_path = out_dir.join(&template_file);
        let body = match format {
            TemplateFormat::Json => serde_json::to_string_pretty(synth.template())?,
            TemplateFormat::Yaml => serde_yaml::to_string(synth.template())?,
        };
        fs::write(&template_path, body)?;

        let assets_file = format!("{}.assets.json", stack);
        let assets_path = out_dir.join(&assets_file);
        let docker_images: serde_json::Map<_, _> = synth
            .assets()
            .iter()
            .map(|asset| {
                (
                    asset.id.clone(),
                    json!({
                        "source": {
                            "directory": asset.directory,
                            "dockerFile": asset.dockerfile,
                        },
                        "destinations": {
                            "current_account-current_region": {
                                "repositoryName": asset.repository_name,
                                "imageTag": asset.image_tag,
                            }
                        }
                    }),
                )
            })
            .collect();
        let assets = json!({
            "version": MANIFEST_VERSION,
            "files": {},
            "dockerImages": docker_images,
        });
        fs::write(&assets_path, serde_json::to_string_pretty(&assets)?)?;

        let missing: Vec<_> = synth
            .missing_context()
            .iter()
            .map(|c| json!({ "key": c.key, "provider": c.provider, "props": c.props }))
            .collect();
        let mut manifest = json!({
            "version": MANIFEST_VERSION,
            "artifacts": {
                stack.as_str(): {
                    "type": "aws:cloudformation:stack",
                    "environment": synth.profile().environment(),
                    "properties": {
                        "templateFile": template_file,
                    },
                    "dependencies": [format!("{}.assets", stack)],
                },
                format!("{}.assets", stack): {
                    "type": "cdk:asset-manifest",
                    "properties": { "file": assets_file },
                },
            },
        });
        if !missing.is_empty() {
            manifest["missing"] = json!(missing);
        }
        let manifest_path = out_dir.join("manifest.json");
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

        info!("Wrote cloud assembly to {:?}", out_dir);
        Ok(Self {
            directory: out_dir.to_path_buf(),
            template: template_path,
            assets: assets_path,
            manifest: manifest_path,
        })
    }
}
