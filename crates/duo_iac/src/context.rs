//! Cached context lookups.
//!
//! The deployment engine answers missing-context queries and stores the
//! results in `cdk.context.json`, keyed by the query key. A later synthesis
//! reads the cached answer instead of deferring the lookup again.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::backend::NetworkRef;
use crate::error::{IacError, IacResult};

/// Default context cache file name.
pub const CONTEXT_FILE: &str = "cdk.context.json";

/// Answered context queries, keyed by lookup key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextCache {
    pub path: Option<PathBuf>,
    entries: BTreeMap<String, Json>,
}

/// Cached `vpc-provider` answer.
///
/// Older engines write `publicSubnetIds`; asymmetric lookups write
/// `subnetGroups` instead.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VpcContext {
    vpc_id: String,
    #[serde(default)]
    public_subnet_ids: Vec<String>,
    #[serde(default)]
    subnet_groups: Vec<SubnetGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubnetGroup {
    #[serde(rename = "type")]
    group_type: String,
    #[serde(default)]
    subnets: Vec<Subnet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subnet {
    subnet_id: String,
}

impl ContextCache {
    /// Load the cache at `path`. A missing file is an empty cache.
    pub fn load(path: &Path) -> IacResult<Self> {
        if !path.exists() {
            debug!("No context cache at {:?}", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let entries: BTreeMap<String, Json> =
            serde_json::from_str(&content).map_err(|e| IacError::Context {
                key: path.display().to_string(),
                message: e.to_string(),
            })?;
        info!("Loaded {} cached context entries from {:?}", entries.len(), path);

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
        })
    }

    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Json)>,
        K: Into<String>,
    {
        Self {
            path: None,
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolved default network for a `vpc-provider` key, if cached.
    pub fn network(&self, key: &str) -> IacResult<Option<NetworkRef>> {
        let Some(entry) = self.get(key) else {
            return Ok(None);
        };

        let vpc: VpcContext = serde_json::from_value(entry.clone()).map_err(|e| IacError::Context {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let mut public_subnet_ids = vpc.public_subnet_ids;
        if public_subnet_ids.is_empty() {
            public_subnet_ids = vpc
                .subnet_groups
                .into_iter()
                .filter(|g| g.group_type == "Public")
                .flat_map(|g| g.subnets)
                .map(|s| s.subnet_id)
                .collect();
        }
        if public_subnet_ids.is_empty() {
            return Err(IacError::Context {
                key: key.to_string(),
                message: format!("VPC {} has no public subnets", vpc.vpc_id),
            });
        }

        Ok(Some(NetworkRef {
            vpc_id: vpc.vpc_id,
            public_subnet_ids,
            placeholder: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const KEY: &str = "vpc-provider:account=123:filter.isDefault=true:region=eu-west-1:returnAsymmetricSubnets=true";

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let cache = ContextCache::load(&dir.path().join(CONTEXT_FILE)).unwrap();

        assert!(cache.is_empty());
        assert!(cache.network(KEY).unwrap().is_none());
    }

    #[test]
    fn test_subnet_groups_form() {
        let cache = ContextCache::from_entries([(
            KEY,
            json!({
                "vpcId": "vpc-0abc",
                "availabilityZones": [],
                "subnetGroups": [
                    { "name": "Public", "type": "Public", "subnets": [
                        { "subnetId": "subnet-1", "availabilityZone": "eu-west-1a" },
                        { "subnetId": "subnet-2", "availabilityZone": "eu-west-1b" }
                    ]},
                    { "name": "Private", "type": "Private", "subnets": [
                        { "subnetId": "subnet-9", "availabilityZone": "eu-west-1a" }
                    ]}
                ]
            }),
        )]);

        let network = cache.network(KEY).unwrap().unwrap();
        assert_eq!(network.vpc_id, "vpc-0abc");
        assert_eq!(network.public_subnet_ids, vec!["subnet-1", "subnet-2"]);
        assert!(!network.placeholder);
    }

    #[test]
    fn test_flat_subnet_form() {
        let cache = ContextCache::from_entries([(
            KEY,
            json!({ "vpcId": "vpc-0abc", "publicSubnetIds": ["subnet-a"] }),
        )]);

        assert_eq!(cache.network(KEY).unwrap().unwrap().public_subnet_ids, vec!["subnet-a"]);
        assert!(cache.network("vpc-provider:other").unwrap().is_none());
    }

    #[test]
    fn test_entry_without_public_subnets_is_an_error() {
        let cache = ContextCache::from_entries([(KEY, json!({ "vpcId": "vpc-0abc" }))]);

        assert!(matches!(cache.network(KEY), Err(IacError::Context { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONTEXT_FILE);
        let mut cached = serde_json::Map::new();
        cached.insert(KEY.to_string(), json!({ "vpcId": "vpc-0abc", "publicSubnetIds": ["subnet-a"] }));
        fs::write(&path, Json::Object(cached).to_string()).unwrap();

        let cache = ContextCache::load(&path).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.path.as_deref(), Some(path.as_path()));

        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(ContextCache::load(&path), Err(IacError::Context { .. })));
    }
}
