//! ModelRegistry (C10): named models with immutable version records and a
//! singleton production/staging slot per model.
//!
//! `semver::Version` for model versions, `DashMap` for the name→model
//! table, and per-model transition serialization via a lock table (see
//! DESIGN.md for grounding).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStage {
    Draft,
    Staging,
    Production,
    Archived,
}

/// One immutable version record. Everything but `stage` is fixed at
/// `addVersion` time (§3 — "version records are immutable except stage").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersionRecord {
    pub model_id: Uuid,
    pub name: String,
    pub version: Version,
    pub stage: ModelStage,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

struct ModelEntry {
    metadata: Value,
    versions: Vec<ModelVersionRecord>,
}

/// Registry of named models. `transition_lock` serializes
/// register/addVersion/transition per model name so the "at most one
/// production, at most one staging" invariant can never race (§5).
pub struct ModelRegistry {
    models: Arc<DashMap<String, ModelEntry>>,
    transition_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: Arc::new(DashMap::new()),
            transition_locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.transition_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Idempotent on name: registering an already-known model updates its
    /// metadata in place rather than erroring (§4.7).
    pub async fn register(&self, name: &str, metadata: Value) {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.models
            .entry(name.to_string())
            .and_modify(|entry| entry.metadata = metadata.clone())
            .or_insert_with(|| ModelEntry { metadata, versions: Vec::new() });
    }

    /// Append a new, monotonically-versioned record starting life in
    /// `Draft`. Returns the version assigned.
    pub async fn add_version(&self, name: &str, metadata: Value) -> AppResult<Version> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut entry = self
            .models
            .get_mut(name)
            .ok_or_else(|| AppError::not_found(format!("model {name} is not registered")))?;

        let next = entry
            .versions
            .last()
            .map(|v| Version::new(v.version.major, v.version.minor, v.version.patch + 1))
            .unwrap_or_else(|| Version::new(1, 0, 0));

        entry.versions.push(ModelVersionRecord {
            model_id: Uuid::new_v4(),
            name: name.to_string(),
            version: next.clone(),
            stage: ModelStage::Draft,
            metadata,
            created_at: Utc::now(),
        });
        Ok(next)
    }

    /// Move `version` to `stage`, archiving whatever previously occupied
    /// that slot when `stage` is `Staging`/`Production` (§4.7).
    pub async fn transition(&self, name: &str, version: &Version, stage: ModelStage) -> AppResult<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut entry = self
            .models
            .get_mut(name)
            .ok_or_else(|| AppError::not_found(format!("model {name} is not registered")))?;

        if !entry.versions.iter().any(|v| &v.version == version) {
            return Err(AppError::not_found(format!("model {name} has no version {version}")));
        }

        if matches!(stage, ModelStage::Staging | ModelStage::Production) {
            for record in entry.versions.iter_mut() {
                if record.stage == stage && &record.version != version {
                    record.stage = ModelStage::Archived;
                }
            }
        }

        let record = entry.versions.iter_mut().find(|v| &v.version == version).unwrap();
        record.stage = stage;
        Ok(())
    }

    pub fn get_production(&self, name: &str) -> Option<ModelVersionRecord> {
        self.models
            .get(name)?
            .versions
            .iter()
            .find(|v| v.stage == ModelStage::Production)
            .cloned()
    }

    pub fn get_staging(&self, name: &str) -> Option<ModelVersionRecord> {
        self.models
            .get(name)?
            .versions
            .iter()
            .find(|v| v.stage == ModelStage::Staging)
            .cloned()
    }

    pub fn list_versions(&self, name: &str) -> Vec<ModelVersionRecord> {
        self.models.get(name).map(|e| e.versions.clone()).unwrap_or_default()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_is_idempotent_on_name() {
        let registry = ModelRegistry::new();
        registry.register("defect-classifier", serde_json::json!({"framework": "onnx"})).await;
        registry.register("defect-classifier", serde_json::json!({"framework": "onnx-v2"})).await;
        assert_eq!(registry.list_versions("defect-classifier").len(), 0);
    }

    #[tokio::test]
    async fn add_version_is_monotonic() {
        let registry = ModelRegistry::new();
        registry.register("m", serde_json::json!({})).await;
        let v1 = registry.add_version("m", serde_json::json!({})).await.unwrap();
        let v2 = registry.add_version("m", serde_json::json!({})).await.unwrap();
        assert_eq!(v1, Version::new(1, 0, 0));
        assert_eq!(v2, Version::new(1, 0, 1));
    }

    #[tokio::test]
    async fn at_most_one_production_version_at_a_time() {
        let registry = ModelRegistry::new();
        registry.register("m", serde_json::json!({})).await;
        let v1 = registry.add_version("m", serde_json::json!({})).await.unwrap();
        let v2 = registry.add_version("m", serde_json::json!({})).await.unwrap();

        registry.transition("m", &v1, ModelStage::Production).await.unwrap();
        registry.transition("m", &v2, ModelStage::Production).await.unwrap();

        let versions = registry.list_versions("m");
        let production_count = versions.iter().filter(|v| v.stage == ModelStage::Production).count();
        assert_eq!(production_count, 1);
        assert_eq!(registry.get_production("m").unwrap().version, v2);

        let archived = versions.iter().find(|v| v.version == v1).unwrap();
        assert_eq!(archived.stage, ModelStage::Archived);
    }

    #[tokio::test]
    async fn transition_unknown_version_not_found() {
        let registry = ModelRegistry::new();
        registry.register("m", serde_json::json!({})).await;
        let err = registry
            .transition("m", &Version::new(9, 9, 9), ModelStage::Staging)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
