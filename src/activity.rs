use std::{collections::BTreeMap, sync::Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CREDENTIAL_ACTIVITY: &str = "Credential Activity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
}

/// A user-facing record of a completed protocol exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub client: String,
    pub operation: String,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Vec<String>>,
}

impl Activity {
    pub fn success(client: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: CREDENTIAL_ACTIVITY.into(),
            timestamp: Utc::now(),
            client: client.into(),
            operation: operation.into(),
            status: ActivityStatus::Success,
            params: BTreeMap::new(),
        }
    }

    pub fn set_param(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.params.insert(key.into(), values);
        self
    }
}

/// Sink for [Activity] records. Called inline; an error fails the operation
/// that produced the activity.
pub trait ActivityLogger: Send + Sync {
    fn log(&self, activity: &Activity) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct NoopActivityLogger;

impl ActivityLogger for NoopActivityLogger {
    fn log(&self, _activity: &Activity) -> Result<()> {
        Ok(())
    }
}

/// Keeps every logged activity in memory.
#[derive(Debug, Default)]
pub struct MemActivityLogger(Mutex<Vec<Activity>>);

impl MemActivityLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.0
            .lock()
            .map(|activities| activities.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|a| a.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActivityLogger for MemActivityLogger {
    fn log(&self, activity: &Activity) -> Result<()> {
        self.0
            .lock()
            .map_err(|_| anyhow!("activity log lock poisoned"))?
            .push(activity.clone());
        Ok(())
    }
}
