//! Isolated browsing container

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use catnip_privacy::{
    Decision, PermissionDecision, PermissionKind, Pipeline, RequestDescriptor, SharedPolicy,
    StatsAggregator,
};

use crate::backend::PartitionHandle;

/// Caller-assigned tab identity, unique for the tab's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TabId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

pub struct Container {
    tab_id: TabId,
    partition: PartitionHandle,
    pipeline: Pipeline,
    created_at: DateTime<Utc>,
}

impl Container {
    pub(crate) fn new(
        tab_id: TabId,
        partition: PartitionHandle,
        policy: SharedPolicy,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            tab_id,
            partition,
            pipeline: Pipeline::standard(policy, stats),
            created_at: Utc::now(),
        }
    }

    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    pub fn partition(&self) -> &PartitionHandle {
        &self.partition
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn on_before_request(&self, request: &RequestDescriptor) -> Decision {
        self.pipeline.on_before_request(request)
    }

    pub fn on_before_send_headers(&self, request: &RequestDescriptor) -> Decision {
        self.pipeline.on_before_send_headers(request)
    }

    pub fn decide(&self, request: &RequestDescriptor) -> Decision {
        self.pipeline.decide(request)
    }

    pub fn authorize(&self, kind: &PermissionKind, origin: Option<&str>) -> PermissionDecision {
        self.pipeline.authorize(kind, origin)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("tab_id", &self.tab_id)
            .field("partition", &self.partition)
            .field("created_at", &self.created_at)
            .finish()
    }
}
