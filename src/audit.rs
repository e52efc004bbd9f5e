//! Best-effort notification of security-relevant events to the log collector.
//!
//! Delivery runs on a detached task. A failed delivery is logged here and is
//! never reported back to the request that triggered it.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Wire format of `POST /log` on the collector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub name: String,
    pub data: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn deliver(&self, entry: &AuditEntry) -> anyhow::Result<()>;
}

pub struct HttpAuditSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuditSink {
    pub fn new(collector_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build audit http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/log", collector_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn deliver(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(entry)
            .send()
            .await
            .with_context(|| format!("post audit entry to {}", self.endpoint))?;
        // The collector's reply carries no contract; the status is only logged.
        debug!(status = %res.status(), event = %entry.name, "audit entry delivered");
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Fire and forget. The handle is only useful to tests; dropping it does
    /// not cancel delivery.
    pub fn emit(&self, name: impl Into<String>, data: impl Into<String>) -> JoinHandle<()> {
        let entry = AuditEntry {
            name: name.into(),
            data: data.into(),
        };
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&entry).await {
                warn!(error = %e, event = %entry.name, "failed to deliver audit entry");
            }
        })
    }
}
