use anyhow::Context;
use async_trait::async_trait;
use lapin::{Connection, ConnectionProperties};

use crate::bootstrap::Dependency;

/// AMQP broker connection. Ready once a channel can be opened and closed.
pub struct Amqp {
    uri: String,
}

impl Amqp {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

#[async_trait]
impl Dependency for Amqp {
    type Handle = Connection;

    fn name(&self) -> &str {
        "rabbitmq"
    }

    async fn connect(&self) -> anyhow::Result<Connection> {
        let conn = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .context("connect to amqp broker")?;
        let channel = conn
            .create_channel()
            .await
            .context("open amqp channel")?;
        channel
            .close(200, "liveness check")
            .await
            .context("close amqp channel")?;
        Ok(conn)
    }
}
