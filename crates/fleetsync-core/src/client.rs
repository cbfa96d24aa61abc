// ── Client assembly ──
//
// Wires a connection manager and the optional REST fallback from one
// `SyncConfig`. Each `FleetClient` is independent; construct as many as
// needed and pass them to consumers explicitly.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use fleetsync_api::{
    Connector, EventCategory, RestClient, TlsMode, TransportConfig, WebSocketConnector,
};

use crate::bus::{Event, Subscription};
use crate::command::EntityControl;
use crate::config::{SyncConfig, TlsVerification};
use crate::connection::ConnectionManager;
use crate::error::CoreError;
use crate::store::TelemetryStore;

/// One synchronization client: persistent channel, stores, and controls.
#[derive(Debug, Clone)]
pub struct FleetClient {
    manager: ConnectionManager,
    rest: Option<RestClient>,
}

impl FleetClient {
    /// Build a client that talks WebSocket to `config.url`.
    pub fn new(config: SyncConfig) -> Result<Self, CoreError> {
        let mut connector = WebSocketConnector::new();
        if let Some(token) = &config.auth_token {
            connector = connector.with_auth_token(token.clone());
        }
        Self::with_connector(config, Arc::new(connector))
    }

    /// Build a client over a caller-supplied [`Connector`].
    pub fn with_connector(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, CoreError> {
        validate(&config)?;
        let rest = config
            .rest_url
            .clone()
            .map(|url| rest_client(url, &config))
            .transpose()?;
        debug!(
            url = %config.url,
            rest_fallback = rest.is_some(),
            "fleet client configured"
        );

        Ok(Self {
            manager: ConnectionManager::new(config, connector),
            rest,
        })
    }

    pub fn connect(&self) {
        self.manager.connect();
    }

    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    /// Control handle for one entity.
    pub fn control(&self, entity_id: impl Into<String>) -> EntityControl {
        EntityControl::new(self.manager.clone(), self.rest.clone(), entity_id)
    }

    pub fn subscribe<F>(&self, category: EventCategory, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.manager.subscribe(category, handler)
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn telemetry(&self) -> &Arc<TelemetryStore> {
        self.manager.telemetry()
    }

    pub fn rest(&self) -> Option<&RestClient> {
        self.rest.as_ref()
    }
}

fn validate(config: &SyncConfig) -> Result<(), CoreError> {
    if !matches!(config.url.scheme(), "ws" | "wss") {
        return Err(CoreError::Config {
            message: format!(
                "channel URL must use ws:// or wss://, got {}://",
                config.url.scheme()
            ),
        });
    }
    if let Some(rest) = &config.rest_url {
        if !matches!(rest.scheme(), "http" | "https") {
            return Err(CoreError::Config {
                message: format!(
                    "REST URL must use http:// or https://, got {}://",
                    rest.scheme()
                ),
            });
        }
    }
    if config.telemetry_capacity == 0 {
        return Err(CoreError::Config {
            message: "telemetry capacity must be at least 1".into(),
        });
    }
    Ok(())
}

fn rest_client(url: Url, config: &SyncConfig) -> Result<RestClient, CoreError> {
    let tls = match &config.tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    };
    let transport = TransportConfig {
        tls,
        ..TransportConfig::default()
    };

    let mut client = RestClient::new(url, &transport)?;
    if let Some(token) = &config.auth_token {
        client = client.with_auth_token(token.clone());
    }
    Ok(client)
}
