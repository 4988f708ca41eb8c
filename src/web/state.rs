//! Shared application state handed to every handler.

use crate::auth::AuthProvider;
use crate::store::DataStore;
use crate::web::config::WebConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// State shared by handlers, the session gate and WebSocket clients.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub config: Arc<WebConfig>,
    pub clients: ClientRegistry,
}

impl AppState {
    pub fn new(store: Arc<dyn DataStore>, auth: Arc<dyn AuthProvider>, config: WebConfig) -> Self {
        Self {
            store,
            auth,
            config: Arc::new(config),
            clients: ClientRegistry::default(),
        }
    }
}

/// A connected live-readings WebSocket client.
#[derive(Debug, Clone, Serialize)]
pub struct LiveClient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Option<Uuid>,
    pub connected_at: DateTime<Utc>,
}

/// Registry of connected WebSocket clients.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<Uuid, LiveClient>>>,
}

impl ClientRegistry {
    /// Register a client unless `max` clients are already connected.
    pub async fn try_register(&self, client: LiveClient, max: usize) -> bool {
        let mut clients = self.clients.write().await;
        if clients.len() >= max {
            return false;
        }
        clients.insert(client.id, client);
        true
    }

    pub async fn set_device(&self, client_id: Uuid, device_id: Uuid) {
        if let Some(client) = self.clients.write().await.get_mut(&client_id) {
            client.device_id = Some(device_id);
        }
    }

    pub async fn remove(&self, client_id: Uuid) {
        self.clients.write().await.remove(&client_id);
    }

    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn list(&self) -> Vec<LiveClient> {
        self.clients.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> LiveClient {
        LiveClient {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            device_id: None,
            connected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_registry_enforces_maximum() {
        let registry = ClientRegistry::default();
        let first = client();
        assert!(registry.try_register(first.clone(), 1).await);
        assert!(!registry.try_register(client(), 1).await);
        assert_eq!(registry.count().await, 1);

        let device = Uuid::new_v4();
        registry.set_device(first.id, device).await;
        assert_eq!(registry.list().await[0].device_id, Some(device));

        registry.remove(first.id).await;
        assert_eq!(registry.count().await, 0);
        assert!(registry.try_register(client(), 1).await);
    }
}
