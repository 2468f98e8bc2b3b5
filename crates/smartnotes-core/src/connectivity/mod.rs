//! Connectivity monitor
//!
//! Holds the current online flag, publishes transitions and turns a settled
//! offline to online transition into exactly one reconnect trigger.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Shared online/offline flag.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    online: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            online: Arc::new(sender),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Record the latest observation. Returns whether it was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            tracing::info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Call `trigger` once per offline to online transition.
    ///
    /// The transition only counts after the flag stayed unchanged for
    /// `debounce`; flapping inside that window collapses into one trigger, or
    /// none if it settles offline.
    pub async fn run_reconnect_trigger<F, Fut>(&self, debounce: Duration, mut trigger: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut online = self.subscribe();
        loop {
            if online.wait_for(|online| !*online).await.is_err() {
                return;
            }
            if online.wait_for(|online| *online).await.is_err() {
                return;
            }

            loop {
                match tokio::time::timeout(debounce, online.changed()).await {
                    Err(_settled) => break,
                    Ok(Err(_closed)) => return,
                    Ok(Ok(())) => {}
                }
            }

            if *online.borrow_and_update() {
                tracing::debug!("Connection settled; triggering reconciliation");
                trigger().await;
            }
        }
    }

    /// Feed the monitor from `probe` every `interval`.
    pub async fn run_probe(&self, probe: Arc<dyn ConnectivityProbe>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = probe.is_reachable().await;
            self.set_online(reachable);
        }
    }
}

/// Reachability check for the remote API.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probe that treats any HTTP response from the API origin as reachable.
pub struct HttpProbe {
    url: String,
    client: Client,
}

impl HttpProbe {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            url: config.api_url(),
            client,
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!("Connectivity probe failed: {}", error);
                false
            }
        }
    }
}
