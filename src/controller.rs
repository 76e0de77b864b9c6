//! # Controller: composition root of the supervisor core.
//!
//! [`Controller`] owns the shared services (config, event bus, watcher
//! table) and one registry per entity family. The external REST layer holds
//! a `Controller` and goes through the registries for everything; nothing
//! in this crate is process-global.

use crate::config::Config;
use crate::events::Bus;
use crate::port::{PortConfig, PortEntity};
use crate::process::WatcherTable;
use crate::registry::Registry;
use crate::sender::{SenderConfig, SenderEntity};
use crate::stream::{StreamConfig, StreamEntity};

/// Shared services handed to entity factories.
#[derive(Clone)]
pub struct ServiceContext {
    /// Global runtime configuration.
    pub runtime: Config,
    /// Lifecycle event bus.
    pub bus: Bus,
    /// Shared watcher table for helper processes.
    pub watchers: WatcherTable,
}

/// Composition root: shared services plus the three entity registries.
pub struct Controller {
    config: Config,
    bus: Bus,
    watchers: WatcherTable,
    streams: Registry<StreamConfig, StreamEntity>,
    senders: Registry<SenderConfig, SenderEntity>,
    ports: Registry<PortConfig, PortEntity>,
}

impl Controller {
    /// Builds an empty controller; entity types are registered by the
    /// embedder (see the `register_*` functions of each entity module).
    pub fn new(config: Config) -> Self {
        let bus = Bus::new(config.bus_capacity);
        let watchers = WatcherTable::new(&config, bus.clone());
        Self {
            streams: Registry::new("stream", bus.clone()),
            senders: Registry::new("sender", bus.clone()),
            ports: Registry::new("port", bus.clone()),
            config,
            bus,
            watchers,
        }
    }

    /// Context handed to factory registration functions.
    pub fn context(&self) -> ServiceContext {
        ServiceContext {
            runtime: self.config.clone(),
            bus: self.bus.clone(),
            watchers: self.watchers.clone(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn watchers(&self) -> &WatcherTable {
        &self.watchers
    }

    pub fn streams(&self) -> &Registry<StreamConfig, StreamEntity> {
        &self.streams
    }

    pub fn senders(&self) -> &Registry<SenderConfig, SenderEntity> {
        &self.senders
    }

    pub fn ports(&self) -> &Registry<PortConfig, PortEntity> {
        &self.ports
    }

    /// Destroys every live entity and stops every remaining watcher.
    pub async fn shutdown(&self) {
        self.streams.clear().await;
        self.senders.clear().await;
        self.ports.clear().await;
        self.watchers.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{register_passive_source_type, StreamMode};

    #[tokio::test]
    async fn test_shutdown_empties_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            channel_root: dir.path().to_path_buf(),
            ..Config::default()
        };
        let controller = Controller::new(config);
        register_passive_source_type(controller.streams(), controller.context(), "fake").unwrap();

        let cfg = StreamConfig {
            mode: StreamMode::Passive,
            ..Default::default()
        };
        controller
            .streams()
            .create("fake", "cam-1", cfg)
            .await
            .unwrap();
        assert_eq!(controller.streams().len(), 1);

        controller.shutdown().await;
        assert!(controller.streams().is_empty());
        assert!(controller.watchers().is_empty());
    }
}
