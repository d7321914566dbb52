use std::sync::Arc;

use queueline_core::{
    Config, DispatcherSupervisor, EventPublisher, QueueService, SanitizedConfig, TicketStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    service: QueueService,
    supervisor: Arc<DispatcherSupervisor>,
}

impl AppState {
    pub fn new(config: Config, service: QueueService, supervisor: Arc<DispatcherSupervisor>) -> Self {
        Self {
            config,
            service,
            supervisor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn service(&self) -> &QueueService {
        &self.service
    }

    pub fn publisher(&self) -> &EventPublisher {
        self.service.publisher()
    }

    pub fn ticket_store(&self) -> &Arc<dyn TicketStore> {
        self.service.store()
    }

    pub fn supervisor(&self) -> &DispatcherSupervisor {
        &self.supervisor
    }
}
