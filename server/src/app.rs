use std::sync::Arc;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::hub::{spawn_hub, HubHandle};
use crate::pump::PumpSettings;
use crate::server_state::ServerState;

/// Shared by every HTTP worker.
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<ServerState>,
    pub dispatcher: Dispatcher,
    pub pump_settings: PumpSettings,
    pub send_queue: usize,
    pub inbound_queue: usize,
    pub max_message_size: usize,
}

impl AppContext {
    /// Creates the shared state and starts the hub loop.
    pub fn start(config: &ServerConfig) -> Self {
        let state = Arc::new(ServerState::new());
        let hub = spawn_hub(state.clone(), config.hub_queue);
        Self {
            dispatcher: Dispatcher::new(state.clone(), hub),
            state,
            pump_settings: config.pump_settings(),
            send_queue: config.send_queue,
            inbound_queue: config.inbound_queue,
            max_message_size: config.max_message_size,
        }
    }

    pub fn hub(&self) -> &HubHandle {
        self.dispatcher.hub()
    }
}
