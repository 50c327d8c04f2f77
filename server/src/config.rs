use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::pump::PumpSettings;

/// One day; keeps keepalive arithmetic far from overflow.
const MAX_WAIT_SECS: u64 = 86_400;

#[derive(Debug, Clone, Parser)]
#[command(name = "classroom-server", about = "Real-time course session hub", version)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    #[arg(long, env = "CLASSROOM_BIND", default_value = "0.0.0.0:9090")]
    pub bind: SocketAddr,

    /// Outbound messages buffered per connection before it counts as unresponsive
    #[arg(long, env = "CLASSROOM_SEND_QUEUE", default_value_t = 256)]
    pub send_queue: usize,

    /// Inbound frames buffered per connection before the peer is dropped
    #[arg(long, env = "CLASSROOM_INBOUND_QUEUE", default_value_t = 64)]
    pub inbound_queue: usize,

    /// Pending register/unregister/broadcast requests
    #[arg(long, env = "CLASSROOM_HUB_QUEUE", default_value_t = 16)]
    pub hub_queue: usize,

    /// Seconds a peer may stay silent before it is considered gone
    #[arg(
        long,
        env = "CLASSROOM_PONG_WAIT",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..=MAX_WAIT_SECS)
    )]
    pub pong_wait_secs: u64,

    /// Seconds allowed for a single write
    #[arg(
        long,
        env = "CLASSROOM_WRITE_WAIT",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..=MAX_WAIT_SECS)
    )]
    pub write_wait_secs: u64,

    /// Largest inbound frame in bytes
    #[arg(long, env = "CLASSROOM_MAX_MESSAGE_SIZE", default_value_t = 64 * 1024)]
    pub max_message_size: usize,
}

impl ServerConfig {
    pub fn pump_settings(&self) -> PumpSettings {
        PumpSettings {
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            write_wait: Duration::from_secs(self.write_wait_secs),
        }
    }
}
