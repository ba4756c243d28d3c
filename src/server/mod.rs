pub mod api;

use crate::cli::Args;
use crate::relay::Relay;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct Server {
    addr: String,
    relay: Arc<Relay>,
    args: Args,
}

impl Server {
    pub fn new(
        addr: String,
        relay: Arc<Relay>,
        args: Args,
    ) -> Self {
        Self {
            addr,
            relay,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid server address '{}': {}", self.addr, e))?;

        api::start_http_server(addr, self.relay.clone(), &self.args).await
    }
}
