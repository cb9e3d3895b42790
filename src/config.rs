//! Server configuration from flags and environment

use clap::Parser;
use std::net::SocketAddr;

use crate::notify::{Sink, WebhookSink};

#[derive(Parser, Debug, Clone)]
#[command(name = "handover")]
#[command(about = "Handover dossier server - delivery-reception records and their countersignatures")]
#[command(version)]
pub struct Config {
    /// SQLite connection URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:handover.db")]
    pub database_url: String,

    /// Address the HTTP server binds to
    #[arg(short, long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Endpoint that receives notification events as JSON. Events are only
    /// logged when unset.
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    pub notify_webhook_url: Option<String>,
}

impl Config {
    pub fn sink(&self) -> Sink {
        match &self.notify_webhook_url {
            Some(url) => Sink::Webhook(WebhookSink::new(url.clone())),
            None => Sink::Log,
        }
    }
}
