//! Receive WebSocket messages over a raw Linux interface.
//!
//! Connects to a `wss://` endpoint through the given next hop and logs every Text and Binary
//! message until the server closes the connection. Needs `CAP_NET_RAW`. Call example:
//!
//! * `ethwss-gateway eth0 02:00:00:00:00:01 10.0.0.1 02:00:00:00:00:fe 93.184.216.34 --ws-host stream.example.org --ws-path /feed`
//!
//! Logging is configured through `RUST_LOG`, for example `RUST_LOG=info,ethwss=debug`.
use std::io;

use anyhow::{anyhow, Context};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ethwss::layer::{tls, Error};
use ethwss::nic::sys::RawSocket;
use ethwss::time::SystemClock;
use ethwss::wire::websocket::OpCode;
use ethwss_gateway::config::Config;
use ethwss_gateway::timeout::run_with_timeout;
use ethwss_gateway::Gateway;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_args();
    let options = config.options();

    let interface = config.interface.clone();
    let (source, sink) = run_with_timeout(config.startup_timeout(), move || -> io::Result<_> {
        let source = RawSocket::new(&interface)?;
        let sink = source.try_clone()?;
        Ok((source, sink))
    })
    .context("opening the interface")?
    .with_context(|| format!("opening {}", config.interface))?;
    info!(interface = %config.interface, "interface ready");

    let system = tls::System::new().map_err(|err| anyhow!("no entropy source: {}", err))?;
    let mut gateway = Gateway::new(source, sink, &options, system, SystemClock::new())
        .context("starting the connection")?;

    while !gateway.is_closed() {
        let result = gateway.poll(|message| match message.opcode {
            OpCode::Text => info!(text = %String::from_utf8_lossy(message.payload), "message"),
            _ => info!(len = message.payload.len(), "binary message"),
        });

        match result {
            Ok(_) => (),
            Err(Error::WindowExhausted) => warn!("send window exhausted, retrying"),
            Err(err) => {
                error!(%err, "connection failed");
                return Err(err.into());
            },
        }
    }

    info!(uptime = ?gateway.uptime(), "server closed the connection");
    Ok(())
}
