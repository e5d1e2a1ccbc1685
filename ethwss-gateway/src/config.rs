use std::net;
use std::time::Duration;

use structopt::StructOpt;

use ethwss::layer::eth::Host;
use ethwss::layer::tcp::Session;
use ethwss::layer::ws;
use ethwss::wire::{Checksum, EthernetAddress};

use crate::Options;

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "ethwss-gateway", about = "Receive WebSocket messages over a raw interface")]
pub struct Config {
    /// The interface to open with a raw socket.
    pub interface: String,
    pub hostmac: EthernetAddress,
    pub host: net::Ipv4Addr,
    /// The hardware address of the next hop towards the server.
    pub gatewaymac: EthernetAddress,
    pub server: net::Ipv4Addr,

    #[structopt(long = "src-port", default_value = "50000")]
    pub src_port: u16,
    #[structopt(long = "dst-port", default_value = "443")]
    pub dst_port: u16,

    /// The WebSocket host, also sent as the TLS server name.
    #[structopt(long = "ws-host")]
    pub ws_host: String,
    #[structopt(long = "ws-path", default_value = "/")]
    pub ws_path: String,

    /// Give up when the interface is not ready in time.
    #[structopt(long = "timeout-ms", default_value = "5000")]
    pub timeout_ms: u64,
    /// Trust the checksums of received frames, for devices that verify them already.
    #[structopt(long = "no-checksum")]
    pub no_checksum: bool,
    #[structopt(long = "mask")]
    pub mask_outbound: bool,
    #[structopt(long = "pong")]
    pub answer_pings: bool,
}

impl Config {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The stack configuration described by the arguments.
    pub fn options(&self) -> Options {
        let mut ws = ws::Config::new(&self.ws_host, &self.ws_path);
        ws.mask_outbound = self.mask_outbound;
        ws.answer_pings = self.answer_pings;

        Options {
            local: Session {
                host: Host { mac: self.hostmac, ip: self.host.into() },
                port: self.src_port,
            },
            remote: Session {
                host: Host { mac: self.gatewaymac, ip: self.server.into() },
                port: self.dst_port,
            },
            ws,
            checksum: if self.no_checksum { Checksum::Ignored } else { Checksum::Manual },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ethwss::wire::Ipv4Address;

    #[test]
    fn arguments() {
        let config = Config::from_iter(&[
            "ethwss-gateway",
            "eth0",
            "02:00:00:00:00:01",
            "10.0.0.1",
            "02:00:00:00:00:fe",
            "93.184.216.34",
            "--ws-host", "stream.example.org",
            "--ws-path", "/feed",
            "--pong",
        ]);
        let options = config.options();
        assert_eq!(options.local.host.ip, Ipv4Address::new(10, 0, 0, 1));
        assert_eq!(options.local.port, 50000);
        assert_eq!(options.remote.host.mac, EthernetAddress([2, 0, 0, 0, 0, 0xfe]));
        assert_eq!(options.remote.port, 443);
        assert_eq!(options.ws.host, "stream.example.org");
        assert_eq!(options.ws.path, "/feed");
        assert!(options.ws.answer_pings);
        assert!(!options.ws.mask_outbound);
        assert_eq!(options.checksum, Checksum::Manual);
        assert_eq!(config.startup_timeout(), Duration::from_secs(5));
    }
}
