use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use crate::cli::{Listen, OutputFormat, RateArgs, Replay};
use crate::metrics::RateConfig;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 0x400;
pub const DEFAULT_BUFFER_CAPACITY: usize = 0x1a;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window must be at least one second")]
    ZeroWindow,
    #[error("receive buffer capacity must be at least one byte")]
    ZeroBuffer,
    #[error("link capacity must be a positive number of bits per second")]
    ZeroLinkCapacity,
    #[error("receive timeout must be at least one millisecond")]
    ZeroTimeout,
}

/// Validated startup options shared by `listen` and `replay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    pub listen_address: IpAddr,
    pub listen_port: u16,
    pub window_seconds: usize,
    pub buffer_capacity_bytes: usize,
    pub link_capacity_bps: u64,
    pub receive_timeout: Option<Duration>,
    pub format: OutputFormat,
}

impl MonitorConfig {
    pub fn from_listen(listen: &Listen) -> Result<Self, ConfigError> {
        Self::build(
            listen.address,
            listen.port,
            &listen.rate,
            listen.timeout_ms.map(Duration::from_millis),
        )
    }

    pub fn from_replay(replay: &Replay) -> Result<Self, ConfigError> {
        Self::build(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LISTEN_PORT, &replay.rate, None)
    }

    fn build(
        listen_address: IpAddr,
        listen_port: u16,
        rate: &RateArgs,
        receive_timeout: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            listen_address,
            listen_port,
            window_seconds: rate.window,
            buffer_capacity_bytes: rate.buffer,
            link_capacity_bps: rate.link_capacity,
            receive_timeout,
            format: rate.format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_seconds == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.buffer_capacity_bytes == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        if self.link_capacity_bps == 0 {
            return Err(ConfigError::ZeroLinkCapacity);
        }
        if self.receive_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }

    pub fn rate_config(&self) -> RateConfig {
        RateConfig {
            window_seconds: self.window_seconds,
            link_capacity_bps: self.link_capacity_bps,
        }
    }
}
