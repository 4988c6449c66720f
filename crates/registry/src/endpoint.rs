//! Endpoint parsing.

use crate::descriptor::ServiceDescriptor;
use crate::error::RegistryError;
use std::time::Duration;
use url::Url;

/// Default provider port.
pub const DEFAULT_PORT: u16 = 20880;
/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default heartbeat interval. Zero disables heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(60_000);
/// Default payload serialization.
pub const DEFAULT_SERIALIZATION: &str = "hessian2";
/// Default service version.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// One concrete remote `host:port` plus service routing metadata.
///
/// Parsed from a URL-shaped address string
/// (`dubbo://host:port/path?version=V&group=G&timeout=T&heartbeat=H&serialization=S`)
/// or from a bare `host:port` entry merged with the service descriptor.
/// Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Service path carried in every call's attachments.
    pub path: String,
    /// Service interface name.
    pub interface_name: String,
    /// Service version.
    pub version: String,
    /// Optional service group.
    pub group: Option<String>,
    /// Payload serialization name.
    pub serialization: String,
    /// Default per-call timeout for calls routed to this endpoint.
    pub call_timeout: Duration,
    /// Keep-alive probe interval; zero disables heartbeats.
    pub heartbeat_interval: Duration,
}

impl Endpoint {
    /// Parse an address entry, merging context from the service descriptor.
    ///
    /// Accepts either a full URL or a bare `host[:port]` entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAddress`] if the entry cannot be
    /// parsed.
    pub fn parse(address: &str, descriptor: &ServiceDescriptor) -> Result<Self, RegistryError> {
        if address.contains("://") {
            let url = Url::parse(address).map_err(|e| RegistryError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
            return Self::from_url(&url, descriptor);
        }

        let (host, port) = match address.split_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| RegistryError::InvalidAddress {
                    address: address.to_string(),
                    reason: format!("invalid port '{port}'"),
                })?;
                (host, port)
            }
            None => (address, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(RegistryError::InvalidAddress {
                address: address.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: default_path(&descriptor.interface_name, descriptor.group.as_deref()),
            interface_name: descriptor.interface_name.clone(),
            version: descriptor
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            group: descriptor.group.clone(),
            serialization: DEFAULT_SERIALIZATION.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        })
    }

    /// Build an endpoint from an already-parsed URL, merging context from
    /// the service descriptor for fields the URL does not carry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAddress`] if the URL has no host.
    pub fn from_url(url: &Url, descriptor: &ServiceDescriptor) -> Result<Self, RegistryError> {
        let host = url
            .host_str()
            .ok_or_else(|| RegistryError::InvalidAddress {
                address: url.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let mut version = None;
        let mut group = None;
        let mut interface = None;
        let mut serialization = None;
        let mut call_timeout = None;
        let mut heartbeat_interval = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "version" => version = Some(value.into_owned()),
                "group" => group = Some(value.into_owned()),
                "interface" => interface = Some(value.into_owned()),
                "serialization" => serialization = Some(value.into_owned()),
                "timeout" => call_timeout = parse_millis(&value),
                "heartbeat" => heartbeat_interval = parse_millis(&value),
                _ => {}
            }
        }

        let interface_name = interface.unwrap_or_else(|| descriptor.interface_name.clone());
        let group = group.or_else(|| descriptor.group.clone());

        let path = match url.path().trim_start_matches('/') {
            "" => default_path(&interface_name, group.as_deref()),
            path => path.to_string(),
        };

        Ok(Self {
            host,
            port,
            path,
            interface_name,
            version: version
                .or_else(|| descriptor.version.clone())
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            group,
            serialization: serialization.unwrap_or_else(|| DEFAULT_SERIALIZATION.to_string()),
            call_timeout: call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
            heartbeat_interval: heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
        })
    }

    /// Connection-pool identity of this endpoint: `host:port`.
    ///
    /// One physical connection per remote key is shared by every service
    /// routed to it.
    #[must_use]
    pub fn remote_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_path(interface_name: &str, group: Option<&str>) -> String {
    match group {
        Some(group) => format!("{group}/{interface_name}"),
        None => interface_name.to_string(),
    }
}

fn parse_millis(value: &str) -> Option<Duration> {
    value.parse().ok().map(Duration::from_millis)
}
