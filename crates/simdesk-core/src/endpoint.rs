use regex::Regex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("endpoint must be host:port, got {0:?}")]
    MissingPort(String),
    #[error("invalid IPv4 host {0:?}")]
    InvalidHost(String),
    #[error("port must be between 1 and 65535, got {0:?}")]
    InvalidPort(String),
}

/// UDP endpoint the simulator binds to, as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Result<Self, EndpointError> {
        if !is_valid_ipv4(host) {
            return Err(EndpointError::InvalidHost(host.to_string()));
        }
        if port == 0 {
            return Err(EndpointError::InvalidPort(port.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::MissingPort(value.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;
        Endpoint::new(host, port)
    }
}

/// Dotted-quad check: four numeric octets, each 0-255.
pub fn is_valid_ipv4(host: &str) -> bool {
    let pattern = Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}$").expect("valid regex");
    if !pattern.is_match(host) {
        return false;
    }
    host.split('.')
        .all(|octet| octet.parse::<u16>().map(|n| n <= 255).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let endpoint: Endpoint = "127.0.0.1:1161".parse().expect("parses");
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 1161);
        assert_eq!(endpoint.to_string(), "127.0.0.1:1161");
    }

    #[test]
    fn rejects_bad_hosts() {
        assert!(matches!(
            "256.0.0.1:161".parse::<Endpoint>(),
            Err(EndpointError::InvalidHost(_))
        ));
        assert!(matches!(
            "localhost:161".parse::<Endpoint>(),
            Err(EndpointError::InvalidHost(_))
        ));
    }

    #[test]
    fn rejects_bad_ports() {
        assert!(matches!(
            "127.0.0.1:0".parse::<Endpoint>(),
            Err(EndpointError::InvalidPort(_))
        ));
        assert!(matches!(
            "127.0.0.1:banana".parse::<Endpoint>(),
            Err(EndpointError::InvalidPort(_))
        ));
        assert!(matches!(
            "127.0.0.1".parse::<Endpoint>(),
            Err(EndpointError::MissingPort(_))
        ));
    }
}
