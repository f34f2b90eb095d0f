//! Actuator transport
//!
//! The device is a small HTTP server on the local network that switches a
//! vibration motor per channel:
//!
//! ```text
//! GET {base_url}{path}?channel=2&state=on
//! ```
//!
//! Requests carry a client-level timeout and are retried at most once, and
//! only on timeout. A refused connection or an error status fails at once;
//! the next state change will try again anyway.

use reqwest::{Client, RequestBuilder, Response, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Failure to deliver one command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("actuator request timed out")]
    Timeout,

    #[error("actuator unreachable: {0}")]
    Unreachable(String),

    #[error("actuator returned status {0}")]
    Status(u16),

    #[error("actuator request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Unreachable(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Something that can switch an actuator channel
pub trait ActuatorTransport {
    fn set_channel(&mut self, channel: u8, on: bool) -> Result<(), TransportError>;
}

/// Send a request, retrying once if the first attempt times out
///
/// Retry behavior:
/// - Timeout: one immediate retry
/// - Connect error: no retry, `Unreachable`
/// - Non-success status: no retry, `Status`
pub async fn send_with_retry<F>(
    client: &Client,
    build_request: F,
    context: &str,
) -> Result<Response, TransportError>
where
    F: Fn(&Client) -> RequestBuilder,
{
    const MAX_ATTEMPTS: u32 = 2;

    let mut attempt = 1;
    loop {
        match build_request(client).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                warn!("{}: non-success status ({})", context, status);
                return Err(TransportError::Status(status.as_u16()));
            }
            Err(e) if e.is_timeout() && attempt < MAX_ATTEMPTS => {
                warn!("{}: timed out, retrying once", context);
                attempt += 1;
            }
            Err(e) => {
                let err = TransportError::from(e);
                warn!("{}: {}", context, err);
                return Err(err);
            }
        }
    }
}

/// HTTP actuator client
///
/// Owns a current-thread runtime so it can be driven from the plain worker
/// thread without an ambient executor.
pub struct HttpActuator {
    client: Client,
    runtime: tokio::runtime::Runtime,
    endpoint: Url,
}

impl HttpActuator {
    /// Create a client for `{base_url}{path}`
    pub fn new(base_url: &str, path: &str, timeout: Duration) -> crate::Result<Self> {
        let endpoint = endpoint_url(base_url, path)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("cannot build HTTP client: {}", e)))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        info!("Actuator endpoint {}", endpoint);
        Ok(Self {
            client,
            runtime,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Join a base URL and a path, rejecting anything that is not http(s)
pub fn endpoint_url(base_url: &str, path: &str) -> crate::Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let url = Url::parse(&joined)
        .map_err(|e| crate::Error::Config(format!("invalid actuator URL '{}': {}", joined, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(crate::Error::Config(format!(
            "unsupported actuator URL scheme '{}'",
            other
        ))),
    }
}

impl ActuatorTransport for HttpActuator {
    fn set_channel(&mut self, channel: u8, on: bool) -> Result<(), TransportError> {
        let state = if on { "on" } else { "off" };
        let context = format!("actuator channel {} {}", channel, state);
        let channel = channel.to_string();
        let client = &self.client;
        let endpoint = &self.endpoint;

        self.runtime.block_on(send_with_retry(
            client,
            |c| {
                c.get(endpoint.clone())
                    .query(&[("channel", channel.as_str()), ("state", state)])
            },
            &context,
        ))?;
        debug!("{} delivered", context);
        Ok(())
    }
}

/// Dry-run transport that only logs
#[derive(Debug, Default)]
pub struct LogActuator {
    delivered: Vec<(u8, bool)>,
}

impl LogActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command seen, in order
    pub fn delivered(&self) -> &[(u8, bool)] {
        &self.delivered
    }
}

impl ActuatorTransport for LogActuator {
    fn set_channel(&mut self, channel: u8, on: bool) -> Result<(), TransportError> {
        info!(
            "Vibrate channel {} {}",
            channel,
            if on { "ON" } else { "OFF" }
        );
        self.delivered.push((channel, on));
        Ok(())
    }
}

impl<T: ActuatorTransport + ?Sized> ActuatorTransport for Box<T> {
    fn set_channel(&mut self, channel: u8, on: bool) -> Result<(), TransportError> {
        (**self).set_channel(channel, on)
    }
}
