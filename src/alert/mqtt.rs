//! MQTT alert sink.
//!
//! Events are published as JSON with QoS 0 via `try_publish`, which queues the request for
//! the client's event loop and returns immediately. The event loop runs on its own thread;
//! connection errors there are logged and the loop keeps reconnecting.

use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};

use super::{AlertEvent, AlertKind, AlertSink};

const DEFAULT_MQTT_PORT: u16 = 1883;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_QUEUE: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
}

/// Parse a broker address.
///
/// Supports `host`, `host:port`, `mqtt://host:port`, `tcp://host:port` and `[ipv6]:port`.
/// Port defaults to 1883.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => {
                return Err(anyhow!(
                    "TLS MQTT brokers are not supported by the alert sink: {}",
                    addr
                ))
            }
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }
    let remainder = remainder.trim_end_matches('/');
    if remainder.is_empty() {
        return Err(anyhow!("empty MQTT broker address"));
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(MqttEndpoint { host, port })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => parse_port(port, addr)?,
            None if rest.is_empty() => DEFAULT_MQTT_PORT,
            None => return Err(anyhow!("invalid MQTT address: {}", addr)),
        };
        return Ok((host.to_string(), port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port, addr)?)),
        None => Ok((addr.to_string(), DEFAULT_MQTT_PORT)),
    }
}

fn parse_port(port: &str, addr: &str) -> Result<u16> {
    port.parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))
}

#[derive(Clone, Debug)]
pub struct MqttSinkConfig {
    pub broker_addr: String,
    /// Events go to `<topic_prefix>/detection` or `<topic_prefix>/alert`.
    pub topic_prefix: String,
    pub client_id: String,
}

impl Default for MqttSinkConfig {
    fn default() -> Self {
        Self {
            broker_addr: "127.0.0.1:1883".to_string(),
            topic_prefix: "animal_watch".to_string(),
            client_id: "animal_watchd".to_string(),
        }
    }
}

pub struct MqttSink {
    client: Client,
    topic_prefix: String,
    _event_loop: JoinHandle<()>,
}

impl MqttSink {
    pub fn connect(config: &MqttSinkConfig) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&config.broker_addr)?;
        let mut options = MqttOptions::new(&config.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);

        let (client, connection) = Client::new(options, REQUEST_QUEUE);
        let handle = std::thread::Builder::new()
            .name("mqtt-alerts".to_string())
            .spawn(move || drive_connection(connection))
            .context("spawn mqtt event loop")?;

        log::info!(
            "mqtt alert sink targeting {}:{} (topic prefix {})",
            endpoint.host,
            endpoint.port,
            config.topic_prefix
        );
        Ok(Self {
            client,
            topic_prefix: config.topic_prefix.trim_end_matches('/').to_string(),
            _event_loop: handle,
        })
    }

    pub fn topic_for(&self, kind: AlertKind) -> String {
        topic_for(&self.topic_prefix, kind)
    }
}

fn topic_for(prefix: &str, kind: AlertKind) -> String {
    let suffix = match kind {
        AlertKind::Detection => "detection",
        AlertKind::Alert => "alert",
    };
    format!("{}/{}", prefix, suffix)
}

fn drive_connection(mut connection: Connection) {
    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
            Err(e) => {
                log::warn!("MQTT connection error: {}. Reconnecting...", e);
                std::thread::sleep(RECONNECT_DELAY);
            }
        }
    }
}

impl AlertSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<()> {
        let payload = serde_json::to_vec(event).context("serialize alert event")?;
        self.client
            .try_publish(self.topic_for(event.kind), QoS::AtMostOnce, false, payload)
            .map_err(|e| anyhow!("queue mqtt publish: {}", e))
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        let _ = self.client.try_disconnect();
    }
}
