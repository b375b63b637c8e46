//! Vessel feed ingestion
//!
//! One long-lived task per feed connection. Messages are parsed into
//! observations and appended to the shared [`TelemetryCache`]; anything
//! malformed is logged and skipped. A dropped connection is retried after a
//! fixed backoff until the cancellation token fires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::config::FeedConfig;
use shared::logger::sanitize_for_log;
use shared::types::{BoundingBox, GeoPoint};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::TelemetryCache;
use crate::observation::{Dimensions, Observation, ObservationFields, ObservationKind};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Sent once per connection, serialized with the AIS stream's key names.
#[derive(Clone, Serialize)]
pub struct Subscription {
    #[serde(rename = "APIKey")]
    pub credential: String,
    #[serde(rename = "BoundingBoxes")]
    pub bounding_regions: Vec<BoundingBox>,
    #[serde(rename = "FilterMessageTypes")]
    pub message_kinds: Vec<String>,
}

impl Subscription {
    pub fn new(credential: impl Into<String>, bounding_regions: Vec<BoundingBox>, message_kinds: Vec<String>) -> Self {
        Self {
            credential: credential.into(),
            bounding_regions,
            message_kinds,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("credential", &sanitize_for_log(&self.credential))
            .field("bounding_regions", &self.bounding_regions)
            .field("message_kinds", &self.message_kinds)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Parsing
// ----------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AisPositionReport {
    #[serde(rename = "UserID")]
    user_id: u64,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    speed_over_ground: f64,
    #[serde(default)]
    course_over_ground: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AisShipStaticData {
    #[serde(rename = "UserID")]
    user_id: u64,
    #[serde(default)]
    vessel_name: String,
    #[serde(rename = "Type", default)]
    type_code: u16,
    #[serde(default)]
    dimension: Option<AisDimension>,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    eta: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AisDimension {
    #[serde(default)]
    a: f64,
    #[serde(default)]
    b: f64,
    #[serde(default)]
    c: f64,
    #[serde(default)]
    d: f64,
}

#[derive(Deserialize)]
struct PositionMessage {
    id: String,
    lat: f64,
    lon: f64,
    speed: Option<f64>,
    course: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct StaticMessage {
    id: String,
    name: Option<String>,
    type_code: Option<u16>,
    dims: Option<Dimensions>,
    destination: Option<String>,
    eta: Option<String>,
}

/// Parses one inbound frame.
///
/// Accepts the AIS stream envelope (`MessageType` + `Message`) and the plain
/// `kind`-tagged form. Returns `Ok(None)` for kinds we do not track.
pub fn parse_message(text: &str, received_at: DateTime<Utc>) -> Result<Option<Observation>, FeedError> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(message_type) = value.get("MessageType").and_then(Value::as_str) {
        return parse_ais(message_type, &value, received_at);
    }

    match value.get("kind").and_then(Value::as_str) {
        Some("position") => {
            let message: PositionMessage = serde_json::from_value(value)?;
            let fields = position_fields(
                &message.id,
                message.lat,
                message.lon,
                message.speed,
                message.course,
                message.timestamp.unwrap_or(received_at),
            )?;
            Ok(Some(Observation::new(message.id, ObservationKind::Position, fields)))
        }
        Some("static") => {
            let message: StaticMessage = serde_json::from_value(value)?;
            require_id(&message.id)?;
            let fields = ObservationFields {
                name: message.name,
                type_code: message.type_code,
                dims: message.dims,
                destination: message.destination,
                eta: message.eta,
                ..ObservationFields::default()
            };
            Ok(Some(Observation::new(message.id, ObservationKind::Static, fields)))
        }
        Some(_) => Ok(None),
        None => Err(FeedError::Malformed("message has neither MessageType nor kind".to_string())),
    }
}

fn parse_ais(message_type: &str, envelope: &Value, received_at: DateTime<Utc>) -> Result<Option<Observation>, FeedError> {
    let body = |key: &str| {
        envelope
            .get("Message")
            .and_then(|message| message.get(key))
            .cloned()
            .ok_or_else(|| FeedError::Malformed(format!("{} body missing", key)))
    };

    match message_type {
        "PositionReport" => {
            let report: AisPositionReport = serde_json::from_value(body("PositionReport")?)?;
            let vessel_id = report.user_id.to_string();
            let fields = position_fields(
                &vessel_id,
                report.latitude,
                report.longitude,
                Some(report.speed_over_ground),
                Some(report.course_over_ground),
                received_at,
            )?;
            Ok(Some(Observation::new(vessel_id, ObservationKind::Position, fields)))
        }
        "ShipStaticData" => {
            let data: AisShipStaticData = serde_json::from_value(body("ShipStaticData")?)?;
            let fields = ObservationFields {
                name: Some(data.vessel_name.trim().to_string()),
                type_code: Some(data.type_code),
                dims: data.dimension.map(|dim| Dimensions {
                    length: dim.a + dim.b,
                    width: dim.c + dim.d,
                }),
                destination: Some(data.destination.trim().to_string()),
                eta: data.eta.as_ref().and_then(eta_text),
                ..ObservationFields::default()
            };
            Ok(Some(Observation::new(data.user_id.to_string(), ObservationKind::Static, fields)))
        }
        _ => Ok(None),
    }
}

fn position_fields(
    vessel_id: &str,
    lat: f64,
    lon: f64,
    speed: Option<f64>,
    course: Option<f64>,
    timestamp: DateTime<Utc>,
) -> Result<ObservationFields, FeedError> {
    require_id(vessel_id)?;
    // AIS reports 91/181 for "position not available"
    if !GeoPoint::new(lat, lon).is_valid() {
        return Err(FeedError::Malformed(format!("position out of range: {}, {}", lat, lon)));
    }
    Ok(ObservationFields {
        lat: Some(lat),
        lon: Some(lon),
        speed: speed.filter(|value| value.is_finite()),
        course: course.filter(|value| value.is_finite()),
        timestamp: Some(timestamp),
        ..ObservationFields::default()
    })
}

fn require_id(vessel_id: &str) -> Result<(), FeedError> {
    if vessel_id.trim().is_empty() {
        return Err(FeedError::Malformed("empty vessel id".to_string()));
    }
    Ok(())
}

fn eta_text(eta: &Value) -> Option<String> {
    match eta {
        Value::String(text) => Some(text.clone()),
        Value::Object(parts) => {
            let part = |key: &str| parts.get(key).and_then(Value::as_u64);
            match (part("Month"), part("Day"), part("Hour"), part("Minute")) {
                (Some(month), Some(day), Some(hour), Some(minute)) if month > 0 && day > 0 => {
                    Some(format!("{:02}-{:02} {:02}:{:02}", month, day, hour, minute))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Opens a connection and sends `subscription` on it.
    async fn connect(&self, subscription: &Subscription) -> Result<Box<dyn FeedStream>, FeedError>;
}

#[async_trait]
pub trait FeedStream: Send {
    /// Next text frame, or `None` once the remote closed the connection.
    async fn next_message(&mut self) -> Option<Result<String, FeedError>>;
}

pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self, subscription: &Subscription) -> Result<Box<dyn FeedStream>, FeedError> {
        let (mut socket, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        let payload = serde_json::to_string(subscription)?;
        socket
            .send(Message::Text(payload))
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        Ok(Box::new(WebSocketFeed { socket }))
    }
}

struct WebSocketFeed {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedStream for WebSocketFeed {
    async fn next_message(&mut self) -> Option<Result<String, FeedError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // the AIS stream delivers JSON in binary frames
                Ok(Message::Binary(bytes)) => return Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(FeedError::Transport(e.to_string()))),
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Ingestor
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct IngestStats {
    recorded: AtomicU64,
    ignored: AtomicU64,
    discarded: AtomicU64,
    connections: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestCounters {
    pub recorded: u64,
    pub ignored: u64,
    pub discarded: u64,
    pub connections: u64,
}

impl IngestStats {
    pub fn counters(&self) -> IngestCounters {
        IngestCounters {
            recorded: self.recorded.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Cancelled,
}

pub struct Ingestor<C> {
    connector: C,
    subscription: Subscription,
    cache: Arc<TelemetryCache>,
    stats: Arc<IngestStats>,
    backoff: Duration,
}

impl<C: FeedConnector> Ingestor<C> {
    pub fn new(
        connector: C,
        subscription: Subscription,
        cache: Arc<TelemetryCache>,
        stats: Arc<IngestStats>,
        backoff: Duration,
    ) -> Self {
        Self {
            connector,
            subscription,
            cache,
            stats,
            backoff,
        }
    }

    /// Connects, pumps messages into the cache, and reconnects after the
    /// backoff whenever the connection drops. Returns once `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            let session = tokio::select! {
                _ = cancel.cancelled() => break,
                session = self.connector.connect(&self.subscription) => session,
            };

            match session {
                Ok(mut stream) => {
                    self.stats.connections.fetch_add(1, Ordering::Relaxed);
                    info!("connected to vessel feed");
                    if self.pump(stream.as_mut(), &cancel).await == SessionEnd::Cancelled {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "vessel feed connection failed"),
            }

            info!(backoff_ms = self.backoff.as_millis() as u64, "reconnecting to vessel feed after backoff");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        info!("vessel feed ingestor stopped");
    }

    async fn pump(&self, stream: &mut dyn FeedStream, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = stream.next_message() => next,
            };

            match next {
                Some(Ok(text)) => {
                    self.ingest(&text);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "vessel feed connection lost");
                    return SessionEnd::Disconnected;
                }
                None => {
                    warn!("vessel feed closed by remote");
                    return SessionEnd::Disconnected;
                }
            }
        }
    }

    /// Parses one frame and records it. Returns whether the cache changed.
    pub fn ingest(&self, text: &str) -> bool {
        match parse_message(text, Utc::now()) {
            Ok(Some(observation)) => {
                self.cache.record(observation);
                self.stats.recorded.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(None) => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                debug!("ignoring untracked feed message kind");
                false
            }
            Err(e) => {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "discarding malformed feed message");
                false
            }
        }
    }
}

/// Starts the feed task, or returns `None` when no credential is configured
/// (vessel queries then fall back to illustrative data at the API boundary).
pub fn spawn_ingestor(
    config: &FeedConfig,
    cache: Arc<TelemetryCache>,
    stats: Arc<IngestStats>,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    let Some(credential) = config.credential() else {
        info!("vessel feed credential not configured, live tracking disabled");
        return None;
    };

    info!(
        url = %config.url,
        api_key = %sanitize_for_log(credential),
        regions = config.bounding_boxes.len(),
        "starting vessel feed ingestor"
    );

    let subscription = Subscription::new(
        credential,
        config.bounding_boxes.clone(),
        config.message_types.clone(),
    );
    let ingestor = Ingestor::new(
        WebSocketConnector::new(config.url.clone()),
        subscription,
        cache,
        stats,
        config.reconnect_backoff(),
    );

    Some(tokio::spawn(ingestor.run(cancel)))
}
