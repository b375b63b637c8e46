use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speed (knots) above which a vessel is considered under way.
pub const UNDERWAY_SPEED_KNOTS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Position,
    Static,
}

impl ObservationKind {
    pub fn source_tag(&self) -> &'static str {
        match self {
            ObservationKind::Position => "aisstream",
            ObservationKind::Static => "aisstream_static",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
}

/// The partial field set carried by one feed message. Absent fields are
/// `None` and never overwrite reconciled state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationFields {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed: Option<f64>,
    pub course: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub type_code: Option<u16>,
    pub dims: Option<Dimensions>,
    pub destination: Option<String>,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub vessel_id: String,
    pub kind: ObservationKind,
    pub fields: ObservationFields,
}

impl Observation {
    pub fn new(vessel_id: impl Into<String>, kind: ObservationKind, fields: ObservationFields) -> Self {
        Self {
            vessel_id: vessel_id.into(),
            kind,
            fields,
        }
    }

    pub fn position(
        vessel_id: impl Into<String>,
        lat: f64,
        lon: f64,
        speed: f64,
        course: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            vessel_id,
            ObservationKind::Position,
            ObservationFields {
                lat: Some(lat),
                lon: Some(lon),
                speed: Some(speed),
                course: Some(course),
                timestamp: Some(timestamp),
                ..ObservationFields::default()
            },
        )
    }
}

/// Maps an AIS ship type code to a readable category.
pub fn vessel_type_name(type_code: u16) -> &'static str {
    match type_code {
        70..=79 => "Cargo Ship",
        80..=89 => "Tanker",
        _ => "Unknown Vessel",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VesselStatus {
    #[serde(rename = "En Route")]
    EnRoute,
    #[serde(rename = "Docked")]
    Docked,
    #[serde(rename = "Unknown")]
    Unknown,
}

/// Current state of one vessel, folded from every cached observation for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselRecord {
    pub mmsi: String,
    pub vessel_name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed: Option<f64>,
    pub course: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    pub type_code: Option<u16>,
    pub vessel_type: Option<String>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub destination: Option<String>,
    pub eta: Option<String>,
    pub source: String,
    pub status: VesselStatus,
}

impl VesselRecord {
    pub fn new(mmsi: impl Into<String>) -> Self {
        Self {
            mmsi: mmsi.into(),
            vessel_name: None,
            lat: None,
            lon: None,
            speed: None,
            course: None,
            last_update: None,
            type_code: None,
            vessel_type: None,
            length: None,
            width: None,
            destination: None,
            eta: None,
            source: String::new(),
            status: VesselStatus::Unknown,
        }
    }

    /// Partial merge: every field present in `observation` replaces the
    /// current value, absent fields leave it untouched.
    pub fn merge(&mut self, observation: &Observation) {
        let fields = &observation.fields;

        overwrite(&mut self.lat, fields.lat);
        overwrite(&mut self.lon, fields.lon);
        overwrite(&mut self.speed, fields.speed);
        overwrite(&mut self.course, fields.course);
        overwrite(&mut self.last_update, fields.timestamp);
        overwrite_text(&mut self.vessel_name, fields.name.as_deref());
        overwrite_text(&mut self.destination, fields.destination.as_deref());
        overwrite_text(&mut self.eta, fields.eta.as_deref());

        if let Some(code) = fields.type_code {
            self.type_code = Some(code);
            self.vessel_type = Some(vessel_type_name(code).to_string());
        }
        if let Some(dims) = fields.dims {
            self.length = Some(dims.length);
            self.width = Some(dims.width);
        }

        self.source = observation.kind.source_tag().to_string();
        self.status = self.derive_status();
    }

    fn derive_status(&self) -> VesselStatus {
        match (self.lat, self.lon, self.speed) {
            (Some(_), Some(_), Some(speed)) if speed > UNDERWAY_SPEED_KNOTS => VesselStatus::EnRoute,
            (Some(_), Some(_), _) => VesselStatus::Docked,
            _ => VesselStatus::Unknown,
        }
    }
}

fn overwrite<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

// Blank strings count as absent.
fn overwrite_text(slot: &mut Option<String>, incoming: Option<&str>) {
    if let Some(text) = incoming.map(str::trim).filter(|text| !text.is_empty()) {
        *slot = Some(text.to_string());
    }
}
