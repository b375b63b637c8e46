pub mod cache;
pub mod feed;
pub mod observation;


pub use cache::{reconcile, RingBuffer, TelemetryCache, VesselIndex};
pub use feed::{
    parse_message, spawn_ingestor, FeedConnector, FeedError, FeedStream, IngestCounters, IngestStats, Ingestor,
    Subscription, WebSocketConnector,
};
pub use observation::{
    vessel_type_name, Dimensions, Observation, ObservationFields, ObservationKind, VesselRecord, VesselStatus,
};
