pub mod review;
pub mod transcript;
pub mod vehicle;

pub use review::{ReviewRecord, ReviewStatus};
pub use transcript::{decode_messages, validate_session_id, Speaker, TranscriptMessage, TranscriptRecord};
pub use vehicle::{ExtractedVehicleData, ExtractionLabel, VehicleFields};
