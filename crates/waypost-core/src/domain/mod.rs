//! Domain model (keys, submissions, captured requests, outcomes, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod request;
pub mod submission;

pub use errors::{
    CoordinateField, DeliveryError, InterceptError, StorageError, SubmitError, ValidationError,
};
pub use ids::{Key, QueuePayload, RequestKey, SubmissionKey};
pub use outcome::{DrainPass, OutcomeKind, Pass, PassReport, Receipt, ReplayPass, SubmitOutcome};
pub use request::{CapturedRequest, InterceptedResponse};
pub use submission::{Coordinates, Metadata, Submission, WireFormat};
