//! pims-core — person record store and dataset ingestion.
//!
//! Records are kept in a single SQLite table and populated in one batch from
//! a directory of face images, using SCRFD (via ONNX Runtime) to locate the
//! face bounding box in each image.

pub mod detector;
pub mod ingest;
pub mod store;
pub mod types;

pub use detector::{FaceDetect, ScrfdDetector};
pub use store::{PersonStore, Session, StoreError};
pub use types::{Bbox, Detection, NewPerson, PersonName, PersonRecord};
