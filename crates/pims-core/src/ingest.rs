//! Batch ingestion: numbered face image directories + a metadata CSV → store.
//!
//! Metadata row `idx` (0-based, file order) is paired with the first file
//! under `dataset_root/{idx + 1}/`. The pairing is purely positional: if the
//! CSV or the directory numbering is reordered, records silently misalign.
//!
//! The run is all-or-nothing. Records are staged on one session and committed
//! in a single transaction after the last row, so any failure leaves the
//! store untouched.

use crate::detector::{DetectorError, FaceDetect};
use crate::store::{PersonStore, StoreError};
use crate::types::{Bbox, NewPerson, PersonName};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metadata column holding `Firstname[_Middlename..]_Surname`.
pub const NAME_COLUMN: &str = "Name";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("the path to the dataset is incorrect: {0}")]
    DatasetNotFound(PathBuf),
    #[error("the path to the metadata file is incorrect: {0}")]
    MetadataNotFound(PathBuf),
    #[error("metadata file {0} has no 'Name' column")]
    MissingNameColumn(PathBuf),
    #[error("no image found for metadata row {row} under {dir}")]
    ImageNotFound { row: usize, dir: PathBuf },
    #[error("no face could be found in the file {path}")]
    FaceNotDetected { path: PathBuf },
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("decoding image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("metadata: {0}")]
    Csv(#[from] csv::Error),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Ids assigned to the committed records, in metadata order.
    pub inserted: Vec<i64>,
}

/// Fail fast if either input path is missing.
pub fn check_paths(dataset_root: &Path, metadata: &Path) -> Result<(), IngestError> {
    if !dataset_root.exists() {
        return Err(IngestError::DatasetNotFound(dataset_root.to_path_buf()));
    }
    if !metadata.exists() {
        return Err(IngestError::MetadataNotFound(metadata.to_path_buf()));
    }
    Ok(())
}

/// Read the `Name` column of a metadata CSV, in file order.
pub fn load_names(metadata: &Path) -> Result<Vec<PersonName>, IngestError> {
    let mut reader = csv::Reader::from_path(metadata)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == NAME_COLUMN)
        .ok_or_else(|| IngestError::MissingNameColumn(metadata.to_path_buf()))?;

    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        names.push(PersonName::parse(record.get(column).unwrap_or_default()));
    }
    Ok(names)
}

/// First regular file under `dir`, walking entries in file-name order.
pub fn first_image(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = entry.file_type()?;
        if file_type.is_file() {
            return Ok(Some(entry.path()));
        }
        if file_type.is_dir() {
            if let Some(found) = first_image(&entry.path())? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// Base64-encode the file and locate the most confident face in it.
pub fn encode_and_detect<D: FaceDetect + ?Sized>(
    detector: &mut D,
    path: &Path,
) -> Result<(String, Bbox), IngestError> {
    let bytes = fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let encoded = STANDARD.encode(&bytes);

    let rgb = image::load_from_memory(&bytes)
        .map_err(|source| IngestError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();

    let faces = detector.detect(&rgb)?;
    let face = faces.first().ok_or_else(|| IngestError::FaceNotDetected {
        path: path.to_path_buf(),
    })?;

    Ok((encoded, Bbox::from_detection(face)))
}

/// Run a full ingestion.
///
/// `progress` is called after each row with `(done, total)`.
pub fn run<D, F>(
    store: &PersonStore,
    detector: &mut D,
    dataset_root: &Path,
    metadata: &Path,
    mut progress: F,
) -> Result<IngestReport, IngestError>
where
    D: FaceDetect + ?Sized,
    F: FnMut(usize, usize),
{
    check_paths(dataset_root, metadata)?;
    store.create_schema()?;

    let names = load_names(metadata)?;
    let total = names.len();
    tracing::info!(
        dataset = %dataset_root.display(),
        metadata = %metadata.display(),
        rows = total,
        "ingestion started"
    );

    let mut session = store.connect()?;
    for (idx, person) in names.into_iter().enumerate() {
        let dir = dataset_root.join((idx + 1).to_string());
        let path = match first_image(&dir) {
            Ok(Some(path)) => path,
            Ok(None) => return Err(IngestError::ImageNotFound { row: idx, dir }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IngestError::ImageNotFound { row: idx, dir })
            }
            Err(source) => return Err(IngestError::Io { path: dir, source }),
        };

        let (image, bbox) = encode_and_detect(&mut *detector, &path)?;
        tracing::debug!(
            row = idx,
            path = %path.display(),
            name = %person.name,
            surname = %person.surname,
            ?bbox,
            "staged"
        );

        session.insert(NewPerson {
            image,
            bbox,
            name: person.name,
            surname: person.surname,
        });
        progress(idx + 1, total);
    }

    let inserted = session.commit_batch()?;
    tracing::info!(count = inserted.len(), "ingestion committed");
    Ok(IngestReport { inserted })
}
