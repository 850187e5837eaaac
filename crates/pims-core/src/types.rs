use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Face bounding box in pixel coordinates: `[x1, y1, x2, y2]`,
/// top-left then bottom-right corner.
///
/// Serializes to JSON as a plain four-element array and is persisted as
/// comma-delimited text (`"x1,y1,x2,y2"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bbox(pub [i32; 4]);

impl Bbox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self([x1, y1, x2, y2])
    }

    /// Round a float detection to the nearest pixel on each corner.
    pub fn from_detection(det: &Detection) -> Self {
        Self([
            det.x1.round() as i32,
            det.y1.round() as i32,
            det.x2.round() as i32,
            det.y2.round() as i32,
        ])
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BboxParseError {
    #[error("expected 4 comma-separated integers, got {0}")]
    Arity(usize),
    #[error("invalid bbox component {0:?}")]
    Component(String),
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x1, y1, x2, y2] = self.0;
        write!(f, "{x1},{y1},{x2},{y2}")
    }
}

impl FromStr for Bbox {
    type Err = BboxParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::Arity(parts.len()));
        }
        let mut out = [0i32; 4];
        for (slot, part) in out.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BboxParseError::Component(part.to_string()))?;
        }
        Ok(Self(out))
    }
}

/// Raw detector output, in the pixel space of the input image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// A stored person record, as served by the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: i64,
    /// Base64 of the source image file.
    pub image: String,
    pub bbox: Bbox,
    pub name: String,
    pub surname: String,
}

impl fmt::Display for PersonRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<PersonInfo({}, {}, {})>", self.id, self.name, self.surname)
    }
}

/// A person record staged for insertion; the store assigns `id` on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPerson {
    pub image: String,
    pub bbox: Bbox,
    pub name: String,
    pub surname: String,
}

impl NewPerson {
    pub fn with_id(self, id: i64) -> PersonRecord {
        PersonRecord {
            id,
            image: self.image,
            bbox: self.bbox,
            name: self.name,
            surname: self.surname,
        }
    }
}

/// Given name and surname split out of a metadata `Name` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    pub name: String,
    pub surname: String,
}

impl PersonName {
    /// Split `Firstname[_Middlename..]_Surname` on underscores: the last token
    /// is the surname, the rest are joined with spaces into the given name.
    pub fn parse(raw: &str) -> Self {
        let mut tokens: Vec<&str> = raw.split('_').collect();
        // split always yields at least one token
        let surname = tokens.pop().unwrap_or_default().to_string();
        Self {
            name: tokens.join(" "),
            surname,
        }
    }
}
