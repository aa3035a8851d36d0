use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column order of the persisted manifest.
pub const COLUMNS: [&str; 10] = [
    "filename",
    "image_id",
    "path",
    "split",
    "cover_stego",
    "format",
    "width",
    "height",
    "decode_ok",
    "hash",
];

/// Format tag written for files the decoder could not read.
pub const DECODE_ERROR_FORMAT: &str = "decode_error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(format!("unknown split {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverStego {
    Cover,
    Stego,
    Unknown,
}

impl CoverStego {
    pub const ALL: [CoverStego; 3] = [CoverStego::Cover, CoverStego::Stego, CoverStego::Unknown];

    pub fn as_str(self) -> &'static str {
        match self {
            CoverStego::Cover => "cover",
            CoverStego::Stego => "stego",
            CoverStego::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CoverStego {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverStego {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cover" => Ok(CoverStego::Cover),
            "stego" => Ok(CoverStego::Stego),
            "unknown" => Ok(CoverStego::Unknown),
            other => Err(format!("unknown cover/stego label {other:?}")),
        }
    }
}

/// One manifest row. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub image_id: String,
    pub path: String,
    pub split: Split,
    pub cover_stego: CoverStego,
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub decode_ok: bool,
    pub hash: Option<String>,
}

impl FileRecord {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }

    /// Null flags in `COLUMNS` order.
    pub fn null_mask(&self) -> [bool; 10] {
        [
            false,
            false,
            false,
            false,
            false,
            self.format.is_none(),
            self.width.is_none(),
            self.height.is_none(),
            false,
            self.hash.is_none(),
        ]
    }
}
