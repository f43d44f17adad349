use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BackendError;

/// A voice offered by the speech synthesizer.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 6] = [
        Voice::Alloy,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Shimmer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Voice::Alloy
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts exactly the lowercase names used on the wire.
impl FromStr for Voice {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Voice::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| BackendError::InvalidVoice(s.to_owned()))
    }
}

/// A speech speed multiplier within the range the synthesizer accepts.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Speed(f32);

impl Speed {
    pub const MIN: f32 = 0.25;
    pub const MAX: f32 = 4.0;

    pub fn new(value: f32) -> Result<Self, BackendError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Speed(value))
        } else {
            Err(BackendError::InvalidSpeed(value))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed(1.0)
    }
}

impl TryFrom<f32> for Speed {
    type Error = BackendError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Speed::new(value)
    }
}

impl From<Speed> for f32 {
    fn from(speed: Speed) -> f32 {
        speed.0
    }
}

impl FromStr for Speed {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s
            .trim()
            .parse()
            .map_err(|_| BackendError::InvalidSpeed(f32::NAN))?;

        Speed::new(value)
    }
}
