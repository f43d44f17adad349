use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::generation::{self, Prompt, SafeGenerator};
use crate::normalization;

/// The speaking rate the generated script should fit, in words per
/// minute.
pub const WORDS_PER_MINUTE: (u32, u32) = (150, 180);

const SYSTEM_PROMPT: &str = "You are a professional voice-over script writer. \
     Write natural, engaging narration that is meant to be read aloud. \
     Reply with the script only, without titles, stage directions or quotation marks.";

/// A request for narration covering one segment of a video.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptRequest {
    /// How long the narration should last, in seconds.
    pub duration: f64,

    /// What happens during the segment.
    #[serde(deserialize_with = "normalization::deserialize")]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedScript {
    pub script: String,

    /// The number of whitespace-separated words in `script`. This only
    /// estimates the spoken length.
    pub word_count: usize,

    pub duration: f64,
}

pub fn build_prompt(duration: f64, description: &str) -> Prompt {
    let (slowest, fastest) = WORDS_PER_MINUTE;

    let user = format!(
        "Write a voice-over script for a video segment that lasts {duration} seconds. \
         The segment shows: {description}\n\n\
         The script must take {duration} seconds to read aloud at {slowest}-{fastest} words per minute, \
         which is roughly {min_words}-{max_words} words.",
        duration = duration,
        description = description,
        slowest = slowest,
        fastest = fastest,
        min_words = target_words(duration, slowest),
        max_words = target_words(duration, fastest),
    );

    Prompt {
        system: SYSTEM_PROMPT.to_owned(),
        user,
    }
}

fn target_words(duration: f64, words_per_minute: u32) -> u64 {
    (duration / 60.0 * f64::from(words_per_minute)).round().max(1.0) as u64
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Asks the generator for narration fitting `duration` seconds of the
/// described segment.
pub async fn generate(
    generator: Option<&SafeGenerator>,
    request: ScriptRequest,
) -> Result<GeneratedScript, BackendError> {
    let generator = generation::require(generator)?;

    let ScriptRequest {
        duration,
        description,
    } = request;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(BackendError::InvalidDuration(duration));
    }

    let script = generator
        .complete(build_prompt(duration, &description))
        .await?;

    Ok(GeneratedScript {
        word_count: word_count(&script),
        script,
        duration,
    })
}
