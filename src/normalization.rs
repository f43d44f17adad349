use serde::{Deserialize, Deserializer};

/// Normalizes free text by stripping surrounding whitespace and
/// composing it into Unicode Normalization Form C.
///
/// ```
/// use annotator::normalization::normalize_text;
/// assert_eq!(normalize_text(" Intro\u{301} "), "Intró");
/// ```
pub fn normalize_text(text: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    text.as_ref().trim().nfc().collect()
}

/// Deserializes a `String` after running it through `normalize_text`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(normalize_text(s))
}

/// Deserializes an optional `String` after running it through
/// `normalize_text`. Blank strings become `None`.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let o: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(o.map(normalize_text).filter(|s| !s.is_empty()))
}
