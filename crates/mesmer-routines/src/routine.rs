use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutineId(pub Uuid);

impl RoutineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoutineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoutineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoutineId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// How the voice reference for a routine was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceType {
    /// One of the bundled sample voices, addressed by `voice_id`
    Sample,
    /// A caller-provided reference file; not retained across regenerations
    Upload,
}

/// A saved generation request and its latest successful output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub id: RoutineId,
    pub name: String,
    pub text: String,
    pub language: String,
    pub voice_type: VoiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Most recent successfully generated artifact; overwritten, never
    /// appended, on regeneration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for a routine that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewRoutine {
    pub name: String,
    pub text: String,
    pub language: String,
    pub voice_type: VoiceType,
    pub voice_id: Option<String>,
    pub output_filename: Option<String>,
}

/// Filesystem-safe slug of a routine name, used to derive output filenames.
/// Empty input slugs to an empty string; callers fall back to a UUID then.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
