//! Song catalogue models served to API key holders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MAX_PAGE_SIZE, page_window};

/// Represents a song record from the database.
///
/// # Database Table
///
/// Maps to the `songs` table. Only rows with `is_active = true` are served,
/// so the flag itself is never selected.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub genre: Option<String>,

    /// Listening mood, e.g. "focus", "chill", "energetic"
    pub mood: Option<String>,
    pub duration_seconds: Option<i32>,
    pub audio_url: Option<String>,
    pub cover_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Query parameters for listing songs.
///
/// # Example
///
/// `GET /api/v1/songs?mood=focus&search=rain&page=2&limit=10`
#[derive(Debug, Deserialize)]
pub struct SongQuery {
    pub mood: Option<String>,
    pub genre: Option<String>,

    /// Case-insensitive match against title or artist
    pub search: Option<String>,

    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

impl SongQuery {
    /// Page size clamped to 1..=100.
    pub fn page_size(&self) -> i64 {
        page_window(self.page, self.limit).0
    }

    /// Row offset for the requested page (pages start at 1).
    pub fn offset(&self) -> i64 {
        page_window(self.page, self.limit).1
    }
}

/// Query parameters for the random and by-mood endpoints.
///
/// # Example
///
/// `GET /api/v1/songs/random?mood=chill&limit=5`
#[derive(Debug, Default, Deserialize)]
pub struct SongSampleQuery {
    /// Only used by `/songs/random`; the by-mood endpoint takes it from the path
    pub mood: Option<String>,
    pub limit: Option<i64>,
}

impl SongSampleQuery {
    /// Requested sample size, `default` when absent, clamped like the listing.
    pub fn size(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
    }
}

/// Paginated song listing.
#[derive(Debug, Serialize)]
pub struct SongPage {
    pub songs: Vec<Song>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}
