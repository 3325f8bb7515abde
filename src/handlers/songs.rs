//! Song catalogue HTTP handlers.
//!
//! This module implements the metered catalogue endpoints:
//! - GET /api/v1/songs - List songs with filters and pagination
//! - GET /api/v1/songs/moods - List the moods that have songs
//! - GET /api/v1/songs/random - A random handful of songs, optionally of one mood
//! - GET /api/v1/songs/mood/{mood} - Newest songs of one mood
//! - GET /api/v1/songs/{id} - Get one song
//!
//! Every route sits behind the quota gate, so each call here has already been
//! charged to the caller's API key.

use crate::{
    db::DbPool,
    error::AppError,
    middleware::quota_gate::ApiKeyIdentity,
    models::{
        ApiResponse,
        song::{Song, SongPage, SongQuery, SongSampleQuery},
    },
};
use axum::{Extension, Json, extract::State};

use super::extract::{AppPath, AppQuery};

/// Columns mapped onto [`Song`].
const SONG_COLUMNS: &str =
    "id, title, artist, genre, mood, duration_seconds, audio_url, cover_url, created_at";

const RANDOM_DEFAULT_LIMIT: i64 = 5;
const BY_MOOD_DEFAULT_LIMIT: i64 = 10;

/// Filter shared by the listing and its count. `$1` mood, `$2` genre, `$3` search.
const SONG_FILTER: &str = r#"
    WHERE is_active = true
      AND ($1::TEXT IS NULL OR mood = $1)
      AND ($2::TEXT IS NULL OR genre = $2)
      AND ($3::TEXT IS NULL OR title ILIKE '%' || $3 || '%' OR artist ILIKE '%' || $3 || '%')
"#;

/// List songs.
///
/// # Endpoint
///
/// `GET /api/v1/songs?mood=focus&genre=lofi&search=rain&page=1&limit=20`
///
/// All query parameters are optional. `limit` is clamped to 1..=100.
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "data": { "songs": [ ... ], "page": 1, "limit": 20, "total": 42 }
/// }
/// ```
pub async fn list_songs(
    State(pool): State<DbPool>,
    Extension(identity): Extension<ApiKeyIdentity>,
    AppQuery(query): AppQuery<SongQuery>,
) -> Result<Json<ApiResponse<SongPage>>, AppError> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let songs = sqlx::query_as::<_, Song>(&format!(
        "SELECT {SONG_COLUMNS} FROM songs {SONG_FILTER} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"
    ))
    .bind(query.mood.as_deref())
    .bind(query.genre.as_deref())
    .bind(search)
    .bind(query.page_size())
    .bind(query.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM songs {SONG_FILTER}"))
        .bind(query.mood.as_deref())
        .bind(query.genre.as_deref())
        .bind(search)
        .fetch_one(&pool)
        .await?;

    tracing::debug!(
        api_key_id = %identity.api_key_id,
        returned = songs.len(),
        total,
        "Songs listed"
    );

    Ok(Json(ApiResponse::ok(SongPage {
        songs,
        page: query.page.max(1),
        limit: query.page_size(),
        total,
    })))
}

/// List distinct moods of active songs, alphabetically.
pub async fn list_moods(State(pool): State<DbPool>) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let moods = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT mood FROM songs
        WHERE is_active = true AND mood IS NOT NULL
        ORDER BY mood
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(ApiResponse::ok(moods)))
}

/// Get one active song.
///
/// # Response
///
/// - **Success (200 OK)**: the song
/// - **Error (404)**: no active song with that id
pub async fn get_song(
    State(pool): State<DbPool>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ApiResponse<Song>>, AppError> {
    let song = sqlx::query_as::<_, Song>(&format!(
        "SELECT {SONG_COLUMNS} FROM songs WHERE id = $1 AND is_active = true"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Song"))?;

    Ok(Json(ApiResponse::ok(song)))
}

/// A random selection of songs.
///
/// # Endpoint
///
/// `GET /api/v1/songs/random?mood=chill&limit=5`
///
/// `limit` defaults to 5 and is clamped to 1..=100.
pub async fn random_songs(
    State(pool): State<DbPool>,
    AppQuery(query): AppQuery<SongSampleQuery>,
) -> Result<Json<ApiResponse<Vec<Song>>>, AppError> {
    let mood = query
        .mood
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    let songs = sqlx::query_as::<_, Song>(&format!(
        r#"
        SELECT {SONG_COLUMNS} FROM songs
        WHERE is_active = true AND ($1::TEXT IS NULL OR mood = $1)
        ORDER BY RANDOM()
        LIMIT $2
        "#
    ))
    .bind(mood)
    .bind(query.size(RANDOM_DEFAULT_LIMIT))
    .fetch_all(&pool)
    .await?;

    Ok(Json(ApiResponse::ok(songs)))
}

/// Newest songs of one mood.
///
/// # Endpoint
///
/// `GET /api/v1/songs/mood/{mood}?limit=10`
///
/// `limit` defaults to 10 and is clamped to 1..=100. An unknown mood gives an
/// empty list.
pub async fn songs_by_mood(
    State(pool): State<DbPool>,
    AppPath(mood): AppPath<String>,
    AppQuery(query): AppQuery<SongSampleQuery>,
) -> Result<Json<ApiResponse<Vec<Song>>>, AppError> {
    let songs = sqlx::query_as::<_, Song>(&format!(
        r#"
        SELECT {SONG_COLUMNS} FROM songs
        WHERE is_active = true AND mood = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#
    ))
    .bind(mood.trim())
    .bind(query.size(BY_MOOD_DEFAULT_LIMIT))
    .fetch_all(&pool)
    .await?;

    Ok(Json(ApiResponse::ok(songs)))
}
