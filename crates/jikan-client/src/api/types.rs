//! Jikan API v4 response types.
//!
//! These types represent the JSON responses from the Jikan API. Fields the
//! upstream is known to emit as null are `Option`; parsing failures are
//! handled by the fetch wrappers, which fall back to the resource's default
//! shape rather than trusting a partial document.

use serde::{Deserialize, Serialize};

/// Envelope for single-object responses: `{ "data": T }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Envelope for paginated list responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Default for Paged<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            pagination: Pagination::default(),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub last_visible_page: u32,
    pub has_next_page: bool,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub items: Option<PaginationItems>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            last_visible_page: 1,
            has_next_page: false,
            current_page: None,
            items: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationItems {
    pub count: u32,
    pub total: u32,
    pub per_page: u32,
}

/// Images in both encodings offered by the API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Images {
    #[serde(default)]
    pub jpg: ImageSet,
    #[serde(default)]
    pub webp: Option<ImageSet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageSet {
    pub image_url: Option<String>,
    pub small_image_url: Option<String>,
    pub large_image_url: Option<String>,
}

/// MAL entity reference (genre, studio, producer, related title, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalEntity {
    pub mal_id: u32,
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,
    pub name: String,
    pub url: String,
}

/// Genre/theme/demographic listing entry from `/genres/anime`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub mal_id: u32,
    pub name: String,
    pub url: String,
    pub count: u32,
}

/// Aired/published date range
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub string: Option<String>,
}

/// Broadcast information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub day: Option<String>,
    pub time: Option<String>,
    pub timezone: Option<String>,
    pub string: Option<String>,
}

/// Trailer reference attached to anime and promo entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trailer {
    pub youtube_id: Option<String>,
    pub url: Option<String>,
    pub embed_url: Option<String>,
}

/// Anime entry as returned by list endpoints (top, search, seasons, schedules)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anime {
    pub mal_id: u32,
    pub url: String,
    pub images: Images,
    #[serde(default)]
    pub trailer: Option<Trailer>,
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub title_synonyms: Vec<String>,
    #[serde(rename = "type")]
    pub anime_type: Option<String>,
    pub source: Option<String>,
    pub episodes: Option<u32>,
    pub status: Option<String>,
    #[serde(default)]
    pub airing: bool,
    #[serde(default)]
    pub aired: DateRange,
    pub duration: Option<String>,
    pub rating: Option<String>,
    pub score: Option<f64>,
    pub scored_by: Option<u32>,
    pub rank: Option<u32>,
    pub popularity: Option<u32>,
    pub members: Option<u32>,
    pub favorites: Option<u32>,
    pub synopsis: Option<String>,
    pub season: Option<String>,
    pub year: Option<u32>,
    #[serde(default)]
    pub broadcast: Option<Broadcast>,
    #[serde(default)]
    pub genres: Vec<MalEntity>,
    #[serde(default)]
    pub themes: Vec<MalEntity>,
    #[serde(default)]
    pub demographics: Vec<MalEntity>,
    #[serde(default)]
    pub studios: Vec<MalEntity>,
    #[serde(default)]
    pub producers: Vec<MalEntity>,
}

/// Full anime details from `/anime/{id}/full`
///
/// Superset of [`Anime`]: the full view inlines relations, theme songs,
/// external links and streaming platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeDetails {
    #[serde(flatten)]
    pub anime: Anime,
    pub background: Option<String>,
    #[serde(default)]
    pub licensors: Vec<MalEntity>,
    #[serde(default)]
    pub explicit_genres: Vec<MalEntity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub theme: Option<ThemeSongs>,
    #[serde(default)]
    pub external: Vec<ExternalLink>,
    #[serde(default)]
    pub streaming: Vec<ExternalLink>,
}

/// Relation group: how a set of entries relates to this title
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub relation: String,
    pub entry: Vec<MalEntity>,
}

/// Opening and ending theme songs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeSongs {
    #[serde(default)]
    pub openings: Vec<String>,
    #[serde(default)]
    pub endings: Vec<String>,
}

/// External or streaming link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalLink {
    pub name: String,
    pub url: String,
}

/// Episode listing entry from `/anime/{id}/episodes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub mal_id: u32,
    pub url: Option<String>,
    pub title: Option<String>,
    pub title_japanese: Option<String>,
    pub title_romanji: Option<String>,
    pub aired: Option<String>,
    pub score: Option<f64>,
    #[serde(default)]
    pub filler: bool,
    #[serde(default)]
    pub recap: bool,
    pub forum_url: Option<String>,
}

/// Character credit from `/anime/{id}/characters`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterEntry {
    pub character: CharacterInfo,
    pub role: Option<String>,
    #[serde(default)]
    pub favorites: Option<u32>,
    #[serde(default)]
    pub voice_actors: Vec<VoiceActor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub mal_id: u32,
    pub url: String,
    pub images: Images,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceActor {
    pub person: Person,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub mal_id: u32,
    pub url: String,
    pub images: Images,
    pub name: String,
}

/// Character list plus the entity tag the endpoint serves it under
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterList {
    pub characters: Vec<CharacterEntry>,
    pub etag: Option<String>,
}

/// Viewing statistics from `/anime/{id}/statistics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub watching: u32,
    pub completed: u32,
    pub on_hold: u32,
    pub dropped: u32,
    pub plan_to_watch: u32,
    pub total: u32,
    #[serde(default)]
    pub scores: Vec<ScoreBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub score: u32,
    pub votes: u32,
    pub percentage: f64,
}

/// Video listing from `/anime/{id}/videos`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimeVideos {
    #[serde(default)]
    pub promo: Vec<PromoVideo>,
    #[serde(default)]
    pub episodes: Vec<VideoEpisode>,
    #[serde(default)]
    pub music_videos: Vec<MusicVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoVideo {
    pub title: Option<String>,
    pub trailer: Trailer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoEpisode {
    pub mal_id: u32,
    pub url: Option<String>,
    pub title: Option<String>,
    pub episode: Option<String>,
    #[serde(default)]
    pub images: Images,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicVideo {
    pub title: Option<String>,
    pub video: Trailer,
    #[serde(default)]
    pub meta: Option<MusicVideoMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicVideoMeta {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// News article from `/anime/{id}/news`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub mal_id: u32,
    pub url: String,
    pub title: String,
    pub date: Option<String>,
    pub author_username: Option<String>,
    pub forum_url: Option<String>,
    #[serde(default)]
    pub images: Images,
    pub comments: Option<u32>,
    pub excerpt: Option<String>,
}

/// Forum topic from `/anime/{id}/forum`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumTopic {
    pub mal_id: u32,
    pub url: String,
    pub title: String,
    pub date: Option<String>,
    pub author_username: Option<String>,
    pub comments: Option<u32>,
}

/// Picture set entry from `/anime/{id}/pictures`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Picture {
    #[serde(default)]
    pub jpg: ImageSet,
    #[serde(default)]
    pub webp: Option<ImageSet>,
}

/// Free-form supplementary text from `/anime/{id}/moreinfo`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoreInfo {
    pub moreinfo: Option<String>,
}

/// Recommendation entry from `/anime/{id}/recommendations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationEntry {
    pub entry: RecommendedTitle,
    pub url: Option<String>,
    #[serde(default)]
    pub votes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedTitle {
    pub mal_id: u32,
    pub url: String,
    pub images: Images,
    pub title: String,
}

/// Manga entry as returned by list endpoints (top, search)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manga {
    pub mal_id: u32,
    pub url: String,
    pub images: Images,
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub title_synonyms: Vec<String>,
    #[serde(rename = "type")]
    pub manga_type: Option<String>,
    pub chapters: Option<u32>,
    pub volumes: Option<u32>,
    pub status: Option<String>,
    #[serde(default)]
    pub publishing: bool,
    #[serde(default)]
    pub published: DateRange,
    pub score: Option<f64>,
    pub scored_by: Option<u32>,
    pub rank: Option<u32>,
    pub popularity: Option<u32>,
    pub members: Option<u32>,
    pub favorites: Option<u32>,
    pub synopsis: Option<String>,
    #[serde(default)]
    pub authors: Vec<MalEntity>,
    #[serde(default)]
    pub genres: Vec<MalEntity>,
    #[serde(default)]
    pub themes: Vec<MalEntity>,
    #[serde(default)]
    pub demographics: Vec<MalEntity>,
}

/// Chapter listing entry from `/manga/{id}/chapters`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MangaChapter {
    pub mal_id: u32,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// Full manga details from `/manga/{id}/full`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MangaDetails {
    #[serde(flatten)]
    pub manga: Manga,
    pub background: Option<String>,
    #[serde(default)]
    pub serializations: Vec<MalEntity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub external: Vec<ExternalLink>,
}
