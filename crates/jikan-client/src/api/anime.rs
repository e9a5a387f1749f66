//! Anime resource fetch wrappers.
//!
//! Every wrapper resolves to a value of its documented shape: real data on
//! success, the resource's fallback shape on any failure (terminal gateway
//! error, non-success status, malformed body). Failures are logged and
//! carried as the outcome's suppressed reason; they never propagate.

use super::error::{FallbackReason, FetchOutcome};
use super::types::*;
use super::JikanApi;
use chrono::Datelike;
use reqwest::header;
use std::fmt;
use std::str::FromStr;

/// Broadcast season of the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
        }
    }

    /// Season a given civil month falls in.
    pub fn from_month(month: u32) -> Self {
        match month {
            1..=3 => Season::Winter,
            4..=6 => Season::Spring,
            7..=9 => Season::Summer,
            _ => Season::Fall,
        }
    }

    /// The season airing right now, with its year.
    pub fn current() -> (i32, Season) {
        let today = chrono::Local::now().date_naive();
        (today.year(), Season::from_month(today.month()))
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "winter" => Ok(Season::Winter),
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "fall" | "autumn" => Ok(Season::Fall),
            other => Err(format!("unknown season: {}", other)),
        }
    }
}

/// Day filter for the broadcast schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
    Unknown,
    Other,
}

impl ScheduleDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleDay::Monday => "monday",
            ScheduleDay::Tuesday => "tuesday",
            ScheduleDay::Wednesday => "wednesday",
            ScheduleDay::Thursday => "thursday",
            ScheduleDay::Friday => "friday",
            ScheduleDay::Saturday => "saturday",
            ScheduleDay::Sunday => "sunday",
            ScheduleDay::Unknown => "unknown",
            ScheduleDay::Other => "other",
        }
    }
}

impl fmt::Display for ScheduleDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monday" => Ok(ScheduleDay::Monday),
            "tuesday" => Ok(ScheduleDay::Tuesday),
            "wednesday" => Ok(ScheduleDay::Wednesday),
            "thursday" => Ok(ScheduleDay::Thursday),
            "friday" => Ok(ScheduleDay::Friday),
            "saturday" => Ok(ScheduleDay::Saturday),
            "sunday" => Ok(ScheduleDay::Sunday),
            "unknown" => Ok(ScheduleDay::Unknown),
            "other" => Ok(ScheduleDay::Other),
            other => Err(format!("unknown schedule day: {}", other)),
        }
    }
}

impl JikanApi {
    /// Search anime by title. Fallback: empty list.
    pub async fn search_anime(&self, query: &str, page: u32) -> FetchOutcome<Vec<Anime>> {
        let path = format!(
            "/anime?q={}&sfw=true&page={}",
            urlencoding::encode(query),
            page
        );
        FetchOutcome::from_result("anime.search", self.get_data(&path).await, Vec::new)
    }

    /// Top-rated anime, paginated. Fallback: empty list.
    pub async fn top_anime(&self, page: u32) -> FetchOutcome<Vec<Anime>> {
        let path = format!("/top/anime?page={}", page);
        FetchOutcome::from_result("anime.top", self.get_data(&path).await, Vec::new)
    }

    /// Upcoming season entries. Fallback: empty list.
    pub async fn upcoming_anime(&self, page: u32) -> FetchOutcome<Vec<Anime>> {
        let path = format!("/seasons/upcoming?page={}", page);
        FetchOutcome::from_result("anime.upcoming", self.get_data(&path).await, Vec::new)
    }

    /// Entries for a broadcast season. Fallback: empty list.
    pub async fn seasonal_anime(&self, year: i32, season: Season) -> FetchOutcome<Vec<Anime>> {
        let path = format!("/seasons/{}/{}", year, season.as_str());
        FetchOutcome::from_result("anime.seasonal", self.get_data(&path).await, Vec::new)
    }

    /// Broadcast schedule for one day. Fallback: empty list.
    pub async fn schedules(
        &self,
        day: ScheduleDay,
        kids: bool,
        sfw: bool,
        page: u32,
        limit: u32,
    ) -> FetchOutcome<Vec<Anime>> {
        let path = format!(
            "/schedules?filter={}&kids={}&sfw={}&page={}&limit={}",
            day.as_str(),
            kids,
            sfw,
            page,
            limit
        );
        FetchOutcome::from_result("anime.schedules", self.get_data(&path).await, Vec::new)
    }

    /// Full details for one title. Fallback: `None`.
    pub async fn anime_by_id(&self, id: u32) -> FetchOutcome<Option<AnimeDetails>> {
        let path = format!("/anime/{}/full", id);
        FetchOutcome::from_result(
            "anime.by_id",
            self.get_data(&path).await.map(Some),
            || None,
        )
    }

    /// Viewing statistics. Fallback: `None`.
    pub async fn anime_statistics(&self, id: u32) -> FetchOutcome<Option<Statistics>> {
        let path = format!("/anime/{}/statistics", id);
        FetchOutcome::from_result(
            "anime.statistics",
            self.get_data(&path).await.map(Some),
            || None,
        )
    }

    /// Episode listing with pagination. Fallback: empty single page.
    pub async fn anime_episodes(&self, id: u32, page: u32) -> FetchOutcome<Paged<Episode>> {
        let path = format!("/anime/{}/episodes?page={}", id, page);
        FetchOutcome::from_result("anime.episodes", self.get_page(&path).await, Paged::default)
    }

    /// Supplementary free-form text. Fallback: `None`.
    pub async fn anime_more_info(&self, id: u32) -> FetchOutcome<Option<MoreInfo>> {
        let path = format!("/anime/{}/moreinfo", id);
        FetchOutcome::from_result(
            "anime.more_info",
            self.get_data(&path).await.map(Some),
            || None,
        )
    }

    /// Recommendations attached to a title. Fallback: empty list.
    pub async fn anime_recommendations(&self, id: u32) -> FetchOutcome<Vec<RecommendationEntry>> {
        let path = format!("/anime/{}/recommendations", id);
        FetchOutcome::from_result("anime.recommendations", self.get_data(&path).await, Vec::new)
    }

    /// Character credits, plus the entity tag the endpoint served them
    /// under. Fallback: empty list with no tag.
    pub async fn anime_characters(&self, id: u32) -> FetchOutcome<CharacterList> {
        let result = self.fetch_characters(id).await;
        FetchOutcome::from_result("anime.characters", result, CharacterList::default)
    }

    async fn fetch_characters(&self, id: u32) -> Result<CharacterList, FallbackReason> {
        let url = format!("{}/anime/{}/characters", self.base_url, id);
        let response = self.gateway.send(&url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FallbackReason::Status(status));
        }

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let envelope: Envelope<Vec<CharacterEntry>> =
            response.json().await.map_err(FallbackReason::Decode)?;

        Ok(CharacterList {
            characters: envelope.data,
            etag,
        })
    }

    /// Promotional and episode videos. Fallback: all sections empty.
    pub async fn anime_videos(&self, id: u32) -> FetchOutcome<AnimeVideos> {
        let path = format!("/anime/{}/videos", id);
        FetchOutcome::from_result("anime.videos", self.get_data(&path).await, AnimeVideos::default)
    }

    /// Related titles. Fallback: empty list.
    pub async fn anime_relations(&self, id: u32) -> FetchOutcome<Vec<Relation>> {
        let path = format!("/anime/{}/relations", id);
        FetchOutcome::from_result("anime.relations", self.get_data(&path).await, Vec::new)
    }

    /// News articles. Fallback: empty list.
    pub async fn anime_news(&self, id: u32) -> FetchOutcome<Vec<NewsItem>> {
        let path = format!("/anime/{}/news", id);
        FetchOutcome::from_result("anime.news", self.get_data(&path).await, Vec::new)
    }

    /// Forum discussions. Fallback: empty list.
    pub async fn anime_forum(&self, id: u32) -> FetchOutcome<Vec<ForumTopic>> {
        let path = format!("/anime/{}/forum", id);
        FetchOutcome::from_result("anime.forum", self.get_data(&path).await, Vec::new)
    }

    /// Picture sets. Fallback: empty list.
    pub async fn anime_pictures(&self, id: u32) -> FetchOutcome<Vec<Picture>> {
        let path = format!("/anime/{}/pictures", id);
        FetchOutcome::from_result("anime.pictures", self.get_data(&path).await, Vec::new)
    }

    /// Opening and ending themes. Fallback: both lists empty.
    pub async fn anime_themes(&self, id: u32) -> FetchOutcome<ThemeSongs> {
        let path = format!("/anime/{}/themes", id);
        FetchOutcome::from_result("anime.themes", self.get_data(&path).await, ThemeSongs::default)
    }

    /// External links. Fallback: empty list.
    pub async fn anime_external(&self, id: u32) -> FetchOutcome<Vec<ExternalLink>> {
        let path = format!("/anime/{}/external", id);
        FetchOutcome::from_result("anime.external", self.get_data(&path).await, Vec::new)
    }

    /// Genre listing for the browse filter. Fallback: empty list.
    pub async fn genres(&self) -> FetchOutcome<Vec<Genre>> {
        FetchOutcome::from_result("anime.genres", self.get_data("/genres/anime").await, Vec::new)
    }

    /// Most-followed anime in one genre. Fallback: empty list.
    pub async fn anime_by_genre(&self, genre_id: u32, page: u32) -> FetchOutcome<Vec<Anime>> {
        let path = format!(
            "/anime?genres={}&order_by=members&sort=desc&page={}",
            genre_id, page
        );
        FetchOutcome::from_result("anime.by_genre", self.get_data(&path).await, Vec::new)
    }

    /// A random title. Fallback: `None`.
    pub async fn random_anime(&self) -> FetchOutcome<Option<Anime>> {
        FetchOutcome::from_result(
            "anime.random",
            self.get_data("/random/anime").await.map(Some),
            || None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FetchGateway;
    use crate::testutil::{CannedResponse, MockUpstream};
    use shared::config::ApiConfig;
    use std::sync::Arc;

    fn api_for(upstream: &MockUpstream) -> JikanApi {
        let config = ApiConfig {
            base_url: upstream.base_url(),
            user_agent: "aniview-test".to_string(),
            min_interval_ms: 1,
            max_attempts: 3,
            retry_delay_ms: 5,
            timeout_seconds: 5,
        };
        let gateway = Arc::new(FetchGateway::new(&config).unwrap());
        JikanApi::new(gateway, upstream.base_url())
    }

    fn api_for_refused_port() -> JikanApi {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            user_agent: "aniview-test".to_string(),
            min_interval_ms: 1,
            max_attempts: 2,
            retry_delay_ms: 1,
            timeout_seconds: 1,
        };
        let gateway = Arc::new(FetchGateway::new(&config).unwrap());
        JikanApi::new(gateway, "http://127.0.0.1:1")
    }

    #[tokio::test]
    async fn test_top_anime_unwraps_envelope() {
        let upstream = MockUpstream::serve(vec![CannedResponse::json(
            200,
            r#"{
                "data": [{
                    "mal_id": 1,
                    "url": "https://myanimelist.net/anime/1",
                    "images": {"jpg": {}},
                    "title": "Cowboy Bebop",
                    "title_english": null,
                    "title_japanese": null,
                    "type": "TV",
                    "source": null,
                    "episodes": 26,
                    "status": null,
                    "duration": null,
                    "rating": null,
                    "score": 8.75,
                    "scored_by": null,
                    "rank": null,
                    "popularity": null,
                    "members": null,
                    "favorites": null,
                    "synopsis": null,
                    "season": null,
                    "year": null
                }],
                "pagination": {"last_visible_page": 5, "has_next_page": true}
            }"#,
        )])
        .await;
        let api = api_for(&upstream);

        let outcome = api.top_anime(1).await;

        assert!(outcome.is_fetched());
        let anime = outcome.value();
        assert_eq!(anime.len(), 1);
        assert_eq!(anime[0].mal_id, 1);
        assert_eq!(upstream.paths(), vec!["/top/anime?page=1".to_string()]);
    }

    #[tokio::test]
    async fn test_search_encodes_query() {
        let upstream =
            MockUpstream::serve(vec![CannedResponse::json(200, r#"{"data":[]}"#)]).await;
        let api = api_for(&upstream);

        let outcome = api.search_anime("fullmetal alchemist", 2).await;

        assert!(outcome.is_fetched());
        assert_eq!(
            upstream.paths(),
            vec!["/anime?q=fullmetal%20alchemist&sfw=true&page=2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_videos_not_found_falls_back() {
        let upstream = MockUpstream::serve(vec![CannedResponse::json(
            404,
            r#"{"status":404,"message":"Resource does not exist"}"#,
        )])
        .await;
        let api = api_for(&upstream);

        let outcome = api.anime_videos(999).await;

        match outcome.reason() {
            Some(FallbackReason::Status(status)) => assert_eq!(status.as_u16(), 404),
            other => panic!("unexpected reason: {:?}", other),
        }
        let videos = outcome.value();
        assert!(videos.promo.is_empty());
        assert!(videos.episodes.is_empty());
    }

    #[tokio::test]
    async fn test_anime_by_id_server_error_yields_none() {
        let upstream = MockUpstream::serve(vec![CannedResponse::json(500, "{}")]).await;
        let api = api_for(&upstream);

        let outcome = api.anime_by_id(5114).await;

        assert!(!outcome.is_fetched());
        assert!(outcome.value().is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_falls_back() {
        let upstream =
            MockUpstream::serve(vec![CannedResponse::json(200, r#"{"unexpected": true}"#)]).await;
        let api = api_for(&upstream);

        let outcome = api.anime_themes(1).await;

        assert!(matches!(outcome.reason(), Some(FallbackReason::Decode(_))));
        let themes = outcome.value();
        assert!(themes.openings.is_empty());
        assert!(themes.endings.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_yields_empty_page() {
        let api = api_for_refused_port();

        let outcome = api.anime_episodes(1, 1).await;

        assert!(matches!(outcome.reason(), Some(FallbackReason::Gateway(_))));
        let page = outcome.value();
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.last_visible_page, 1);
    }

    #[tokio::test]
    async fn test_characters_capture_entity_tag() {
        let upstream = MockUpstream::serve(vec![CannedResponse::json(
            200,
            r#"{"data": [{
                "character": {
                    "mal_id": 3,
                    "url": "https://myanimelist.net/character/3",
                    "images": {"jpg": {}},
                    "name": "Spiegel, Spike"
                },
                "role": "Main",
                "voice_actors": []
            }]}"#,
        )
        .with_header("ETag", "\"abc123\"")])
        .await;
        let api = api_for(&upstream);

        let outcome = api.anime_characters(1).await;

        assert!(outcome.is_fetched());
        let list = outcome.value();
        assert_eq!(list.characters.len(), 1);
        assert_eq!(list.characters[0].character.name, "Spiegel, Spike");
        assert_eq!(list.etag.as_deref(), Some("\"abc123\""));
    }

    #[tokio::test]
    async fn test_schedule_and_seasonal_paths() {
        let upstream =
            MockUpstream::serve(vec![CannedResponse::json(200, r#"{"data":[]}"#)]).await;
        let api = api_for(&upstream);

        api.schedules(ScheduleDay::Friday, false, true, 1, 25).await;
        api.seasonal_anime(2024, Season::Fall).await;
        api.anime_by_genre(4, 1).await;

        assert_eq!(
            upstream.paths(),
            vec![
                "/schedules?filter=friday&kids=false&sfw=true&page=1&limit=25".to_string(),
                "/seasons/2024/fall".to_string(),
                "/anime?genres=4&order_by=members&sort=desc&page=1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_top_anime_through_query_cache() {
        use crate::query::{QueryCache, QueryError, QueryKey, QueryOptions, QueryStatus};

        let upstream = MockUpstream::serve(vec![CannedResponse::json(
            200,
            r#"{
                "data": [{"mal_id": 1, "url": "https://myanimelist.net/anime/1", "images": {"jpg": {}}, "title": "Cowboy Bebop"}],
                "pagination": {"last_visible_page": 5, "has_next_page": true}
            }"#,
        )])
        .await;
        let api = api_for(&upstream);
        let cache = QueryCache::new();

        let fetch = |api: JikanApi| move || async move {
            Ok::<_, QueryError>(api.top_anime(1).await.value())
        };

        let snapshot = cache
            .query(
                QueryKey::new("anime.top").arg(1u32),
                QueryOptions::default(),
                fetch(api.clone()),
            )
            .await;

        assert_eq!(snapshot.status, QueryStatus::Success);
        let anime = snapshot.data.unwrap();
        assert_eq!(anime.len(), 1);
        assert_eq!(anime[0].mal_id, 1);

        // A repeat query inside the freshness window never reaches upstream.
        cache
            .query(
                QueryKey::new("anime.top").arg(1u32),
                QueryOptions::default(),
                fetch(api),
            )
            .await;
        assert_eq!(upstream.hits(), 1);
    }

    #[test]
    fn test_season_from_month() {
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(4), Season::Spring);
        assert_eq!(Season::from_month(8), Season::Summer);
        assert_eq!(Season::from_month(11), Season::Fall);
    }

    #[test]
    fn test_schedule_day_parsing() {
        assert_eq!("monday".parse::<ScheduleDay>().unwrap(), ScheduleDay::Monday);
        assert_eq!("SUNDAY".parse::<ScheduleDay>().unwrap(), ScheduleDay::Sunday);
        assert!("someday".parse::<ScheduleDay>().is_err());
    }
}
