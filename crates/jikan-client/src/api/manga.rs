//! Manga resource fetch wrappers.
//!
//! Same contract as the anime wrappers: a value of the documented shape
//! always comes back, and failures degrade to the fallback shape.

use super::error::FetchOutcome;
use super::types::*;
use super::JikanApi;

impl JikanApi {
    /// Search manga by title. Fallback: empty list.
    pub async fn search_manga(&self, query: &str, page: u32) -> FetchOutcome<Vec<Manga>> {
        let path = format!(
            "/manga?q={}&sfw=true&page={}",
            urlencoding::encode(query),
            page
        );
        FetchOutcome::from_result("manga.search", self.get_data(&path).await, Vec::new)
    }

    /// Top-rated manga, paginated. Fallback: empty list.
    pub async fn top_manga(&self, page: u32) -> FetchOutcome<Vec<Manga>> {
        let path = format!("/top/manga?page={}", page);
        FetchOutcome::from_result("manga.top", self.get_data(&path).await, Vec::new)
    }

    /// Full details for one title. Fallback: `None`.
    pub async fn manga_by_id(&self, id: u32) -> FetchOutcome<Option<MangaDetails>> {
        let path = format!("/manga/{}/full", id);
        FetchOutcome::from_result(
            "manga.by_id",
            self.get_data(&path).await.map(Some),
            || None,
        )
    }

    /// Chapter listing with pagination. Fallback: empty single page.
    pub async fn manga_chapters(&self, id: u32, page: u32) -> FetchOutcome<Paged<MangaChapter>> {
        let path = format!("/manga/{}/chapters?page={}", id, page);
        FetchOutcome::from_result("manga.chapters", self.get_page(&path).await, Paged::default)
    }

    /// Recommendations attached to a title. Fallback: empty list.
    pub async fn manga_recommendations(&self, id: u32) -> FetchOutcome<Vec<RecommendationEntry>> {
        let path = format!("/manga/{}/recommendations", id);
        FetchOutcome::from_result("manga.recommendations", self.get_data(&path).await, Vec::new)
    }
}
