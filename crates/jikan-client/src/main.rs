//! Jikan client CLI application.
//!
//! Thin front-end over the library: builds one gateway + API + query cache
//! from the configuration and runs a browse or details command against the
//! upstream.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use jikan_client::api::types::{Anime, Manga};
use jikan_client::api::{FetchGateway, JikanApi, ScheduleDay, Season};
use jikan_client::query::{QueryCache, QueryError, QueryKey, QueryOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::Config;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List top-rated anime
    Top {
        #[arg(default_value_t = 1)]
        page: u32,
    },
    /// List top-rated manga
    TopManga {
        #[arg(default_value_t = 1)]
        page: u32,
    },
    /// List upcoming season entries
    Upcoming {
        #[arg(default_value_t = 1)]
        page: u32,
    },
    /// List entries for a broadcast season (defaults to the current one)
    Season {
        year: Option<i32>,
        season: Option<String>,
    },
    /// List anime airing on a weekday
    Schedule { day: String },
    /// Search anime by title
    Search {
        query: String,
        #[arg(default_value_t = 1)]
        page: u32,
    },
    /// List genres available for filtering
    Genres,
    /// List the most-followed anime in a genre
    Genre {
        id: u32,
        #[arg(default_value_t = 1)]
        page: u32,
    },
    /// Show a random title
    Random,
    /// Show the details view for one anime
    Anime { id: u32 },
    /// Show the details view for one manga
    Manga { id: u32 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    shared::logging::init(shared::LogConfig {
        log_dir: config.log_dir().to_string_lossy().to_string(),
        component: "jikan-client".to_string(),
        default_level: log_level,
        console: true,
        file: true,
        json_format: false,
    })?;

    info!(config_file = %args.config.display(), "Jikan client starting");

    // One gateway per process; everything shares its dispatch clock.
    let gateway = Arc::new(FetchGateway::new(&config.api).context("Failed to create gateway")?);
    let api = JikanApi::new(gateway, config.api.base_url.clone());
    let cache = QueryCache::new();
    let options = QueryOptions {
        stale_time: config.query.stale_seconds.map(Duration::from_secs),
        ..Default::default()
    };

    match args.command {
        Command::Top { page } => {
            let anime = cached(&cache, QueryKey::new("anime.top").arg(page), &options, {
                let api = api.clone();
                move || async move { api.top_anime(page).await.value() }
            })
            .await
            .unwrap_or_default();
            print_anime_list(&anime);
        }
        Command::TopManga { page } => {
            let manga = cached(&cache, QueryKey::new("manga.top").arg(page), &options, {
                let api = api.clone();
                move || async move { api.top_manga(page).await.value() }
            })
            .await
            .unwrap_or_default();
            print_manga_list(&manga);
        }
        Command::Upcoming { page } => {
            let anime = cached(&cache, QueryKey::new("anime.upcoming").arg(page), &options, {
                let api = api.clone();
                move || async move { api.upcoming_anime(page).await.value() }
            })
            .await
            .unwrap_or_default();
            print_anime_list(&anime);
        }
        Command::Season { year, season } => {
            let (default_year, default_season) = Season::current();
            let year = year.unwrap_or(default_year);
            let season = match season {
                Some(s) => s.parse::<Season>().map_err(|e| anyhow!(e))?,
                None => default_season,
            };
            info!(year = year, season = %season, "Browsing season");

            let key = QueryKey::new("anime.seasonal")
                .arg(year)
                .arg(season.as_str());
            let anime = cached(&cache, key, &options, {
                let api = api.clone();
                move || async move { api.seasonal_anime(year, season).await.value() }
            })
            .await
            .unwrap_or_default();
            print_anime_list(&anime);
        }
        Command::Schedule { day } => {
            let day = day.parse::<ScheduleDay>().map_err(|e| anyhow!(e))?;
            let key = QueryKey::new("anime.schedules").arg(day.as_str());
            let anime = cached(&cache, key, &options, {
                let api = api.clone();
                move || async move { api.schedules(day, false, true, 1, 25).await.value() }
            })
            .await
            .unwrap_or_default();
            print_anime_list(&anime);
        }
        Command::Search { query, page } => {
            // Short inputs never hit the upstream.
            let search_options = QueryOptions {
                enabled: query.chars().count() >= 3,
                ..options.clone()
            };
            if !search_options.enabled {
                println!("Search query too short (need at least 3 characters)");
                return Ok(());
            }

            let key = QueryKey::new("anime.search").arg(query.as_str()).arg(page);
            let anime = cached(&cache, key, &search_options, {
                let api = api.clone();
                let query = query.clone();
                move || async move { api.search_anime(&query, page).await.value() }
            })
            .await
            .unwrap_or_default();

            if anime.is_empty() {
                println!("No results for \"{}\"", query);
            } else {
                print_anime_list(&anime);
            }
        }
        Command::Genres => {
            let genres = cached(&cache, QueryKey::new("anime.genres"), &options, {
                let api = api.clone();
                move || async move { api.genres().await.value() }
            })
            .await
            .unwrap_or_default();
            for genre in genres {
                println!("{:>5}  {} ({} entries)", genre.mal_id, genre.name, genre.count);
            }
        }
        Command::Genre { id, page } => {
            let key = QueryKey::new("anime.by_genre").arg(id).arg(page);
            let anime = cached(&cache, key, &options, {
                let api = api.clone();
                move || async move { api.anime_by_genre(id, page).await.value() }
            })
            .await
            .unwrap_or_default();
            print_anime_list(&anime);
        }
        Command::Random => {
            let anime = cached(&cache, QueryKey::new("anime.random"), &options, {
                let api = api.clone();
                move || async move { api.random_anime().await.value() }
            })
            .await
            .flatten();
            match anime {
                Some(anime) => print_anime_list(&[anime]),
                None => println!("Failed to load a random title"),
            }
        }
        Command::Anime { id } => {
            show_anime_details(&api, &cache, &options, id).await;
        }
        Command::Manga { id } => {
            show_manga_details(&api, &cache, &options, id).await;
        }
    }

    let stats = cache.stats();
    info!(
        entries = stats.entries,
        in_flight = stats.in_flight,
        "Done"
    );

    Ok(())
}

/// Run a fetch through the cache and keep the data if it settled.
async fn cached<T, F, Fut>(
    cache: &QueryCache,
    key: QueryKey,
    options: &QueryOptions,
    fetch: F,
) -> Option<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let snapshot = cache
        .query(key, options.clone(), || async move {
            Ok::<_, QueryError>(fetch().await)
        })
        .await;
    snapshot.data
}

async fn show_anime_details(api: &JikanApi, cache: &QueryCache, options: &QueryOptions, id: u32) {
    let details = cached(cache, QueryKey::new("anime.by_id").arg(id), options, {
        let api = api.clone();
        move || async move { api.anime_by_id(id).await.value() }
    })
    .await
    .flatten();

    // The one place a failure is user-visible: without the top-level entity
    // there is nothing to render.
    let Some(details) = details else {
        println!("Failed to load anime {}", id);
        return;
    };

    println!("{} (#{})", details.anime.title, details.anime.mal_id);
    if let Some(english) = &details.anime.title_english {
        println!("  English: {}", english);
    }
    if let Some(score) = details.anime.score {
        println!("  Score:   {:.2}", score);
    }
    if let Some(episodes) = details.anime.episodes {
        println!("  Episodes: {}", episodes);
    }
    if let Some(synopsis) = &details.anime.synopsis {
        println!("\n{}\n", synopsis);
    }

    let stats = cached(cache, QueryKey::new("anime.statistics").arg(id), options, {
        let api = api.clone();
        move || async move { api.anime_statistics(id).await.value() }
    })
    .await
    .flatten();
    if let Some(stats) = stats {
        println!(
            "Watching {} / completed {} / plan-to-watch {}",
            stats.watching, stats.completed, stats.plan_to_watch
        );
    }

    let episodes = cached(
        cache,
        QueryKey::new("anime.episodes").arg(id).arg(1u32),
        options,
        {
            let api = api.clone();
            move || async move { api.anime_episodes(id, 1).await.value() }
        },
    )
    .await;
    if let Some(page) = episodes {
        if !page.data.is_empty() {
            println!("\nEpisodes (page 1 of {}):", page.pagination.last_visible_page);
            for episode in &page.data {
                println!(
                    "  {:>4}. {}",
                    episode.mal_id,
                    episode.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
    }

    let characters = cached(cache, QueryKey::new("anime.characters").arg(id), options, {
        let api = api.clone();
        move || async move { api.anime_characters(id).await.value() }
    })
    .await
    .unwrap_or_default();
    if !characters.characters.is_empty() {
        println!("\nCharacters:");
        for entry in characters.characters.iter().take(10) {
            println!(
                "  {} ({})",
                entry.character.name,
                entry.role.as_deref().unwrap_or("?")
            );
        }
    }

    let themes = cached(cache, QueryKey::new("anime.themes").arg(id), options, {
        let api = api.clone();
        move || async move { api.anime_themes(id).await.value() }
    })
    .await
    .unwrap_or_default();
    if !themes.openings.is_empty() {
        println!("\nOpenings:");
        for opening in &themes.openings {
            println!("  {}", opening);
        }
    }

    let videos = cached(cache, QueryKey::new("anime.videos").arg(id), options, {
        let api = api.clone();
        move || async move { api.anime_videos(id).await.value() }
    })
    .await
    .unwrap_or_default();
    if !videos.promo.is_empty() {
        println!("\nPromos:");
        for promo in &videos.promo {
            println!("  {}", promo.title.as_deref().unwrap_or("(untitled)"));
        }
    }

    let relations = cached(cache, QueryKey::new("anime.relations").arg(id), options, {
        let api = api.clone();
        move || async move { api.anime_relations(id).await.value() }
    })
    .await
    .unwrap_or_default();
    if !relations.is_empty() {
        println!("\nRelations:");
        for relation in &relations {
            for entry in &relation.entry {
                println!("  {}: {}", relation.relation, entry.name);
            }
        }
    }

    let news = cached(cache, QueryKey::new("anime.news").arg(id), options, {
        let api = api.clone();
        move || async move { api.anime_news(id).await.value() }
    })
    .await
    .unwrap_or_default();
    if !news.is_empty() {
        println!("\nNews:");
        for item in news.iter().take(5) {
            println!("  {}", item.title);
        }
    }

    let recommendations = cached(
        cache,
        QueryKey::new("anime.recommendations").arg(id),
        options,
        {
            let api = api.clone();
            move || async move { api.anime_recommendations(id).await.value() }
        },
    )
    .await
    .unwrap_or_default();
    if !recommendations.is_empty() {
        println!("\nRecommended:");
        for rec in recommendations.iter().take(5) {
            println!("  {} ({} votes)", rec.entry.title, rec.votes);
        }
    }
}

async fn show_manga_details(api: &JikanApi, cache: &QueryCache, options: &QueryOptions, id: u32) {
    let details = cached(cache, QueryKey::new("manga.by_id").arg(id), options, {
        let api = api.clone();
        move || async move { api.manga_by_id(id).await.value() }
    })
    .await
    .flatten();

    let Some(details) = details else {
        println!("Failed to load manga {}", id);
        return;
    };

    println!("{} (#{})", details.manga.title, details.manga.mal_id);
    if let Some(score) = details.manga.score {
        println!("  Score: {:.2}", score);
    }
    if let Some(synopsis) = &details.manga.synopsis {
        println!("\n{}\n", synopsis);
    }

    let chapters = cached(
        cache,
        QueryKey::new("manga.chapters").arg(id).arg(1u32),
        options,
        {
            let api = api.clone();
            move || async move { api.manga_chapters(id, 1).await.value() }
        },
    )
    .await;
    if let Some(page) = chapters {
        if !page.data.is_empty() {
            println!("Chapters (page 1 of {}):", page.pagination.last_visible_page);
            for chapter in page.data.iter().take(10) {
                println!(
                    "  {:>4}. {}",
                    chapter.mal_id,
                    chapter.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
    }

    let recommendations = cached(
        cache,
        QueryKey::new("manga.recommendations").arg(id),
        options,
        {
            let api = api.clone();
            move || async move { api.manga_recommendations(id).await.value() }
        },
    )
    .await
    .unwrap_or_default();
    if !recommendations.is_empty() {
        println!("\nRecommended:");
        for rec in recommendations.iter().take(5) {
            println!("  {} ({} votes)", rec.entry.title, rec.votes);
        }
    }
}

fn print_anime_list(anime: &[Anime]) {
    if anime.is_empty() {
        println!("No entries");
        return;
    }
    for (i, entry) in anime.iter().enumerate() {
        let score = entry
            .score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "n/a".to_string());
        println!("{:>3}. {} (score: {})", i + 1, entry.title, score);
    }
}

fn print_manga_list(manga: &[Manga]) {
    if manga.is_empty() {
        println!("No entries");
        return;
    }
    for (i, entry) in manga.iter().enumerate() {
        let score = entry
            .score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "n/a".to_string());
        println!("{:>3}. {} (score: {})", i + 1, entry.title, score);
    }
}
