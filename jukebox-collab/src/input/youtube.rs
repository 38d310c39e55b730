use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{ResolveError, ResolvedTrack, TrackResolver};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// YouTube's category id for music videos
const MUSIC_CATEGORY_ID: &str = "10";

lazy_static! {
    static ref URL_SCHEME_REGEX: Regex = Regex::new(r"^(https?://)?").unwrap();
}

/// Resolves queries and URLs through the YouTube Data API.
pub struct YouTubeResolver {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct VideoList {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: String,
    snippet: Snippet,
    #[serde(rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(rename = "channelTitle")]
    channel_title: String,
    #[serde(default, rename = "categoryId")]
    category_id: String,
    #[serde(default, rename = "liveBroadcastContent")]
    live_broadcast_content: String,
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

#[derive(Debug, Deserialize)]
struct SearchList {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchResultId,
}

#[derive(Debug, Deserialize)]
struct SearchResultId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

impl YouTubeResolver {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(RESOLVE_TIMEOUT)
            .build()
            .expect("http client is built");

        Self { client, api_key }
    }

    async fn search(&self, query: &str) -> Result<String, ResolveError> {
        let url = format!("{}/search", API_BASE);

        let response = self
            .client
            .get(url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", "1"),
                ("q", query),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let response = check_status(response)?;

        let results: SearchList = response
            .json()
            .await
            .map_err(|e| ResolveError::ParseError(e.to_string()))?;

        results
            .items
            .into_iter()
            .find_map(|r| r.id.video_id)
            .ok_or(ResolveError::NotFound)
    }

    async fn video_by_id(&self, video_id: &str) -> Result<ResolvedTrack, ResolveError> {
        let url = format!("{}/videos", API_BASE);

        let response = self
            .client
            .get(url)
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let response = check_status(response)?;

        let videos: VideoList = response
            .json()
            .await
            .map_err(|e| ResolveError::ParseError(e.to_string()))?;

        let video = videos.items.into_iter().next().ok_or(ResolveError::NotFound)?;

        if video.snippet.live_broadcast_content == "live"
            || video.snippet.live_broadcast_content == "upcoming"
        {
            return Err(ResolveError::LiveBroadcast);
        }

        let duration = parse_iso8601_duration(&video.content_details.duration)
            .ok_or_else(|| ResolveError::ParseError(video.content_details.duration.clone()))?;

        Ok(ResolvedTrack {
            video_id: video.id,
            title: video.snippet.title,
            channel: video.snippet.channel_title,
            thumbnail: best_thumbnail(video.snippet.thumbnails),
            duration,
            is_music: video.snippet.category_id == MUSIC_CATEGORY_ID,
        })
    }
}

#[async_trait]
impl TrackResolver for YouTubeResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, ResolveError> {
        let video_id = match extract_video_id(query) {
            Some(id) => id,
            None => self.search(query).await?,
        };

        self.video_by_id(&video_id).await
    }
}

/// Pulls a video id out of the common YouTube URL shapes. Returns None
/// for anything else, which is then treated as a free-text search.
fn extract_video_id(query: &str) -> Option<String> {
    let query = URL_SCHEME_REGEX.replace(query, "https://");
    let url = Url::parse(&query).ok()?;
    let host = url.host_str()?;

    if host.ends_with("youtube.com") {
        // youtube.com/watch?v=...
        if url.path() == "/watch" {
            return url
                .query_pairs()
                .find_map(|(k, v)| (k == "v" && !v.is_empty()).then(|| v.to_string()));
        }

        // youtube.com/v/... and youtube.com/shorts/...
        if let Some(rest) = url
            .path()
            .strip_prefix("/v/")
            .or_else(|| url.path().strip_prefix("/shorts/"))
        {
            if !rest.is_empty() {
                return Some(rest.trim_end_matches('/').to_string());
            }
        }

        return None;
    }

    // youtu.be/...
    if host == "youtu.be" {
        let id = url.path().trim_matches('/');

        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    None
}

/// Parses the PT#H#M#S duration format used by the Data API.
fn parse_iso8601_duration(raw: &str) -> Option<u32> {
    let rest = raw.strip_prefix("PT").or_else(|| raw.strip_prefix("P"))?;

    let mut seconds = 0u32;
    let mut number = String::new();

    for char in rest.chars() {
        if char.is_ascii_digit() {
            number.push(char);
            continue;
        }

        // The date/time separator in shapes like P1DT2H
        if char == 'T' && number.is_empty() {
            continue;
        }

        let value: u32 = number.parse().ok()?;
        number.clear();

        match char {
            'D' => seconds += value * 86_400,
            'H' => seconds += value * 3_600,
            'M' => seconds += value * 60,
            'S' => seconds += value,
            _ => return None,
        }
    }

    number.is_empty().then_some(seconds)
}

fn best_thumbnail(thumbnails: Thumbnails) -> String {
    thumbnails
        .high
        .or(thumbnails.medium)
        .or(thumbnails.default)
        .map(|t| t.url)
        .unwrap_or_default()
}

fn request_error(error: reqwest::Error) -> ResolveError {
    ResolveError::Unavailable(error.to_string())
}

fn check_status(response: Response) -> Result<Response, ResolveError> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        Err(ResolveError::QuotaExhausted)
    } else if status == StatusCode::NOT_FOUND {
        Err(ResolveError::NotFound)
    } else {
        Err(ResolveError::Unavailable(status.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extracts_ids_from_urls() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=z09GolEktUw"),
            Some("z09GolEktUw".to_string())
        );
        assert_eq!(
            extract_video_id("www.youtube.com/watch?v=z09GolEktUw&feature=youtu.be"),
            Some("z09GolEktUw".to_string())
        );
        assert_eq!(
            extract_video_id("https://music.youtube.com/watch?v=-t-75CCdM2o"),
            Some("-t-75CCdM2o".to_string())
        );
        assert_eq!(
            extract_video_id("youtu.be/z09GolEktUw"),
            Some("z09GolEktUw".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtube.com/shorts/JwRWf3ho4B8"),
            Some("JwRWf3ho4B8".to_string())
        );
    }

    #[test]
    fn free_text_is_not_a_url() {
        assert_eq!(extract_video_id("never gonna give you up"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/@SomeChannel"), None);
        assert_eq!(extract_video_id("https://example.com/watch?v=abc"), None);
    }

    #[test]
    fn parses_api_durations() {
        assert_eq!(parse_iso8601_duration("PT3M33S"), Some(213));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("PT2H"), Some(7200));
        assert_eq!(parse_iso8601_duration("P1DT2H"), Some(93_600));
        assert_eq!(parse_iso8601_duration("garbage"), None);
    }
}
