//! Implements `TrackSearch` with the `yt-dlp` command-line tool.
//! Free-text queries become `ytsearchN:` lookups; URLs are resolved directly and
//! may expand to a whole playlist.

use serde_json::Value;
use serenity::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::commands::music::utils::music_manager::{MusicError, MusicResult};

use super::track_metadata::{Requester, Track};
use super::{AudioSource, SearchKind, SearchResult, TrackSearch};

/// `TrackSearch` backed by a `yt-dlp` subprocess.
#[derive(Debug, Clone)]
pub struct YtDlpSearch {
    binary: String,
    result_limit: usize,
}

impl YtDlpSearch {
    /// `binary` is the executable to run; `result_limit` caps free-text search results.
    pub fn new(binary: impl Into<String>, result_limit: usize) -> Self {
        Self {
            binary: binary.into(),
            result_limit: result_limit.max(1),
        }
    }

    fn target_for(&self, query: &str) -> String {
        if AudioSource::is_url(query) {
            query.trim().to_string()
        } else {
            format!("ytsearch{}:{}", self.result_limit, query.trim())
        }
    }
}

#[async_trait]
impl TrackSearch for YtDlpSearch {
    async fn search(&self, query: &str, requester: &Requester) -> MusicResult<SearchResult> {
        if query.trim().is_empty() {
            return Ok(SearchResult::empty());
        }

        let target = self.target_for(query);
        info!("Resolving '{}' with {}", target, self.binary);

        let output = Command::new(&self.binary)
            .args(["-j", "--flat-playlist", "--no-warnings", &target])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MusicError::AudioSourceError(format!("Failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp failed for '{}': {}", target, stderr.trim());
            return Err(MusicError::AudioSourceError(format!(
                "yt-dlp exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result = parse_search_output(&stdout, requester, AudioSource::is_url(query));
        debug!("'{}' resolved to {} track(s)", target, result.tracks.len());
        Ok(result)
    }
}

/// Turns `yt-dlp -j` output (one JSON object per line) into a `SearchResult`.
pub fn parse_search_output(stdout: &str, requester: &Requester, from_url: bool) -> SearchResult {
    let mut playlist_name = None;
    let mut tracks = Vec::new();

    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        let json: Value = match serde_json::from_str(line) {
            Ok(json) => json,
            Err(e) => {
                warn!("Skipping unparseable yt-dlp line: {}", e);
                continue;
            }
        };
        if playlist_name.is_none() {
            playlist_name = json["playlist_title"]
                .as_str()
                .or_else(|| json["playlist"].as_str())
                .map(str::to_string);
        }
        if let Some(track) = track_from_json(&json, requester) {
            tracks.push(track);
        }
    }

    let kind = match (tracks.len(), from_url, playlist_name) {
        (0, _, _) => SearchKind::Empty,
        (n, true, Some(name)) if n > 1 => SearchKind::Playlist { name },
        (_, true, _) => SearchKind::Track,
        (_, false, _) => SearchKind::Search,
    };

    SearchResult { kind, tracks }
}

/// Extracts one track from a `yt-dlp` JSON object. Entries without a usable URL are dropped.
fn track_from_json(json: &Value, requester: &Requester) -> Option<Track> {
    let uri = json["webpage_url"]
        .as_str()
        .or_else(|| json["url"].as_str())
        .filter(|uri| AudioSource::is_url(uri))?
        .to_string();

    let title = json["title"].as_str().unwrap_or("Unknown title").to_string();
    let author = ["uploader", "channel", "artist", "creator"]
        .iter()
        .find_map(|key| json[*key].as_str())
        .unwrap_or("Unknown artist")
        .to_string();
    let duration_ms = json["duration"]
        .as_f64()
        .map(|secs| (secs.max(0.0) * 1000.0).round() as u64)
        .unwrap_or_default();
    let artwork_url = json["thumbnail"].as_str().map(str::to_string).or_else(|| {
        json["thumbnails"]
            .as_array()
            .and_then(|thumbs| thumbs.last())
            .and_then(|thumb| thumb["url"].as_str())
            .map(str::to_string)
    });
    let source_name = json["extractor_key"]
        .as_str()
        .or_else(|| json["ie_key"].as_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "unknown".to_string());

    Some(Track {
        title,
        author,
        uri,
        duration_ms,
        artwork_url,
        source_name,
        requester: requester.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    const FLAT_ENTRY: &str = r#"{"_type":"url","ie_key":"Youtube","id":"abc","url":"https://www.youtube.com/watch?v=abc","title":"First","duration":201.0,"channel":"Band","thumbnails":[{"url":"https://i.ytimg.com/small.jpg"},{"url":"https://i.ytimg.com/big.jpg"}]}"#;
    const FULL_ENTRY: &str = r#"{"id":"xyz","webpage_url":"https://www.youtube.com/watch?v=xyz","title":"Second","duration":59.4,"uploader":"Singer","thumbnail":"https://i.ytimg.com/xyz.jpg","extractor_key":"Youtube"}"#;

    #[test]
    fn parses_flat_search_entries() {
        let requester = Requester::new("1", "alice");
        let result = parse_search_output(FLAT_ENTRY, &requester, false);

        assert_eq!(result.kind, SearchKind::Search);
        let track = &result.tracks[0];
        assert_eq!(track.uri, "https://www.youtube.com/watch?v=abc");
        assert_eq!(track.author, "Band");
        assert_eq!(track.duration_ms, 201_000);
        assert_eq!(track.artwork_url.as_deref(), Some("https://i.ytimg.com/big.jpg"));
        assert_eq!(track.source_name, "youtube");
        assert_eq!(track.requester, requester);
    }

    #[test]
    fn single_url_resolves_to_track() {
        let result = parse_search_output(FULL_ENTRY, &Requester::new("1", "a"), true);
        assert_eq!(result.kind, SearchKind::Track);
        assert_eq!(result.tracks[0].duration_ms, 59_400);
        assert_eq!(result.tracks[0].author, "Singer");
    }

    #[test]
    fn playlist_urls_keep_every_entry() {
        let with_playlist = |line: &str| line.replacen('{', r#"{"playlist_title":"Mix","#, 1);
        let stdout = format!("{}\n{}\n", with_playlist(FLAT_ENTRY), with_playlist(FULL_ENTRY));

        let result = parse_search_output(&stdout, &Requester::new("1", "a"), true);
        assert_matches!(result.kind, SearchKind::Playlist { ref name } if name == "Mix");
        assert_eq!(result.tracks.len(), 2);
    }

    #[test]
    fn garbage_and_url_less_lines_are_skipped() {
        let stdout = "not json\n{\"title\":\"no url\"}\n";
        let result = parse_search_output(stdout, &Requester::new("1", "a"), false);
        assert_eq!(result.kind, SearchKind::Empty);
        assert!(result.is_empty());
    }

    #[test]
    fn free_text_queries_use_ytsearch() {
        let search = YtDlpSearch::new("yt-dlp", 5);
        assert_eq!(search.target_for(" lofi beats "), "ytsearch5:lofi beats");
        assert_eq!(
            search.target_for("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
    }
}
