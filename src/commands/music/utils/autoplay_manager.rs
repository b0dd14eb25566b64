//! Choosing what autoplay queues once the queue runs dry.

use rand::seq::IndexedRandom;

use crate::commands::music::audio_sources::track_metadata::{Requester, Track};

/// How many of the top search results autoplay picks from.
pub const AUTOPLAY_CANDIDATES: usize = 5;

/// Search phrase used to find something similar to `last`.
pub fn autoplay_query(last: &Track) -> String {
    format!("{} {}", last.author, last.title)
}

/// The first few results that are not the track that just finished.
pub fn autoplay_candidates(last: &Track, results: Vec<Track>) -> Vec<Track> {
    results
        .into_iter()
        .filter(|track| track.uri != last.uri)
        .take(AUTOPLAY_CANDIDATES)
        .collect()
}

/// Picks one candidate uniformly at random and tags it as an autoplay pick.
pub fn pick_autoplay_track(candidates: &[Track]) -> Option<Track> {
    let mut pick = candidates.choose(&mut rand::rng())?.clone();
    pick.requester = Requester::autoplay();
    Some(pick)
}
