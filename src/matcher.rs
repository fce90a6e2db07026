//! Resolving one local track to one catalog entry.
//!
//! Title search is noisy, so the filter is a loose OR over album, exact
//! duration and artist membership. When nothing survives, a second search
//! drops any parenthesised suffix from the title ("(Remastered)", "(Live)")
//! and adds the artist. Ties go to the first explicit candidate, then to the
//! first one in search order.
use crate::api::CatalogSearch;
use crate::models::{CatalogTrack, LocalTrack, RemoteCandidate};
use anyhow::Result;
use log::{debug, info, warn};

pub struct TrackMatcher<'a, C: CatalogSearch + ?Sized> {
    catalog: &'a C,
    search_limit: u32,
}

/// True when the hit agrees with the local track on album, duration or artist.
pub fn is_plausible(local: &LocalTrack, hit: &CatalogTrack) -> bool {
    let album_match = hit.album == local.album;
    let duration_match = hit.duration_ms == local.duration_ms;
    let artist_match = hit.artists.iter().any(|a| *a == local.artist);
    album_match || duration_match || artist_match
}

/// Query for the second pass: title up to the first '(' plus the artist.
pub fn fallback_query(local: &LocalTrack) -> String {
    let base = match local.title.find('(') {
        Some(i) => &local.title[..i],
        None => local.title.as_str(),
    };
    format!("{} {}", base.trim(), local.artist)
}

/// Pick one candidate out of the filtered list.
pub fn disambiguate(mut candidates: Vec<RemoteCandidate>) -> Option<RemoteCandidate> {
    if candidates.len() > 1 {
        if let Some(pos) = candidates.iter().position(|c| c.track.explicit) {
            return Some(candidates.swap_remove(pos));
        }
    }
    candidates.into_iter().next()
}

impl<'a, C: CatalogSearch + ?Sized> TrackMatcher<'a, C> {
    pub fn new(catalog: &'a C, search_limit: u32) -> Self {
        Self { catalog, search_limit }
    }

    async fn search_filtered(&self, local: &LocalTrack, query: &str) -> Result<Vec<RemoteCandidate>> {
        let hits = self.catalog.search(query, self.search_limit).await?;
        debug!(
            "Looking for {}, {}, {}, {} ({} hits)",
            query,
            local.artist,
            local.album,
            local.duration_ms,
            hits.len()
        );
        Ok(hits
            .into_iter()
            .filter(|h| is_plausible(local, h))
            .map(|h| RemoteCandidate::new(h, local))
            .collect())
    }

    async fn try_match(&self, local: &LocalTrack) -> Result<Option<RemoteCandidate>> {
        let mut candidates = self.search_filtered(local, &local.title).await?;

        if candidates.is_empty() {
            let reduced = fallback_query(local);
            if reduced != local.title {
                info!("Found no matching tracks, trying again with {}", reduced);
                candidates = self.search_filtered(local, &reduced).await?;
            }
        }

        if candidates.len() > 1 {
            info!(
                "Multiple matches ({}) found for {}, searching for explicit one",
                candidates.len(),
                local.title
            );
        }
        Ok(disambiguate(candidates))
    }

    /// Resolve one track. Search errors are logged and reported as no match
    /// so a single bad track never stops the run.
    pub async fn find_match(&self, local: &LocalTrack) -> Option<RemoteCandidate> {
        match self.try_match(local).await {
            Ok(Some(c)) => {
                debug!("Matched {} -> {}", local.title, c.uri());
                Some(c)
            }
            Ok(None) => {
                info!("No match for {} by {}", local.title, local.artist);
                None
            }
            Err(e) => {
                warn!("Failed to search for track {}: {:#}", local.title, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockProvider;

    fn local(title: &str, artist: &str, album: &str, duration_ms: u64) -> LocalTrack {
        LocalTrack {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            duration_ms,
            playlist_index: 0,
        }
    }

    fn hit(uri: &str, artists: &[&str], album: &str, duration_ms: u64, explicit: bool) -> CatalogTrack {
        CatalogTrack {
            title: "whatever".into(),
            album: album.into(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            explicit,
            duration_ms,
            uri: uri.into(),
        }
    }

    #[test]
    fn filter_is_a_loose_or() {
        let t = local("Song", "Band", "Album", 200_000);
        assert!(is_plausible(&t, &hit("a", &["Other"], "Album", 1, false)));
        assert!(is_plausible(&t, &hit("b", &["Other"], "X", 200_000, false)));
        assert!(is_plausible(&t, &hit("c", &["Guest", "Band"], "X", 1, false)));
        assert!(!is_plausible(&t, &hit("d", &["band"], "album", 1, false)));
    }

    #[test]
    fn fallback_query_truncates_at_first_paren() {
        assert_eq!(fallback_query(&local("Song (Live) (2001)", "Band", "", 0)), "Song Band");
        assert_eq!(fallback_query(&local("Plain", "Band", "", 0)), "Plain Band");
        assert_eq!(fallback_query(&local("(Intro)", "Band", "", 0)), " Band");
    }

    #[tokio::test]
    async fn explicit_candidate_wins_tie() {
        let p = MockProvider::new();
        let t = local("Song", "Band", "Album", 1);
        p.set_search_results(
            "Song",
            vec![
                hit("A", &["Band"], "x", 0, false),
                hit("B", &["Band"], "x", 0, true),
                hit("C", &["Band"], "x", 0, false),
            ],
        );
        let m = TrackMatcher::new(&p, 20).find_match(&t).await.unwrap();
        assert_eq!(m.uri(), "B");
        assert_eq!(m.local, t);
    }

    #[tokio::test]
    async fn first_candidate_when_none_explicit() {
        let p = MockProvider::new();
        let t = local("Song", "Band", "Album", 1);
        p.set_search_results(
            "Song",
            vec![
                hit("skip", &["Nobody"], "x", 0, true),
                hit("A", &["Band"], "x", 0, false),
                hit("B", &["Band"], "x", 0, false),
            ],
        );
        let m = TrackMatcher::new(&p, 20).find_match(&t).await.unwrap();
        assert_eq!(m.uri(), "A");
    }

    #[tokio::test]
    async fn fallback_not_issued_when_primary_matches() {
        let p = MockProvider::new();
        let t = local("Song (Live)", "Band", "Album", 1);
        p.set_search_results("Song (Live)", vec![hit("A", &["Band"], "x", 0, false)]);
        p.set_search_results("Song Band", vec![hit("Z", &["Band"], "x", 0, true)]);
        let m = TrackMatcher::new(&p, 20).find_match(&t).await.unwrap();
        assert_eq!(m.uri(), "A");
        assert_eq!(p.search_calls(), vec!["Song (Live)".to_string()]);
    }

    #[tokio::test]
    async fn fallback_finds_live_version() {
        let p = MockProvider::new();
        let t = local("Song (Live)", "Band", "Album", 200_000);
        p.set_search_results(
            "Song (Live)",
            vec![hit("noise", &["Someone"], "Other", 123, false)],
        );
        p.set_search_results("Song Band", vec![hit("live", &["Band"], "Live Album", 201_000, false)]);
        let m = TrackMatcher::new(&p, 20).find_match(&t).await.unwrap();
        assert_eq!(m.uri(), "live");
        assert_eq!(
            p.search_calls(),
            vec!["Song (Live)".to_string(), "Song Band".to_string()]
        );
    }

    #[tokio::test]
    async fn search_error_is_unmatched() {
        let p = MockProvider::new();
        p.fail_search("Broken");
        let t = local("Broken", "Band", "Album", 1);
        assert!(TrackMatcher::new(&p, 20).find_match(&t).await.is_none());
    }

    #[tokio::test]
    async fn same_input_same_output() {
        let p = MockProvider::new();
        let t = local("Song", "Band", "Album", 1);
        p.set_search_results(
            "Song",
            vec![hit("A", &["Band"], "x", 0, false), hit("B", &["Band"], "x", 0, true)],
        );
        let m = TrackMatcher::new(&p, 20);
        let first = m.find_match(&t).await;
        let second = m.find_match(&t).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn nothing_after_both_passes() {
        let p = MockProvider::new();
        let t = local("Ghost", "Band", "Album", 1);
        assert!(TrackMatcher::new(&p, 20).find_match(&t).await.is_none());
        assert_eq!(p.search_calls().len(), 2);
    }

    #[tokio::test]
    async fn fallback_skipped_when_query_would_repeat() {
        let p = MockProvider::new();
        // "Song" + " " + "(Live)" rebuilds the title exactly
        let t = local("Song (Live)", "(Live)", "Album", 1);
        assert_eq!(fallback_query(&t), t.title);
        assert!(TrackMatcher::new(&p, 20).find_match(&t).await.is_none());
        assert_eq!(p.search_calls(), vec!["Song (Live)".to_string()]);
        // a title that is not rebuilt still gets the second pass
        let p = MockProvider::new();
        let t = local("Song Band", "Band", "Album", 1);
        assert!(TrackMatcher::new(&p, 20).find_match(&t).await.is_none());
        assert_eq!(p.search_calls(), vec!["Song Band".to_string(), "Song Band Band".to_string()]);
    }
}
