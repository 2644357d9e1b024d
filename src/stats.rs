use std::collections::HashSet;

use crate::normalize::CanonicalEpisode;
use crate::store::{Listen, PodcastId, StoreData};

/// Totals over a set of episodes, split by listened state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListeningStats {
    pub episodes: usize,
    pub unlistened_episodes: usize,
    pub unlistened_secs: u64,
}

impl ListeningStats {
    /// Count episodes without a matching listen
    pub fn compute<'a>(
        episodes: impl IntoIterator<Item = &'a CanonicalEpisode>,
        listens: impl IntoIterator<Item = &'a Listen>,
    ) -> Self {
        let listened: HashSet<(PodcastId, &str)> = listens
            .into_iter()
            .map(|l| (l.podcast_id, l.guid.as_str()))
            .collect();

        episodes
            .into_iter()
            .fold(Self::default(), |mut stats, episode| {
                stats.episodes += 1;
                if !listened.contains(&(episode.podcast_id, episode.guid.as_str())) {
                    stats.unlistened_episodes += 1;
                    stats.unlistened_secs += episode.duration_secs;
                }
                stats
            })
    }

    /// Stats for one podcast
    pub fn for_podcast(data: &StoreData, podcast_id: PodcastId) -> Self {
        Self::compute(data.episodes_for(podcast_id), data.listens_for(podcast_id))
    }

    /// Stats across every subscribed podcast
    pub fn for_subscriptions(data: &StoreData) -> Self {
        let subscribed: HashSet<PodcastId> = data.subscriptions.iter().copied().collect();
        Self::compute(
            data.episodes
                .iter()
                .filter(|e| subscribed.contains(&e.podcast_id)),
            &data.listens,
        )
    }
}

/// Format seconds as `"1h 5m"`, dropping zero parts.
///
/// Leftover seconds are truncated; anything under a minute is `"0m"`.
pub fn human_seconds(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;

    match (hours, minutes) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{make_episode, make_podcast};
    use chrono::Utc;

    fn listen(podcast_id: PodcastId, guid: &str) -> Listen {
        Listen {
            podcast_id,
            guid: guid.to_string(),
            listened_at: Utc::now(),
        }
    }

    #[test]
    fn human_seconds_omits_zero_parts() {
        assert_eq!(human_seconds(0), "0m");
        assert_eq!(human_seconds(59), "0m");
        assert_eq!(human_seconds(60), "1m");
        assert_eq!(human_seconds(3600), "1h");
        assert_eq!(human_seconds(3900), "1h 5m");
        assert_eq!(human_seconds(3959), "1h 5m");
        assert_eq!(human_seconds(90_000), "25h");
    }

    #[test]
    fn compute_excludes_listened_episodes() {
        let episodes = [
            make_episode(1, "a", 600),
            make_episode(1, "b", 1200),
            make_episode(1, "c", 300),
        ];
        let listens = [listen(1, "b")];

        let stats = ListeningStats::compute(&episodes, &listens);

        assert_eq!(
            stats,
            ListeningStats {
                episodes: 3,
                unlistened_episodes: 2,
                unlistened_secs: 900,
            }
        );
    }

    #[test]
    fn listens_match_on_podcast_and_guid() {
        let episodes = [make_episode(1, "shared", 100), make_episode(2, "shared", 200)];
        let listens = [listen(2, "shared")];

        let stats = ListeningStats::compute(&episodes, &listens);

        assert_eq!(stats.unlistened_episodes, 1);
        assert_eq!(stats.unlistened_secs, 100);
    }

    #[test]
    fn subscription_stats_ignore_unsubscribed_podcasts() {
        let mut data = StoreData::default();
        data.put_podcast(make_podcast(1));
        data.put_podcast(make_podcast(2));
        data.subscribe(1).unwrap();
        data.upsert_episodes(&[
            make_episode(1, "a", 600),
            make_episode(1, "b", 600),
            make_episode(2, "c", 6000),
        ])
        .unwrap();
        data.mark_listened(1, "a", Utc::now()).unwrap();

        assert_eq!(
            ListeningStats::for_subscriptions(&data),
            ListeningStats {
                episodes: 2,
                unlistened_episodes: 1,
                unlistened_secs: 600,
            }
        );
        assert_eq!(ListeningStats::for_podcast(&data, 2).unlistened_secs, 6000);
    }

    #[test]
    fn empty_input_is_zero() {
        let stats = ListeningStats::compute(&Vec::<CanonicalEpisode>::new(), &Vec::<Listen>::new());
        assert_eq!(stats, ListeningStats::default());
    }
}
