/// Peer selection (spec.md C8): picks which peer a shard should go to or
/// come from, using Kademlia's closest-peers ordering as the only source
/// of ranking — no reputation, latency, or capacity scoring (Non-goal).
use std::collections::HashSet;

use libp2p::PeerId;

/// Abstraction over `kad::Behaviour::get_closest_peers` so the selection
/// logic can be unit-tested without a live swarm.
#[async_trait::async_trait]
pub trait NearestPeers {
    async fn closest_peers(&self, key: &[u8]) -> Vec<PeerId>;
}

/// Picks the nearest peer to `key` that isn't in `filtered` (already
/// holding this shard, or excluded for this attempt after a prior failure).
pub async fn select_peer<P: NearestPeers + ?Sized>(
    source: &P,
    key: &[u8],
    filtered: &HashSet<PeerId>,
) -> Option<PeerId> {
    source
        .closest_peers(key)
        .await
        .into_iter()
        .find(|peer| !filtered.contains(peer))
}

/// Picks up to `count` distinct nearest peers to `key`, skipping `filtered`.
pub async fn select_peers<P: NearestPeers + ?Sized>(
    source: &P,
    key: &[u8],
    filtered: &HashSet<PeerId>,
    count: usize,
) -> Vec<PeerId> {
    source
        .closest_peers(key)
        .await
        .into_iter()
        .filter(|peer| !filtered.contains(peer))
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPeers(Vec<PeerId>);

    #[async_trait::async_trait]
    impl NearestPeers for FixedPeers {
        async fn closest_peers(&self, _key: &[u8]) -> Vec<PeerId> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn select_peer_skips_filtered_peers() {
        let a = PeerId::random();
        let b = PeerId::random();
        let c = PeerId::random();
        let source = FixedPeers(vec![a, b, c]);

        let mut filtered = HashSet::new();
        filtered.insert(a);

        let chosen = select_peer(&source, b"key", &filtered).await;
        assert_eq!(chosen, Some(b));
    }

    #[tokio::test]
    async fn select_peer_returns_none_when_all_filtered() {
        let a = PeerId::random();
        let source = FixedPeers(vec![a]);
        let mut filtered = HashSet::new();
        filtered.insert(a);

        assert_eq!(select_peer(&source, b"key", &filtered).await, None);
    }

    #[tokio::test]
    async fn select_peers_returns_up_to_count_distinct_peers() {
        let a = PeerId::random();
        let b = PeerId::random();
        let c = PeerId::random();
        let source = FixedPeers(vec![a, b, c]);

        let chosen = select_peers(&source, b"key", &HashSet::new(), 2).await;
        assert_eq!(chosen.len(), 2);
        assert_eq!(chosen[0], a);
        assert_eq!(chosen[1], b);
    }
}
