use crate::playback::models::PlaybackSnapshot;
use dashmap::DashMap;
use tokio::sync::broadcast;

const SUBSCRIBER_BUFFER: usize = 16;

/// Latest published snapshot per guild.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    snapshots: DashMap<u64, PlaybackSnapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the guild's snapshot wholesale.
    pub fn set(&self, snapshot: PlaybackSnapshot) {
        self.snapshots.insert(snapshot.guild_id, snapshot);
    }

    pub fn get(&self, guild_id: u64) -> Option<PlaybackSnapshot> {
        self.snapshots.get(&guild_id).map(|s| s.clone())
    }
}

/// Name of the broadcast group subscribers of a guild join
pub fn group_name(guild_id: u64) -> String {
    format!("guild:{}", guild_id)
}

/// Fan-out of snapshots to live subscribers, grouped by guild.
///
/// Subscribers only see snapshots published after they joined; there is
/// no replay.
#[derive(Debug, Default)]
pub struct SnapshotHub {
    groups: DashMap<String, broadcast::Sender<PlaybackSnapshot>>,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, guild_id: u64) -> broadcast::Receiver<PlaybackSnapshot> {
        self.groups
            .entry(group_name(guild_id))
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0)
            .subscribe()
    }

    /// Returns the number of subscribers reached.
    pub fn publish(&self, snapshot: &PlaybackSnapshot) -> usize {
        let group = group_name(snapshot.guild_id);
        let Some(sender) = self.groups.get(&group) else {
            return 0;
        };

        match sender.send(snapshot.clone()) {
            Ok(delivered) => delivered,
            Err(_) => {
                drop(sender);
                // Everyone left; drop the group until someone subscribes again
                self.groups
                    .remove_if(&group, |_, sender| sender.receiver_count() == 0);
                0
            }
        }
    }
}
