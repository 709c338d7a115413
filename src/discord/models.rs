use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Discord channel type for guild voice channels.
pub const CHANNEL_TYPE_GUILD_VOICE: u8 = 2;

/// Response of `GET /users/@me`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Partial guild as returned by `GET /users/@me/guilds`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscordGuild {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub owner: bool,
    /// Permission bitset, serialized by Discord as a decimal string
    #[serde(default)]
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscordChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: u8,
}

/// A guild shared by the user and the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildSummary {
    pub id: String,
    pub name: String,
    pub icon_url: Option<String>,
    pub owner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceChannelSummary {
    pub id: String,
    pub name: String,
}

/// Total order over snowflake ids.
///
/// Numeric ids compare by value; anything else falls back to length then
/// lexicographic order, which matches numeric order for unpadded digits.
pub fn snowflake_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}

/// Case-insensitive name comparison with id as the tie breaker.
pub fn name_then_id_cmp(a_name: &str, a_id: &str, b_name: &str, b_id: &str) -> Ordering {
    let a_folded = a_name.to_lowercase();
    let b_folded = b_name.to_lowercase();

    a_folded
        .cmp(&b_folded)
        .then_with(|| snowflake_cmp(a_id, b_id))
        .then_with(|| a_name.cmp(b_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_ascii_names_sort_by_code_point() {
        // Accented initials fold case but sort after every ASCII letter
        assert_eq!(name_then_id_cmp("Émile", "1", "zebra", "2"), Ordering::Greater);
        assert_eq!(name_then_id_cmp("éclair", "1", "Zed", "2"), Ordering::Greater);
        assert_eq!(name_then_id_cmp("Éclair", "9", "éclair", "10"), Ordering::Less);
    }

    #[test]
    fn test_snowflake_cmp_numeric() {
        assert_eq!(snowflake_cmp("9", "10"), Ordering::Less);
        assert_eq!(snowflake_cmp("783190942806835200", "783190942806835200"), Ordering::Equal);
    }

    #[test]
    fn test_name_then_id_case_insensitive() {
        assert_eq!(name_then_id_cmp("alpha", "2", "Beta", "1"), Ordering::Less);
        assert_eq!(name_then_id_cmp("Same", "10", "same", "9"), Ordering::Greater);
    }

    #[test]
    fn test_deserialize_guild_defaults() {
        let json = r#"{"id": "42", "name": "Guild"}"#;
        let guild: DiscordGuild = serde_json::from_str(json).unwrap();

        assert_eq!(guild.id, "42");
        assert!(guild.icon.is_none());
        assert!(!guild.owner);
    }

    #[test]
    fn test_deserialize_channel_type() {
        let json = r#"{"id": "1", "name": "General", "type": 2}"#;
        let channel: DiscordChannel = serde_json::from_str(json).unwrap();
        assert_eq!(channel.kind, CHANNEL_TYPE_GUILD_VOICE);
    }
}
