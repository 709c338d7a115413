use crate::error::AppError;
use serde::Serialize;

/// Namespace prefix of button payloads: `np:{action}:{guild_id}`
pub const BUTTON_NAMESPACE: &str = "np";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play { query: String },
    Pause,
    Resume,
    Skip,
    Stop,
    Leave,
    Toggle,
}

impl PlaybackCommand {
    /// Decode a slash command by name and positional arguments.
    pub fn from_slash(name: &str, args: &[String]) -> Result<Self, AppError> {
        let command = match (name, args) {
            ("play", [query]) if !query.trim().is_empty() => PlaybackCommand::Play {
                query: query.trim().to_string(),
            },
            ("play", _) => {
                return Err(AppError::InvalidCommandPayload(
                    "play expects exactly one non-empty query".to_string(),
                ));
            }
            ("pause", []) => PlaybackCommand::Pause,
            ("resume", []) => PlaybackCommand::Resume,
            ("skip", []) => PlaybackCommand::Skip,
            ("stop", []) => PlaybackCommand::Stop,
            ("leave", []) => PlaybackCommand::Leave,
            ("pause" | "resume" | "skip" | "stop" | "leave", _) => {
                return Err(AppError::InvalidCommandPayload(format!(
                    "{} takes no arguments",
                    name
                )));
            }
            _ => {
                return Err(AppError::InvalidCommandPayload(format!(
                    "Unknown command: {}",
                    name
                )));
            }
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackCommand::Play { .. } => "play",
            PlaybackCommand::Pause => "pause",
            PlaybackCommand::Resume => "resume",
            PlaybackCommand::Skip => "skip",
            PlaybackCommand::Stop => "stop",
            PlaybackCommand::Leave => "leave",
            PlaybackCommand::Toggle => "toggle",
        }
    }
}

/// Decoded `np:{action}:{guild_id}` button payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonPayload {
    pub command: PlaybackCommand,
    pub guild_id: u64,
}

impl ButtonPayload {
    pub fn parse(custom_id: &str) -> Result<Self, AppError> {
        let parts: Vec<&str> = custom_id.split(':').collect();
        let [namespace, action, guild_id] = parts.as_slice() else {
            return Err(AppError::InvalidCommandPayload(custom_id.to_string()));
        };

        if *namespace != BUTTON_NAMESPACE {
            return Err(AppError::InvalidCommandPayload(custom_id.to_string()));
        }

        let command = match *action {
            "toggle" => PlaybackCommand::Toggle,
            "skip" => PlaybackCommand::Skip,
            "stop" => PlaybackCommand::Stop,
            _ => return Err(AppError::InvalidCommandPayload(custom_id.to_string())),
        };

        let guild_id = guild_id
            .parse::<u64>()
            .map_err(|_| AppError::InvalidCommandPayload(custom_id.to_string()))?;

        Ok(Self { command, guild_id })
    }

    pub fn encode(action: &str, guild_id: u64) -> String {
        format!("{}:{}:{}", BUTTON_NAMESPACE, action, guild_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
}

/// A button rendered under a now-playing reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonComponent {
    pub label: &'static str,
    pub custom_id: String,
    pub style: ButtonStyle,
}

/// Pause/Resume, Skip and Stop controls bound to `guild_id`.
pub fn now_playing_controls(guild_id: u64) -> Vec<ButtonComponent> {
    [
        ("Pause/Resume", "toggle", ButtonStyle::Primary),
        ("Skip", "skip", ButtonStyle::Secondary),
        ("Stop", "stop", ButtonStyle::Danger),
    ]
    .into_iter()
    .map(|(label, action, style)| ButtonComponent {
        label,
        custom_id: ButtonPayload::encode(action, guild_id),
        style,
    })
    .collect()
}

/// A decoded command together with who issued it and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Guild the interaction was delivered in
    pub guild_id: u64,
    pub command: PlaybackCommand,
    pub actor_id: u64,
    pub actor_voice_channel: Option<u64>,
    /// Guild named inside a button payload
    pub embedded_guild_id: Option<u64>,
}

impl CommandRequest {
    pub fn slash(
        guild_id: u64,
        actor_id: u64,
        actor_voice_channel: Option<u64>,
        command: PlaybackCommand,
    ) -> Self {
        Self {
            guild_id,
            command,
            actor_id,
            actor_voice_channel,
            embedded_guild_id: None,
        }
    }

    pub fn button(
        guild_id: u64,
        actor_id: u64,
        actor_voice_channel: Option<u64>,
        custom_id: &str,
    ) -> Result<Self, AppError> {
        let payload = ButtonPayload::parse(custom_id)?;
        Ok(Self {
            guild_id,
            command: payload.command,
            actor_id,
            actor_voice_channel,
            embedded_guild_id: Some(payload.guild_id),
        })
    }

    /// Button payloads may only act on the guild they were rendered for.
    pub fn check_guild(&self) -> Result<(), AppError> {
        match self.embedded_guild_id {
            Some(embedded) if embedded != self.guild_id => Err(AppError::WrongGuild),
            _ => Ok(()),
        }
    }
}
