use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SyncError};
use crate::state::{DisplayState, FormattingInput, FormattingOptions};
use crate::timer::{TimerAction, TimerCommand, TimerSnapshot};

/// Full state handed to a newly joined channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub passport_text: String,
    pub prize_text: String,
    pub formatting: FormattingOptions,
    pub logo_path: String,
    pub timer: TimerSnapshot,
}

impl InitPayload {
    pub fn new(state: &DisplayState, timer: TimerSnapshot) -> Self {
        Self {
            passport_text: state.text.clone(),
            prize_text: state.prize_text.clone(),
            formatting: state.formatting.clone(),
            logo_path: state.logo_path.clone(),
            timer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportPayload {
    pub passport_text: String,
    pub prize_text: String,
    pub formatting: FormattingOptions,
}

impl From<&DisplayState> for PassportPayload {
    fn from(state: &DisplayState) -> Self {
        Self {
            passport_text: state.text.clone(),
            prize_text: state.prize_text.clone(),
            formatting: state.formatting.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoPayload {
    pub logo_path: String,
}

/// Events pushed from the server to display clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Sent once, to the joining channel only
    Init(InitPayload),

    PassportUpdate(PassportPayload),

    /// Empty `logoPath` removes the logo
    LogoUpdate(LogoPayload),

    TimerAction(TimerAction),

    /// Rejection of an inbound message, sent only to its sender
    Error { message: String },
}

impl SyncEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Init(_) => "init",
            SyncEvent::PassportUpdate(_) => "passport_update",
            SyncEvent::LogoUpdate(_) => "logo_update",
            SyncEvent::TimerAction(_) => "timer_action",
            SyncEvent::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a server event; undecodable text is a `Serialization` error
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// New passport text pushed by the admin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUpdate {
    #[serde(default, alias = "passportText", deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, alias = "prizeText", deserialize_with = "null_as_default")]
    pub prize: String,
    #[serde(default)]
    pub formatting: Option<FormattingInput>,
}

impl TextUpdate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_prize(mut self, prize: impl Into<String>) -> Self {
        self.prize = prize.into();
        self
    }

    pub fn with_formatting(mut self, formatting: FormattingInput) -> Self {
        self.formatting = Some(formatting);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoUpdate {
    #[serde(default, alias = "logo_path", deserialize_with = "null_as_default")]
    pub logo_path: String,
}

/// Messages an admin connection may send over the push channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminCommand {
    PassportUpdate(TextUpdate),
    LogoUpdate(LogoUpdate),
    TimerAction(TimerCommand),
}

impl AdminCommand {
    /// Parse an inbound message; anything structurally wrong is an
    /// `InvalidRequest` rather than a transport error
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidRequest(e.to_string()))
    }
}
