//! Display state model and formatting defaults

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COLOR: &str = "#FFFFFF";
pub const DEFAULT_DISPLAY_TEXT_SIZE: u32 = 72;
pub const DEFAULT_TIMER_SIZE: u32 = 48;
pub const DEFAULT_PRIZE_SIZE: u32 = 32;
pub const MIN_COLUMNS: u8 = 1;
pub const MAX_COLUMNS: u8 = 3;

/// Weight applied to the main display text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStyle {
    #[default]
    Bold,
    Normal,
}

impl TextStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextStyle::Bold => "bold",
            TextStyle::Normal => "normal",
        }
    }

    /// Case-insensitive parse; unknown names yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bold" => Some(TextStyle::Bold),
            "normal" => Some(TextStyle::Normal),
            _ => None,
        }
    }
}

impl std::fmt::Display for TextStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved formatting, every field populated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingOptions {
    pub color: String,
    pub style: TextStyle,
    #[serde(rename = "displayTextSize")]
    pub base_text_size_px: u32,
    #[serde(rename = "timerSize")]
    pub timer_size_px: u32,
    pub columns: u8,
    #[serde(rename = "prizeSize")]
    pub prize_size_px: u32,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            style: TextStyle::Bold,
            base_text_size_px: DEFAULT_DISPLAY_TEXT_SIZE,
            timer_size_px: DEFAULT_TIMER_SIZE,
            columns: MIN_COLUMNS,
            prize_size_px: DEFAULT_PRIZE_SIZE,
        }
    }
}

/// Formatting as sent by the admin: any field may be missing or null.
///
/// Accepts both the admin page's names (`displayTextSize`) and the longer
/// `...Px` spellings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(
        default,
        rename = "displayTextSize",
        alias = "baseTextSizePx",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_text_size: Option<i64>,
    #[serde(
        default,
        rename = "timerSize",
        alias = "timerSizePx",
        skip_serializing_if = "Option::is_none"
    )]
    pub timer_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<i64>,
    #[serde(
        default,
        rename = "prizeSize",
        alias = "prizeSizePx",
        skip_serializing_if = "Option::is_none"
    )]
    pub prize_size: Option<i64>,
}

impl FormattingInput {
    /// Build complete formatting, substituting defaults for anything missing
    /// or unusable. Never merges with previously stored formatting.
    pub fn resolve(&self) -> FormattingOptions {
        let defaults = FormattingOptions::default();

        let color = match self.color.as_deref() {
            Some(raw) => normalize_color(raw).unwrap_or_else(|| {
                tracing::warn!("Ignoring invalid color {:?}, using {}", raw, DEFAULT_COLOR);
                defaults.color.clone()
            }),
            None => defaults.color.clone(),
        };

        let style = self
            .style
            .as_deref()
            .and_then(TextStyle::parse)
            .unwrap_or(defaults.style);

        let columns = self
            .columns
            .map(|c| c.clamp(i64::from(MIN_COLUMNS), i64::from(MAX_COLUMNS)) as u8)
            .unwrap_or(defaults.columns);

        FormattingOptions {
            color,
            style,
            base_text_size_px: non_zero_or(self.display_text_size, defaults.base_text_size_px),
            timer_size_px: non_zero_or(self.timer_size, defaults.timer_size_px),
            columns,
            prize_size_px: non_zero_or(self.prize_size, defaults.prize_size_px),
        }
    }
}

/// Positive sizes pass through; zero, negative or oversized values take the default
fn non_zero_or(value: Option<i64>, default: u32) -> u32 {
    value
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}

/// Normalize `#RGB` / `#RRGGBB` (leading `#` optional) to uppercase `#RRGGBB` or `#RGB`
pub fn normalize_color(raw: &str) -> Option<String> {
    let hex = raw.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);

    if !matches!(hex.len(), 3 | 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(format!("#{}", hex.to_ascii_uppercase()))
}

/// The single display state shown on every screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    pub text: String,
    pub prize_text: String,
    pub formatting: FormattingOptions,
    /// Empty string means "no logo"
    pub logo_path: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            text: String::new(),
            prize_text: String::new(),
            formatting: FormattingOptions::default(),
            logo_path: String::new(),
            updated_at: None,
        }
    }
}

impl DisplayState {
    pub fn has_logo(&self) -> bool {
        !self.logo_path.is_empty()
    }
}
