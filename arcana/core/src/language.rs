//! Working Language
//!
//! Every reading runs in one working language. It decides the card names, the
//! position labels, the surface instructions, the prompts sent to the
//! generation service and the keywords the formatter emphasizes.
//!
//! Traditional Chinese is the default; English is the alternative.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::selection::{Position, SpreadMode};

/// Working language of a reading session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Traditional Chinese (繁體中文)
    #[default]
    #[serde(rename = "zh-Hant")]
    TraditionalChinese,
    /// English
    #[serde(rename = "en")]
    English,
}

impl Language {
    /// Short language tag (`zh-Hant`, `en`)
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::TraditionalChinese => "zh-Hant",
            Self::English => "en",
        }
    }

    /// Label for a position in the three-card spread
    #[must_use]
    pub fn position_label(self, position: Position) -> &'static str {
        match (self, position) {
            (Self::TraditionalChinese, Position::Past) => "過去",
            (Self::TraditionalChinese, Position::Present) => "現在",
            (Self::TraditionalChinese, Position::Future) => "未來",
            (Self::English, Position::Past) => "past",
            (Self::English, Position::Present) => "present",
            (Self::English, Position::Future) => "future",
        }
    }

    /// Human-readable spread label, as shown by the mode selector
    #[must_use]
    pub fn spread_label(self, mode: SpreadMode) -> &'static str {
        match (self, mode) {
            (Self::TraditionalChinese, SpreadMode::Single) => "單張牌占卜",
            (Self::TraditionalChinese, SpreadMode::ThreeCard) => "三張牌占卜 (過去、現在、未來)",
            (Self::English, SpreadMode::Single) => "Single card reading",
            (Self::English, SpreadMode::ThreeCard) => "Three card reading (past, present, future)",
        }
    }

    /// Instruction shown when a session starts
    #[must_use]
    pub fn start_instruction(self, mode: SpreadMode) -> String {
        match (self, mode) {
            (Self::TraditionalChinese, SpreadMode::Single) => {
                "請從下方牌堆中選擇 1 張塔羅牌。".to_string()
            }
            (Self::TraditionalChinese, SpreadMode::ThreeCard) => {
                "請從下方牌堆中選擇 3 張塔羅牌 (依序代表過去、現在、未來)。".to_string()
            }
            (Self::English, SpreadMode::Single) => {
                "Choose 1 tarot card from the deck below.".to_string()
            }
            (Self::English, SpreadMode::ThreeCard) => {
                "Choose 3 tarot cards from the deck below (in order: past, present, future)."
                    .to_string()
            }
        }
    }

    /// Instruction shown while more cards are needed
    #[must_use]
    pub fn remaining_instruction(self, remaining: usize) -> String {
        match self {
            Self::TraditionalChinese => format!("請再選擇 {remaining} 張牌。"),
            Self::English if remaining == 1 => "Choose 1 more card.".to_string(),
            Self::English => format!("Choose {remaining} more cards."),
        }
    }

    /// Instruction shown once the selection is complete
    #[must_use]
    pub fn complete_instruction(self) -> &'static str {
        match self {
            Self::TraditionalChinese => "已選擇完畢！請點擊「獲取解讀」按鈕。",
            Self::English => "Selection complete! Ask for your interpretation.",
        }
    }

    /// Notice for an interpretation request before the selection is complete
    #[must_use]
    pub fn incomplete_selection_notice(self) -> &'static str {
        match self {
            Self::TraditionalChinese => "請先依照指示選擇足夠的卡牌。",
            Self::English => "Please choose enough cards first.",
        }
    }

    /// Status shown while the interpretation is being generated
    #[must_use]
    pub fn interpreting_status(self) -> &'static str {
        match self {
            Self::TraditionalChinese => "正在解讀您選擇的牌義...",
            Self::English => "Interpreting your cards...",
        }
    }

    /// Status shown while a chat reply is being generated
    #[must_use]
    pub fn thinking_status(self) -> &'static str {
        match self {
            Self::TraditionalChinese => "AI 正在思考...",
            Self::English => "The reader is thinking...",
        }
    }

    /// User-visible interpretation failure
    #[must_use]
    pub fn interpretation_failed(self, detail: &str) -> String {
        match self {
            Self::TraditionalChinese => format!("錯誤：{detail}"),
            Self::English => format!("Error: {detail}"),
        }
    }

    /// User-visible chat initialization failure
    #[must_use]
    pub fn chat_init_failed(self) -> &'static str {
        match self {
            Self::TraditionalChinese => "聊天功能初始化失敗，請稍後再試。",
            Self::English => "The follow-up chat could not be started. Please try again later.",
        }
    }

    /// Error chat turn for a failed send
    #[must_use]
    pub fn send_failed(self, detail: &str) -> String {
        match self {
            Self::TraditionalChinese => format!("訊息傳送失敗: {detail}"),
            Self::English => format!("Message failed: {detail}"),
        }
    }

    /// Notice for an over-long chat message
    #[must_use]
    pub fn message_too_long(self, max_chars: usize) -> String {
        match self {
            Self::TraditionalChinese => format!("訊息過長，請勿超過 {max_chars} 個字。"),
            Self::English => format!("Message too long (limit: {max_chars} characters)."),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh-hant" | "zh-tw" | "zh" | "chinese" => Ok(Self::TraditionalChinese),
            "en" | "en-us" | "en-gb" | "english" => Ok(Self::English),
            other => Err(format!("unknown language: {other}")),
        }
    }
}
