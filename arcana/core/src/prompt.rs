//! Reading Prompts
//!
//! Deterministic text sent to the generation service: the interpretation
//! prompt for a completed spread, and the system instruction plus seed
//! exchange that prime the follow-up chat.

use crate::deck::CardInstance;
use crate::language::Language;
use crate::selection::{Position, SpreadMode};

/// Build the interpretation prompt for a completed spread
///
/// `selections` are the revealed cards in click order. Single mode asks for
/// the card's meaning across love, career and general fortune; three-card mode
/// names every card by position and asks for a reading structured as past,
/// present, future and overall advice.
#[must_use]
pub fn build_interpretation_prompt(
    language: Language,
    mode: SpreadMode,
    selections: &[&CardInstance],
) -> String {
    match mode {
        SpreadMode::Single => {
            let name = selections.first().map_or("", |c| c.name());
            match language {
                Language::TraditionalChinese => format!(
                    "請用中文詳細解釋塔羅牌「{name}」的牌義，包括它在愛情、事業和整體運勢方面的指引。請提供豐富且具有洞察力的解讀。"
                ),
                Language::English => format!(
                    "Please explain in detail the meaning of the tarot card \"{name}\", including its guidance on love, career and overall fortune. Offer a rich and insightful interpretation in English."
                ),
            }
        }
        SpreadMode::ThreeCard => {
            let past = card_at(selections, Position::Past);
            let present = card_at(selections, Position::Present);
            let future = card_at(selections, Position::Future);
            match language {
                Language::TraditionalChinese => format!(
                    "我正在進行一個三張牌的塔羅占卜。\n\
                     第一張牌代表「過去」，抽到的是「{past}」。\n\
                     第二張牌代表「現在」，抽到的是「{present}」。\n\
                     第三張牌代表「未來」，抽到的是「{future}」。\n\
                     請結合這三張牌的牌義以及它們在「過去」、「現在」、「未來」位置上的意義，提供一個連貫且深入的中文解讀，分析整體情況的發展趨勢，並給出指引。請將解讀分為過去、現在、未來和綜合建議幾個部分，使其條理清晰。"
                ),
                Language::English => format!(
                    "I am doing a three-card tarot reading.\n\
                     The first card represents the past: \"{past}\".\n\
                     The second card represents the present: \"{present}\".\n\
                     The third card represents the future: \"{future}\".\n\
                     Combine the meanings of these three cards with their past, present and future positions into one coherent, in-depth reading in English. Analyse how the situation is developing and offer guidance. Structure the reading into past, present, future and overall advice sections, followed by a short summary."
                ),
            }
        }
    }
}

fn card_at<'a>(selections: &[&'a CardInstance], position: Position) -> &'a str {
    selections
        .iter()
        .find(|c| c.position() == Some(position))
        .map_or("", |c| c.name())
}

/// Comma-joined `name (position)` list; the position is omitted when unset
#[must_use]
pub fn card_details(language: Language, selections: &[&CardInstance]) -> String {
    selections
        .iter()
        .map(|card| match card.position() {
            Some(position) => format!("{} ({})", card.name(), language.position_label(position)),
            None => card.name().to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// System instruction for the follow-up chat
///
/// Embeds the spread label, the card details and the interpretation verbatim.
#[must_use]
pub fn build_system_instruction(
    language: Language,
    mode: SpreadMode,
    details: &str,
    interpretation: &str,
) -> String {
    let spread = language.spread_label(mode);
    match language {
        Language::TraditionalChinese => format!(
            "你是一位知識淵博的塔羅牌解讀師。使用者剛剛透過一個「{spread}」牌陣進行了占卜。抽到的牌及其對應位置（如果適用）如下： {details}。 你提供的初步解讀是： “{interpretation}”。現在，請針對使用者關於此次占卜的任何追問，提供進一步的澄清、深入分析或相關建議。請保持解讀風格一致，並專注於已抽出的牌和它們的意義。回答時請使用中文。"
        ),
        Language::English => format!(
            "You are a knowledgeable tarot reader. The user has just done a \"{spread}\" spread. The cards drawn, with their positions where applicable, are: {details}. Your initial interpretation was: \"{interpretation}\". Now answer any follow-up questions the user has about this reading with further clarification, deeper analysis or relevant advice. Keep the same interpretive style and stay focused on the drawn cards and their meanings. Answer in English."
        ),
    }
}

/// Synthetic user turn that opens the chat history
#[must_use]
pub fn seed_user_message(language: Language, details: &str) -> String {
    match language {
        Language::TraditionalChinese => format!("我抽到的牌是 {details}，請解讀。"),
        Language::English => format!("I drew the cards {details}, please interpret."),
    }
}
