//! Turns a `GameView` into a chat message with a reply keyboard, and button
//! presses back into game commands.

use teloxide::utils::html;

use crate::quiz::controller::{GameCommand, GameView, PlayingView};
use crate::quiz::game::OptionMark;
use crate::quiz::score::GameResult;
use crate::quiz::GameMode;

pub const NEXT: &str = "下一題 (Next)";
pub const RETRY: &str = "再試一次 (Retry)";
pub const PLAY_AGAIN: &str = "再玩一次 (Play Again)";
pub const MAIN_MENU: &str = "返回主選單 (Main Menu)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    /// HTML, ready for `ParseMode::Html`.
    pub text: String,
    /// Empty means "remove the keyboard".
    pub keyboard: Vec<Vec<String>>,
}

pub fn render(view: &GameView) -> Screen {
    match view {
        GameView::Menu => Screen {
            text: "<b>注音大師 (Bopomofo Master)</b>\n動態文字遊戲，提升您的注音能力\n\n選擇遊戲模式：".to_string(),
            keyboard: vec![GameMode::ALL.iter().map(|m| m.tag().to_string()).collect()],
        },
        GameView::Loading { mode } => Screen {
            text: format!("{}\n正在為您產生題目... (Generating questions...)", mode),
            keyboard: Vec::new(),
        },
        GameView::Error { .. } => Screen {
            text: "<b>糟糕！載入題目時發生錯誤。</b>\n可能是 API Key 未設定或網路問題。".to_string(),
            keyboard: vec![vec![RETRY.to_string()], vec![MAIN_MENU.to_string()]],
        },
        GameView::Playing(playing) => render_playing(playing),
        GameView::Finished { result, .. } => render_result(result),
    }
}

fn render_playing(playing: &PlayingView) -> Screen {
    let header = format!(
        "{} · 分數: {} · {} / {}",
        playing.mode, playing.score, playing.position, playing.total
    );
    let prompt = format!("<b>{}</b>", html::escape(&playing.prompt));

    if !playing.revealed {
        let options = playing
            .options
            .chunks(2)
            .map(|row| row.iter().map(|o| o.text.clone()).collect::<Vec<_>>())
            .chain(std::iter::once(vec![MAIN_MENU.to_string()]))
            .collect::<Vec<_>>();
        return Screen {
            text: format!(
                "{}\n\n{}\n\n💡 <b>提示：</b>{}",
                header,
                prompt,
                html::escape(&playing.hint)
            ),
            keyboard: options,
        };
    }

    let verdict = if playing.options.iter().any(|o| o.mark == OptionMark::Correct) {
        "✅ 答對了！".to_string()
    } else {
        let answer = playing
            .options
            .iter()
            .find(|o| o.mark == OptionMark::RevealedCorrect)
            .map(|o| html::escape(&o.text))
            .unwrap_or_default();
        format!("❌ 答錯了！正確答案是 <b>{}</b>", answer)
    };
    let options = playing
        .options
        .iter()
        .map(|o| format!("{} {}", mark_symbol(o.mark), html::escape(&o.text)))
        .collect::<Vec<_>>()
        .join("\n");

    Screen {
        text: format!("{}\n\n{}\n\n{}\n\n{}", header, prompt, options, verdict),
        keyboard: vec![vec![NEXT.to_string()], vec![MAIN_MENU.to_string()]],
    }
}

fn render_result(result: &GameResult) -> Screen {
    let mut text = format!(
        "<b>{}</b>\n您的分數： {} / {}（{:.0}%）",
        result.tier.message(),
        result.score,
        result.total,
        result.percentage()
    );
    if result.celebrate {
        text.push_str("\n\n🎉🎉🎉");
    }
    Screen {
        text,
        keyboard: vec![vec![PLAY_AGAIN.to_string(), MAIN_MENU.to_string()]],
    }
}

fn mark_symbol(mark: OptionMark) -> &'static str {
    match mark {
        OptionMark::Neutral => "▫️",
        OptionMark::Correct | OptionMark::RevealedCorrect => "✅",
        OptionMark::IncorrectSelected => "❌",
        OptionMark::Dimmed => "▫️",
    }
}

/// What a button press (or typed text) means given what is on screen.
pub fn parse_input(view: &GameView, text: &str) -> Option<GameCommand> {
    let text = text.trim();
    match text {
        MAIN_MENU => return Some(GameCommand::ReturnToMenu),
        NEXT => return Some(GameCommand::Advance),
        RETRY | PLAY_AGAIN => return Some(GameCommand::Retry),
        _ => {}
    }
    match view {
        GameView::Menu => GameMode::from_tag(text).map(GameCommand::SelectMode),
        GameView::Playing(playing) if !playing.revealed => playing
            .options
            .iter()
            .find(|o| o.text == text)
            .map(|o| GameCommand::SelectAnswer(o.text.clone())),
        _ => None,
    }
}
