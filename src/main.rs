mod config;
mod quiz;
mod screen;

use std::sync::Arc;

use chatgpt::{client::ChatGPT, config::ChatGPTEngine};
use config::{OracleSettings, Settings};
use dotenv::dotenv;
use quiz::controller::{spawn_game, GameHandle, GameView};
use quiz::oracle::{ChatGptOracle, HttpOracle, QuestionOracle};
use screen::Screen;
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup, KeyboardRemove, ParseMode, ReplyMarkup},
};
use tokio::sync::watch;

type GameDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    InGame {
        game: GameHandle,
    },
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting Bopomofo quiz bot...");

    let settings = Settings::from_env()?;

    let oracle: Arc<dyn QuestionOracle> = match settings.oracle {
        OracleSettings::Http { endpoint } => {
            log::info!("Questions come from {}", endpoint);
            Arc::new(HttpOracle::new(endpoint, settings.oracle_timeout)?)
        }
        OracleSettings::ChatGpt { api_key } => {
            log::info!("Questions come from ChatGPT");
            let mut gpt = ChatGPT::new(api_key)?;

            gpt.config.engine = ChatGPTEngine::Gpt35Turbo;
            gpt.config.timeout = settings.oracle_timeout;
            gpt.config.temperature = 0.8;

            Arc::new(ChatGptOracle::new(gpt))
        }
    };

    let bot = Bot::from_env();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, InMemStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(
                move |bot: Bot, dialogue: GameDialogue, msg: Message| {
                    start(oracle.clone(), bot, dialogue, msg)
                },
            ))
            .branch(dptree::case![State::InGame { game }].endpoint(in_game)),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new()])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

const GREETING_TEXT: &str = "你好！我是注音大師。看字選音，或看音選字，一起來練習注音符號吧！";
async fn start(
    oracle: Arc<dyn QuestionOracle>,
    bot: Bot,
    dialogue: GameDialogue,
    msg: Message,
) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;

    let game = spawn_game(oracle);
    spawn_renderer(bot, msg.chat.id, game.subscribe());
    log::info!("New game for chat {}", msg.chat.id);

    dialogue.update(State::InGame { game }).await?;
    Ok(())
}

async fn in_game(bot: Bot, dialogue: GameDialogue, game: GameHandle, msg: Message) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "請點選下方的按鈕").await?;
        return Ok(());
    };

    let view = game.view();
    if text == "/start" {
        if view == GameView::Menu {
            send_screen(&bot, msg.chat.id, &screen::render(&view)).await?;
        } else {
            game.return_to_menu()?;
        }
        return Ok(());
    }

    match screen::parse_input(&view, text) {
        Some(command) => {
            if let Err(err) = game.send(command) {
                log::warn!("Chat {}: {}", msg.chat.id, err);
                bot.send_message(msg.chat.id, "遊戲已結束，請再傳一次訊息重新開始")
                    .await?;
                dialogue.update(State::Start).await?;
            }
        }
        None => {
            log::debug!("Chat {}: unrecognized input {:?}", msg.chat.id, text);
            bot.send_message(msg.chat.id, "請選擇下方的選項").await?;
        }
    }
    Ok(())
}

/// Sends a message for every view the game publishes, until the game goes away.
fn spawn_renderer(bot: Bot, chat_id: ChatId, mut views: watch::Receiver<GameView>) {
    tokio::spawn(async move {
        loop {
            let view = views.borrow_and_update().clone();

            if let GameView::Loading { .. } = view {
                // Only a nicety, so a failure here is ignored
                let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
            }
            if let Err(err) = send_screen(&bot, chat_id, &screen::render(&view)).await {
                log::warn!("Failed to render for chat {}: {}", chat_id, err);
            }

            if views.changed().await.is_err() {
                break;
            }
        }
        log::debug!("Renderer for chat {} stopped", chat_id);
    });
}

async fn send_screen(bot: &Bot, chat_id: ChatId, screen: &Screen) -> Result<(), teloxide::RequestError> {
    let markup = if screen.keyboard.is_empty() {
        ReplyMarkup::KeyboardRemove(KeyboardRemove::new())
    } else {
        ReplyMarkup::Keyboard(KeyboardMarkup::new(
            screen
                .keyboard
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| KeyboardButton::new(label.clone()))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>(),
        ))
    };

    bot.send_message(chat_id, screen.text.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(markup)
        .await?;
    Ok(())
}
