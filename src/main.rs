mod messages;

use std::sync::Arc;
use std::time::Duration;

use chatgpt::{client::ChatGPT, config::ChatGPTEngine};
use dotenv::dotenv;
use globe_quiz::config::Config;
use globe_quiz::quiz::ai_helper::QuizHelper;
use globe_quiz::quiz::{
    CountryDataset, InMemoryRunStore, InvalidState, Mode, QuizEngine, QuizError, Run, RunId,
};
use log::{info, warn};
use messages::{Ending, Input};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{KeyboardRemove, ParseMode},
};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type DialogueStorage = std::sync::Arc<ErasedStorage<State>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveModeChoice,
    Playing {
        run_id: RunId,
    },
}

const STOP_COMMAND: &str = "/stop";

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting globe quiz bot...");

    let config = Config::from_env()?;
    let bot = Bot::from_env();

    info!("Opening dialogue storage at {}", config.dialogue_db_path);
    let storage: DialogueStorage = SqliteStorage::open(&config.dialogue_db_path, Json)
        .await?
        .erase();

    let dataset = Arc::new(CountryDataset::open(&config.countries_path)?);
    info!(
        "Loaded {} countries from {}",
        dataset.len(),
        config.countries_path.display()
    );

    let engine = Arc::new(QuizEngine::new(
        dataset,
        Arc::new(InMemoryRunStore::new()),
        config.rules.clone(),
    ));

    let chat_gpt = match &config.chatgpt_api_key {
        Some(key) => {
            let mut gpt = ChatGPT::new(key)?;
            gpt.config.engine = ChatGPTEngine::Gpt35Turbo;
            gpt.config.timeout = Duration::from_secs(15);
            Some(gpt)
        }
        None => {
            warn!("CHATGPT_API_KEY is not set, recommendations will use the static list");
            None
        }
    };
    let helper = Arc::new(QuizHelper::new(chat_gpt));

    spawn_run_janitor(engine.clone(), config.run_idle_ttl);

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveModeChoice].endpoint(receive_mode_choice))
            .branch(dptree::case![State::Playing { run_id }].endpoint(play)),
    )
    .dependencies(dptree::deps![storage, engine, helper])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

/// Periodically drops runs nobody answered for `ttl`.
fn spawn_run_janitor(engine: Arc<QuizEngine>, ttl: Duration) {
    let period = (ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            if let Err(err) = engine.evict_idle(ttl) {
                warn!("Failed to evict idle runs: {}", err);
            }
        }
    });
}

const GREETING_TEXT: &str = "Hi! I'm a geography quiz bot. Find countries on the globe, pin capitals on the map, or rank countries by population. You have 3 attempts per game. Pick a mode:";

async fn start(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT)
        .reply_markup(messages::mode_keyboard())
        .await?;

    dialogue.update(State::ReceiveModeChoice).await?;
    Ok(())
}

async fn receive_mode_choice(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    engine: Arc<QuizEngine>,
) -> HandlerResult {
    let Some(mode) = msg.text().and_then(|text| text.parse::<Mode>().ok()) else {
        bot.send_message(msg.chat.id, "Please pick one of the modes")
            .reply_markup(messages::mode_keyboard())
            .await?;
        return Ok(());
    };

    let run = engine.start_run(mode)?;

    bot.send_message(
        msg.chat.id,
        format!("Let's go: {}! Send {} to quit.", mode, STOP_COMMAND),
    )
    .reply_markup(KeyboardRemove::new())
    .await?;
    bot.send_message(
        msg.chat.id,
        messages::question_text(&run.question, engine.rules()),
    )
    .parse_mode(ParseMode::Html)
    .await?;

    dialogue.update(State::Playing { run_id: run.id }).await?;
    Ok(())
}

async fn play(
    bot: Bot,
    dialogue: QuizDialogue,
    run_id: RunId,
    msg: Message,
    engine: Arc<QuizEngine>,
    helper: Arc<QuizHelper>,
) -> HandlerResult {
    let run = match engine.get_run(run_id) {
        Ok(run) => run,
        Err(QuizError::NotFound(_)) => return restart(bot, dialogue, msg).await,
        Err(err) => return Err(err.into()),
    };

    if msg.text().map(str::trim) == Some(STOP_COMMAND) {
        engine.discard_run(run_id)?;
        return finish(bot, dialogue, msg, &run, Ending::Stopped, &engine, &helper).await;
    }

    let input = match (msg.text(), msg.location()) {
        (Some(text), _) => Input::Text(text),
        (None, Some(location)) => Input::Location {
            lat: location.latitude,
            lng: location.longitude,
        },
        (None, None) => {
            bot.send_message(msg.chat.id, "Send a country name, a location pin, or a list")
                .await?;
            return Ok(());
        }
    };

    let answer = match messages::read_answer(&run.question, input, engine.dataset()) {
        Ok(answer) => answer,
        Err(hint) => {
            bot.send_message(msg.chat.id, hint)
                .parse_mode(ParseMode::Html)
                .await?;
            return Ok(());
        }
    };

    let outcome = match engine.submit_answer(run_id, &answer) {
        Ok(outcome) => outcome,
        Err(QuizError::Validation(hint)) => {
            bot.send_message(msg.chat.id, hint).await?;
            return Ok(());
        }
        // The question moved on between reading it and answering it
        Err(QuizError::InvalidState {
            reason: InvalidState::OutOfSequence,
            ..
        }) => {
            let current = engine.get_run(run_id)?;
            bot.send_message(
                msg.chat.id,
                messages::question_text(&current.question, engine.rules()),
            )
            .parse_mode(ParseMode::Html)
            .await?;
            return Ok(());
        }
        Err(QuizError::NotFound(_)) => return restart(bot, dialogue, msg).await,
        Err(err) if err.is_terminal_state() => {
            let ended = engine.get_run(run_id).unwrap_or(run);
            let ending = Ending::after(&ended);
            engine.discard_run(run_id)?;
            return finish(bot, dialogue, msg, &ended, ending, &engine, &helper).await;
        }
        Err(err) => return Err(err.into()),
    };

    bot.send_message(msg.chat.id, messages::verdict_text(&outcome))
        .await?;

    if !outcome.run.is_active() {
        engine.discard_run(run_id)?;
        let ending = Ending::after(&outcome.run);
        return finish(bot, dialogue, msg, &outcome.run, ending, &engine, &helper).await;
    }

    bot.send_message(
        msg.chat.id,
        messages::question_text(&outcome.run.question, engine.rules()),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

async fn finish(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    run: &Run,
    ending: Ending,
    engine: &QuizEngine,
    helper: &QuizHelper,
) -> HandlerResult {
    bot.send_message(msg.chat.id, messages::final_text(run, ending))
        .parse_mode(ParseMode::Html)
        .await?;

    // Typing indicator is cosmetic, ignore failures
    let _ = bot
        .send_chat_action(msg.chat.id, teloxide::types::ChatAction::Typing)
        .await;

    let known: Vec<_> = run
        .used
        .iter()
        .filter_map(|code| engine.dataset().by_iso3(code))
        .collect();
    let recommendation = helper.recommend_destinations(&known).await;

    bot.send_message(msg.chat.id, messages::recommendation_text(&recommendation))
        .parse_mode(ParseMode::Html)
        .await?;
    bot.send_message(msg.chat.id, "Play again?")
        .reply_markup(messages::mode_keyboard())
        .await?;

    dialogue.update(State::ReceiveModeChoice).await?;
    Ok(())
}

async fn restart(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "That game has expired. Pick a mode to start a new one:",
    )
    .reply_markup(messages::mode_keyboard())
    .await?;

    dialogue.update(State::ReceiveModeChoice).await?;
    Ok(())
}
