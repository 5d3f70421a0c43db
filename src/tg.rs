//! Telegram transport: commands, inline mode and selection buttons over [`AppContext`].

use reqwest::Url;
use std::net::SocketAddr;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    prelude::*,
    types::{
        CallbackQuery, ChatId, ChosenInlineResult, InlineKeyboardButton, InlineKeyboardMarkup, InlineQuery,
        InlineQueryResult, InlineQueryResultArticle, InputFile, InputMessageContent, InputMessageContentText,
        ParseMode,
    },
    update_listeners::webhooks,
    utils::command::BotCommands,
};
use tracing::{debug, error, info, warn};

use crate::error::BotError;
use crate::i18n::{translate, Language};
use crate::model::MediaKind;
use crate::service::{AppContext, InlineItem, Reply, Request};

/// Telegram rejects longer photo captions.
pub const CAPTION_LIMIT: usize = 1024;
const INLINE_CACHE_SECS: u32 = 300;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Commandes :")]
pub enum Command {
    #[command(description = "démarrer")]
    Start,
    #[command(description = "aide")]
    Help,
    #[command(description = "chercher un anime")]
    Anime(String),
    #[command(description = "chercher un film")]
    Movie(String),
    #[command(description = "changer la signature")]
    SetFooter(String),
    #[command(description = "changer la langue")]
    SetLang(String),
    #[command(description = "statistiques")]
    Stats,
    #[command(description = "vider le cache")]
    ClearCache,
}

impl From<Command> for Request {
    fn from(cmd: Command) -> Request {
        match cmd {
            Command::Start => Request::Start { username: None },
            Command::Help => Request::Help,
            Command::Anime(title) => Request::Search { kind: MediaKind::Anime, title },
            Command::Movie(title) => Request::Search { kind: MediaKind::Movie, title },
            Command::SetFooter(text) => Request::SetFooter(text),
            Command::SetLang(code) => Request::SetLanguage(code),
            Command::Stats => Request::Stats,
            Command::ClearCache => Request::ClearCache,
        }
    }
}

/// Public webhook endpoint and the local port it is served on.
#[derive(Debug, Clone)]
pub struct Webhook {
    pub url: String,
    pub port: u16,
}

pub async fn run(bot: Bot, ctx: Arc<AppContext>, webhook: Option<Webhook>) -> anyhow::Result<()> {
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "could not register the command menu");
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message().filter_command::<Command>().endpoint({
                let ctx = ctx.clone();
                move |bot: Bot, msg: Message, cmd: Command| {
                    let ctx = ctx.clone();
                    async move { on_command(bot, msg, cmd, &ctx).await }
                }
            }),
        )
        .branch(Update::filter_callback_query().endpoint({
            let ctx = ctx.clone();
            move |bot: Bot, q: CallbackQuery| {
                let ctx = ctx.clone();
                async move { on_callback(bot, q, &ctx).await }
            }
        }))
        .branch(Update::filter_inline_query().endpoint({
            let ctx = ctx.clone();
            move |bot: Bot, q: InlineQuery| {
                let ctx = ctx.clone();
                async move { on_inline_query(bot, q, &ctx).await }
            }
        }))
        .branch(Update::filter_chosen_inline_result().endpoint({
            let ctx = ctx.clone();
            move |bot: Bot, r: ChosenInlineResult| {
                let ctx = ctx.clone();
                async move { on_chosen_inline(bot, r, &ctx).await }
            }
        }));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .enable_ctrlc_handler()
        .build();

    match webhook {
        Some(hook) => {
            let url: Url = hook.url.parse()?;
            let addr = SocketAddr::from(([0, 0, 0, 0], hook.port));
            info!(%url, %addr, "starting webhook listener");
            let listener = webhooks::axum(bot, webhooks::Options::new(addr, url)).await?;
            dispatcher
                .dispatch_with_listener(listener, LoggingErrorHandler::with_custom_text("webhook listener error"))
                .await;
        }
        None => {
            info!("starting long polling");
            dispatcher.dispatch().await;
        }
    }
    Ok(())
}

/* ====== handlers ====== */

async fn on_command(bot: Bot, msg: Message, cmd: Command, ctx: &AppContext) -> ResponseResult<()> {
    let Some(sender) = msg.from.as_ref() else {
        return Ok(());
    };
    let user = sender.id.0 as i64;
    debug!(user_id = user, command = ?cmd, "command");
    let request = match cmd {
        Command::Start => Request::Start { username: sender.username.clone() },
        other => other.into(),
    };
    let reply = ctx.handle(user, request).await;
    deliver(&bot, msg.chat.id, reply).await
}

async fn on_callback(bot: Bot, q: CallbackQuery, ctx: &AppContext) -> ResponseResult<()> {
    let user = q.from.id.0 as i64;
    let Some(data) = q.data.as_deref() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let reply = ctx.select(user, data).await;

    let mut answer = bot.answer_callback_query(q.id.clone());
    if matches!(reply, Reply::Record { .. }) {
        answer = answer.text(translate(ctx.language(user).await, "fiche_sent"));
    }
    answer.await?;

    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat = message.chat().id;
    if matches!(reply, Reply::Record { .. }) {
        // the keyboard is single-use
        if let Err(e) = bot.edit_message_reply_markup(chat, message.id()).await {
            warn!(error = %e, chat_id = chat.0, "could not remove selection keyboard");
        }
    }
    deliver(&bot, chat, reply).await
}

async fn on_inline_query(bot: Bot, q: InlineQuery, ctx: &AppContext) -> ResponseResult<()> {
    let user = q.from.id.0 as i64;
    let items = ctx.inline_search(user, &q.query).await;
    let results: Vec<InlineQueryResult> = items.into_iter().map(article).collect();
    if let Err(e) = bot
        .answer_inline_query(q.id, results)
        .cache_time(INLINE_CACHE_SECS)
        .is_personal(true)
        .await
    {
        error!(error = %e, user_id = user, "failed to answer inline query");
    }
    Ok(())
}

/// The inline message only says "loading"; the full record goes to the user's private chat.
async fn on_chosen_inline(bot: Bot, r: ChosenInlineResult, ctx: &AppContext) -> ResponseResult<()> {
    let user = r.from.id.0 as i64;
    let result_id = r.result_id.to_string();
    info!(user_id = user, result_id = %result_id, "inline result chosen");
    let reply = ctx.chosen_inline(user, &result_id).await;
    deliver(&bot, ChatId::from(r.from.id), reply).await
}

/* ====== delivery ====== */

async fn deliver(bot: &Bot, chat: ChatId, reply: Reply) -> ResponseResult<()> {
    match reply {
        Reply::Ignore => Ok(()),
        Reply::Text(text) => send_html(bot, chat, text, None).await,
        Reply::Choices { text, buttons } => send_html(bot, chat, text, Some(keyboard(&buttons))).await,
        Reply::Record { text, poster } => send_record(bot, chat, text, poster).await,
    }
}

/// Photo with caption when it fits, photo then text otherwise; text alone when the photo fails.
async fn send_record(bot: &Bot, chat: ChatId, text: String, poster: Option<String>) -> ResponseResult<()> {
    let Some(url) = poster.as_deref().and_then(|p| Url::parse(p).ok()) else {
        return send_html(bot, chat, text, None).await;
    };
    let fits = text.chars().count() <= CAPTION_LIMIT;
    let mut photo = bot.send_photo(chat, InputFile::url(url));
    if fits {
        photo = photo.caption(text.clone()).parse_mode(ParseMode::Html);
    }
    match photo.await {
        Ok(_) if fits => Ok(()),
        Ok(_) => send_html(bot, chat, text, None).await,
        Err(e) => {
            warn!(error = %e, chat_id = chat.0, "poster delivery failed, sending text");
            send_html(bot, chat, text, None).await
        }
    }
}

async fn send_html(
    bot: &Bot,
    chat: ChatId,
    text: String,
    markup: Option<InlineKeyboardMarkup>,
) -> ResponseResult<()> {
    let mut req = bot.send_message(chat, text).parse_mode(ParseMode::Html);
    if let Some(markup) = markup {
        req = req.reply_markup(markup);
    }
    if let Err(e) = req.await {
        let failure = BotError::DeliveryFailure(e.to_string());
        error!(error = %failure, chat_id = chat.0, "sending apology instead");
        bot.send_message(chat, translate(Language::BASE, "generic_error")).await?;
    }
    Ok(())
}

/// One button per row.
fn keyboard(buttons: &[(String, String)]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        buttons
            .iter()
            .map(|(label, data)| vec![InlineKeyboardButton::callback(label.clone(), data.clone())]),
    )
}

fn article(item: InlineItem) -> InlineQueryResult {
    let content = InputMessageContent::Text(InputMessageContentText::new(item.message).parse_mode(ParseMode::Html));
    let mut article = InlineQueryResultArticle::new(item.id, item.title, content);
    article.description = Some(item.description);
    article.thumbnail_url = item.thumbnail.as_deref().and_then(|t| Url::parse(t).ok());
    InlineQueryResult::Article(article)
}
