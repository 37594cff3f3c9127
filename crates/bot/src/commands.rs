use relay_forward_core::{
    BotApiTransport, CooldownThrottle, CorrelationStore, Error, ForwardOutcome, Result, Transport,
    forward_random, forward_range, reconstruct_thread, resolve_message_id,
};
use tracing::{error, info};

use crate::api::{BotClient, IncomingMessage};

const MAX_BULK_COUNT: i64 = 100;

const HELP_TEXT: &str = "Bot commands:\n\
/forward [<source_chat>] <message_id> - forward a single message by id\n\
/forward_reply - reply to a forwarded message to forward the message it originally replied to\n\
/forward_thread [[<source_chat>] <message_id>] - forward a whole reply chain to your private chat\n\
/forward_n [<source_chat>] <message_id> <count> - forward a run of messages to your private chat (max 100)\n\
/forwrand - forward a random message from this chat (2 uses per 15s per chat)\n\
/forward_id - reply to a forwarded message to get its original id\n\n\
Commands operating on forwarded copies only work for five minutes after the forward.";

pub struct BotContext {
    pub client: BotClient,
    pub transport: BotApiTransport,
    pub store: Box<dyn CorrelationStore>,
    pub cooldown: CooldownThrottle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Forward {
        source: Option<String>,
        message_id: i64,
    },
    ForwardReply,
    ForwardThread {
        target: Option<(Option<String>, i64)>,
    },
    ForwardN {
        source: Option<String>,
        start_id: i64,
        count: u32,
    },
    ForwardRand,
    ForwardId,
}

/// Splits a command message into the command word and its arguments,
/// validating argument shape before anything touches the network.
/// Returns `None` for non-commands and commands addressed elsewhere;
/// `Some(Err(reply))` carries the user-facing validation reply.
pub fn parse_command(text: &str) -> Option<std::result::Result<Command, String>> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    if !head.starts_with('/') {
        return None;
    }
    // Strip an optional @botname suffix.
    let command = head.split('@').next().unwrap_or(head);
    let args: Vec<&str> = parts.collect();

    let parsed = match command {
        "/start" => Ok(Command::Start),
        "/help" => Ok(Command::Help),
        "/forward" => match args.as_slice() {
            [id] => parse_message_id(id).map(|message_id| Command::Forward {
                source: None,
                message_id,
            }),
            [source, id] => parse_message_id(id).map(|message_id| Command::Forward {
                source: Some((*source).to_string()),
                message_id,
            }),
            _ => Err("Usage: /forward [<source_chat>] <message_id>".to_string()),
        },
        "/forward_reply" => Ok(Command::ForwardReply),
        "/forward_thread" => match args.as_slice() {
            [] => Ok(Command::ForwardThread { target: None }),
            [id] => parse_message_id(id).map(|message_id| Command::ForwardThread {
                target: Some((None, message_id)),
            }),
            [source, id] => parse_message_id(id).map(|message_id| Command::ForwardThread {
                target: Some((Some((*source).to_string()), message_id)),
            }),
            _ => Err("Usage: /forward_thread [[<source_chat>] <message_id>]".to_string()),
        },
        "/forward_n" => match args.as_slice() {
            [id, count] => parse_bulk_args(None, id, count),
            [source, id, count] => parse_bulk_args(Some(source), id, count),
            _ => Err("Usage: /forward_n [<source_chat>] <message_id> <count>".to_string()),
        },
        "/forwrand" => Ok(Command::ForwardRand),
        "/forward_id" => Ok(Command::ForwardId),
        _ => return None,
    };

    Some(parsed)
}

fn parse_message_id(raw: &str) -> std::result::Result<i64, String> {
    raw.parse::<i64>()
        .map_err(|_| "The message ID must be an integer.".to_string())
}

fn parse_bulk_args(
    source: Option<&str>,
    id: &str,
    count: &str,
) -> std::result::Result<Command, String> {
    let incorrect = || "Incorrect format.".to_string();
    let start_id = id.parse::<i64>().map_err(|_| incorrect())?;
    let count = count.parse::<i64>().map_err(|_| incorrect())?;

    if count < 0 {
        return Err(incorrect());
    }
    if count > MAX_BULK_COUNT {
        return Err("Too many messages! The maximum is 100.".to_string());
    }

    Ok(Command::ForwardN {
        source: source.map(str::to_string),
        start_id,
        count: count as u32,
    })
}

pub async fn handle_update(ctx: &BotContext, message: &IncomingMessage) {
    let Some(text) = message.text.as_deref() else {
        return;
    };
    let Some(parsed) = parse_command(text) else {
        return;
    };

    let invocation_id = uuid::Uuid::new_v4();
    info!(
        event = "command.received",
        invocation_id = %invocation_id,
        chat_id = message.chat.id,
        message_id = message.message_id,
        "command.received"
    );

    let outcome = match parsed {
        Err(reply) => {
            let _ = ctx.client.send_message(message.chat.id, &reply, None).await;
            Ok(())
        }
        Ok(command) => dispatch(ctx, message, command).await,
    };

    if let Err(e) = outcome {
        error!(
            event = "command.failed",
            invocation_id = %invocation_id,
            chat_id = message.chat.id,
            error = %e,
            "command.failed"
        );
        let _ = ctx
            .client
            .send_message(message.chat.id, &format!("An error occurred: {e}"), None)
            .await;
    }
}

async fn dispatch(ctx: &BotContext, message: &IncomingMessage, command: Command) -> Result<()> {
    match command {
        Command::Start => {
            reply(
                ctx,
                message,
                "Hi! Please add me to the chat or channel to be able to forward messages from it.",
            )
            .await
        }
        Command::Help => reply(ctx, message, HELP_TEXT).await,
        Command::Forward { source, message_id } => {
            cmd_forward(ctx, message, source, message_id).await
        }
        Command::ForwardReply => cmd_forward_reply(ctx, message).await,
        Command::ForwardThread { target } => cmd_forward_thread(ctx, message, target).await,
        Command::ForwardN {
            source,
            start_id,
            count,
        } => cmd_forward_n(ctx, message, source, start_id, count).await,
        Command::ForwardRand => cmd_forwrand(ctx, message).await,
        Command::ForwardId => cmd_forward_id(ctx, message).await,
    }
}

async fn reply(ctx: &BotContext, message: &IncomingMessage, text: &str) -> Result<()> {
    ctx.client
        .send_message(message.chat.id, text, Some(message.message_id))
        .await
}

async fn resolve_source_chat(
    ctx: &BotContext,
    message: &IncomingMessage,
    source: Option<&str>,
) -> Result<i64> {
    match source {
        Some(reference) => ctx.transport.resolve_chat(reference).await,
        None => Ok(message.chat.id),
    }
}

async fn cmd_forward(
    ctx: &BotContext,
    message: &IncomingMessage,
    source: Option<String>,
    message_id: i64,
) -> Result<()> {
    let source_chat = resolve_source_chat(ctx, message, source.as_deref()).await?;
    let original_id = resolve_message_id(ctx.store.as_ref(), source_chat, message_id).await;

    match ctx
        .transport
        .forward_message(message.chat.id, source_chat, original_id)
        .await?
    {
        ForwardOutcome::Forwarded {
            message_id: forwarded_id,
        } => {
            ctx.store.put(source_chat, forwarded_id, original_id).await?;
            Ok(())
        }
        ForwardOutcome::RateLimited { retry_after } => Err(Error::ForwardFailed {
            message_id: original_id,
            message: format!("rate limited for {}s", retry_after.as_secs()),
        }),
    }
}

async fn cmd_forward_reply(ctx: &BotContext, message: &IncomingMessage) -> Result<()> {
    let Some(replied_to) = message.reply_to_message.as_deref() else {
        return reply(ctx, message, "You need to reply to a message.").await;
    };

    let chat_id = message.chat.id;
    let resolved = resolve_message_id(ctx.store.as_ref(), chat_id, replied_to.message_id).await;
    let fetched = ctx.transport.fetch_message(chat_id, resolved).await?;

    let Some(parent_id) = fetched.reply_to else {
        return reply(
            ctx,
            message,
            "The replied-to message is not a reply to another message.",
        )
        .await;
    };

    match ctx
        .transport
        .forward_message(chat_id, chat_id, parent_id)
        .await?
    {
        ForwardOutcome::Forwarded {
            message_id: forwarded_id,
        } => {
            ctx.store.put(chat_id, forwarded_id, parent_id).await?;
            Ok(())
        }
        ForwardOutcome::RateLimited { retry_after } => Err(Error::ForwardFailed {
            message_id: parent_id,
            message: format!("rate limited for {}s", retry_after.as_secs()),
        }),
    }
}

async fn cmd_forward_thread(
    ctx: &BotContext,
    message: &IncomingMessage,
    target: Option<(Option<String>, i64)>,
) -> Result<()> {
    let Some(user) = message.from.as_ref() else {
        return reply(ctx, message, "Cannot determine your private chat.").await;
    };

    // A reply takes precedence over explicit arguments.
    let (source_chat, leaf_id) = if let Some(replied_to) = message.reply_to_message.as_deref() {
        (message.chat.id, replied_to.message_id)
    } else if let Some((source, message_id)) = target {
        let chat = resolve_source_chat(ctx, message, source.as_deref()).await?;
        (chat, message_id)
    } else {
        return reply(
            ctx,
            message,
            "Usage: /forward_thread [[<source_chat>] <message_id>]",
        )
        .await;
    };

    if message.chat.kind != "private" {
        reply(ctx, message, "Messages forwarded to the private chat").await?;
    }

    reconstruct_thread(
        &ctx.transport,
        ctx.store.as_ref(),
        user.id,
        source_chat,
        leaf_id,
    )
    .await?;
    Ok(())
}

async fn cmd_forward_n(
    ctx: &BotContext,
    message: &IncomingMessage,
    source: Option<String>,
    start_id: i64,
    count: u32,
) -> Result<()> {
    let Some(user) = message.from.as_ref() else {
        return reply(ctx, message, "Cannot determine your private chat.").await;
    };

    let source_chat = resolve_source_chat(ctx, message, source.as_deref()).await?;
    let start_id = resolve_message_id(ctx.store.as_ref(), source_chat, start_id).await;

    if message.chat.kind != "private" {
        reply(ctx, message, "Messages forwarded to the private chat").await?;
    }

    forward_range(&ctx.transport, user.id, source_chat, start_id, count).await?;
    Ok(())
}

async fn cmd_forwrand(ctx: &BotContext, message: &IncomingMessage) -> Result<()> {
    // Over-quota chats are ignored without a reply; answering would be
    // its own spam vector.
    if !ctx.cooldown.try_acquire(message.chat.id) {
        return Ok(());
    }

    match forward_random(
        &ctx.transport,
        ctx.store.as_ref(),
        message.chat.id,
        message.chat.id,
    )
    .await
    {
        Ok(_) => Ok(()),
        Err(Error::EmptyChat) => reply(ctx, message, "No messages found in this chat.").await,
        Err(e) => Err(e),
    }
}

async fn cmd_forward_id(ctx: &BotContext, message: &IncomingMessage) -> Result<()> {
    let Some(replied_to) = message.reply_to_message.as_deref() else {
        return reply(ctx, message, "You need to reply to a message.").await;
    };

    match ctx
        .store
        .get(message.chat.id, replied_to.message_id)
        .await?
    {
        Some(original_id) => reply(ctx, message, &original_id.to_string()).await,
        None => reply(ctx, message, "No message id in cache").await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_commands_are_ignored() {
        assert!(parse_command("hello there").is_none());
        assert!(parse_command("/unknown").is_none());
    }

    #[test]
    fn botname_suffix_is_stripped() {
        let cmd = parse_command("/forward@relayforward_bot 123").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::Forward {
                source: None,
                message_id: 123
            }
        );
    }

    #[test]
    fn forward_accepts_one_or_two_args() {
        assert_eq!(
            parse_command("/forward 42").unwrap().unwrap(),
            Command::Forward {
                source: None,
                message_id: 42
            }
        );
        assert_eq!(
            parse_command("/forward somechannel 42").unwrap().unwrap(),
            Command::Forward {
                source: Some("somechannel".to_string()),
                message_id: 42
            }
        );
        assert!(parse_command("/forward").unwrap().is_err());
        assert!(parse_command("/forward a b c").unwrap().is_err());
    }

    #[test]
    fn non_integer_message_id_is_rejected() {
        let err = parse_command("/forward abc").unwrap().unwrap_err();
        assert_eq!(err, "The message ID must be an integer.");
    }

    #[test]
    fn forward_thread_args_are_optional() {
        assert_eq!(
            parse_command("/forward_thread").unwrap().unwrap(),
            Command::ForwardThread { target: None }
        );
        assert_eq!(
            parse_command("/forward_thread 7").unwrap().unwrap(),
            Command::ForwardThread {
                target: Some((None, 7))
            }
        );
        assert_eq!(
            parse_command("/forward_thread chan 7").unwrap().unwrap(),
            Command::ForwardThread {
                target: Some((Some("chan".to_string()), 7))
            }
        );
    }

    #[test]
    fn forward_n_validates_count_range() {
        assert_eq!(
            parse_command("/forward_n 100 3").unwrap().unwrap(),
            Command::ForwardN {
                source: None,
                start_id: 100,
                count: 3
            }
        );
        assert_eq!(
            parse_command("/forward_n 100 0").unwrap().unwrap(),
            Command::ForwardN {
                source: None,
                start_id: 100,
                count: 0
            }
        );
        assert_eq!(
            parse_command("/forward_n 100 -1").unwrap().unwrap_err(),
            "Incorrect format."
        );
        assert_eq!(
            parse_command("/forward_n 100 101").unwrap().unwrap_err(),
            "Too many messages! The maximum is 100."
        );
        assert_eq!(
            parse_command("/forward_n chan 100 100").unwrap().unwrap(),
            Command::ForwardN {
                source: Some("chan".to_string()),
                start_id: 100,
                count: 100
            }
        );
    }

    #[test]
    fn bare_commands_parse() {
        assert_eq!(parse_command("/start").unwrap().unwrap(), Command::Start);
        assert_eq!(parse_command("/help").unwrap().unwrap(), Command::Help);
        assert_eq!(
            parse_command("/forwrand").unwrap().unwrap(),
            Command::ForwardRand
        );
        assert_eq!(
            parse_command("/forward_id").unwrap().unwrap(),
            Command::ForwardId
        );
        assert_eq!(
            parse_command("/forward_reply").unwrap().unwrap(),
            Command::ForwardReply
        );
    }
}
