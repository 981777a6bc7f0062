use crate::bot::handlers::{self, is_broadcast_payload, Command};
use crate::bot::TelegramClient;
use crate::config::BotSettings;
use anyhow::Result;
use autoaccept_core::{AccessControl, Store};
use autoaccept_runtime::{BroadcastMode, Pipeline};
use std::sync::Arc;
use teloxide::dispatching::{ShutdownToken, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::ChatJoinRequest;
use tracing::{error, info, warn};

/// Run the Telegram transport runtime.
///
/// Returns once the dispatcher has stopped (Ctrl-C or SIGTERM) and the
/// pipeline has been shut down and flushed.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the final flush fails.
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    let store = init_storage(&settings).await?;

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let client = Arc::new(TelegramClient::new(bot.clone()));
    let pipeline = Arc::new(Pipeline::start(&settings.pipeline, client, store.clone()));
    let access = Arc::new(AccessControl::new(settings.telegram.admin_chat_id, store));
    let handler = setup_handler();

    info!(owner = settings.telegram.admin_chat_id, "🤖 Bot is running...");

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![pipeline.clone(), access, settings])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build();
    listen_for_sigterm(dispatcher.shutdown_token());
    dispatcher.dispatch().await;

    info!("Dispatcher stopped, shutting down pipeline");
    pipeline.shutdown().await?;
    info!("Store flushed, bye");
    Ok(())
}

async fn init_storage(settings: &BotSettings) -> Result<Arc<Store>> {
    let store = Store::open(&settings.pipeline.data_dir).await?;
    let stats = store.stats().await;
    info!(
        dir = %store.dir().display(),
        users = stats.active_users,
        channels = stats.channels,
        "Store loaded"
    );
    Ok(Arc::new(store))
}

#[cfg(unix)]
fn listen_for_sigterm(token: ShutdownToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler");
                return;
            }
        };
        term.recv().await;
        info!("SIGTERM received, stopping dispatcher");
        match token.shutdown() {
            Ok(stopped) => stopped.await,
            Err(e) => warn!(error = %e, "Dispatcher was not running"),
        }
    });
}

#[cfg(not(unix))]
fn listen_for_sigterm(_token: ShutdownToken) {}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_chat_join_request().endpoint(handle_join_request))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    // Anything else may be the payload of a pending broadcast
                    dptree::filter(|msg: Message| is_broadcast_payload(&msg))
                        .endpoint(handle_payload),
                ),
        )
}

async fn handle_join_request(
    request: ChatJoinRequest,
    pipeline: Arc<Pipeline>,
) -> Result<(), teloxide::RequestError> {
    handlers::join_request(request, pipeline).await;
    respond(())
}

async fn handle_payload(
    msg: Message,
    access: Arc<AccessControl>,
    pipeline: Arc<Pipeline>,
) -> Result<(), teloxide::RequestError> {
    handlers::broadcast_payload(msg, access, pipeline).await;
    respond(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    access: Arc<AccessControl>,
    pipeline: Arc<Pipeline>,
    settings: Arc<BotSettings>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => handlers::start(bot, msg, access, settings).await,
        Command::AddChannel(args) => handlers::add_channel(bot, msg, args, access, pipeline).await,
        Command::GiveAccess(args) => handlers::give_access(bot, msg, args, access).await,
        Command::Broadcast => {
            handlers::arm_broadcast(bot, msg, BroadcastMode::Copy, access, pipeline).await
        }
        Command::BroadcastForwardMsg => {
            handlers::arm_broadcast(bot, msg, BroadcastMode::Forward, access, pipeline).await
        }
        Command::CancelBroadcast => handlers::cancel_broadcast(bot, msg, access, pipeline).await,
        Command::LastBroadcast => handlers::last_broadcast(bot, msg, access, pipeline).await,
        Command::Stats => handlers::stats(bot, msg, access, pipeline).await,
        Command::Rate => handlers::rate(bot, msg, access, pipeline).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}
