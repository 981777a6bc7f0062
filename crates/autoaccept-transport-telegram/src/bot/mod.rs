/// `BotClient` implementation over the Bot API
pub mod client;
/// Command, payload and join-request handlers
pub mod handlers;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// Reply texts
pub mod views;

pub use client::TelegramClient;
