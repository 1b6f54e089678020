// Core modules
pub mod bot;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use bot::TradingBot;
pub use callbacks::{Callbacks, CompositeCallbacks, ExchangeCallbacks, HttpCallbacks, StrategyCallbacks};
pub use config::{BotConfig, EntryOrderType, GatewayConfig, Settings};
pub use error::{BotError, CallbackEnvelope, CallbackError, CallbackResult, Result};
pub use models::*;
pub use strategy::{ActionType, SignalAction, SignalState, StrategyParams};
