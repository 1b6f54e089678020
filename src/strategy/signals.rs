use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::PositionSide;

/// Kind of trading intent emitted by the signal parser.
///
/// Unknown names survive deserialization as `Unknown` so the executor can
/// reject them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    ClosePosition,
    CreateLimitOrder,
    CreateMarketOrder,
    CreateStopMarketOrder,
    CreateTakeProfitMarketOrder,
    CancelAllOrders,
    Unknown(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::ClosePosition => "close_position",
            ActionType::CreateLimitOrder => "create_limit_order",
            ActionType::CreateMarketOrder => "create_market_order",
            ActionType::CreateStopMarketOrder => "create_stop_market_order",
            ActionType::CreateTakeProfitMarketOrder => "create_take_profit_market_order",
            ActionType::CancelAllOrders => "cancel_all_orders",
            ActionType::Unknown(name) => name,
        }
    }

    /// Opens a position
    pub fn is_entry(&self) -> bool {
        matches!(
            self,
            ActionType::CreateLimitOrder | ActionType::CreateMarketOrder
        )
    }

    /// Protective order attached to an entry
    pub fn is_protective(&self) -> bool {
        matches!(
            self,
            ActionType::CreateStopMarketOrder | ActionType::CreateTakeProfitMarketOrder
        )
    }
}

impl From<String> for ActionType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "close_position" => ActionType::ClosePosition,
            "create_limit_order" => ActionType::CreateLimitOrder,
            "create_market_order" => ActionType::CreateMarketOrder,
            "create_stop_market_order" => ActionType::CreateStopMarketOrder,
            "create_take_profit_market_order" => ActionType::CreateTakeProfitMarketOrder,
            "cancel_all_orders" => ActionType::CancelAllOrders,
            _ => ActionType::Unknown(name),
        }
    }
}

impl From<ActionType> for String {
    fn from(action_type: ActionType) -> Self {
        action_type.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic trading intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAction {
    pub action_type: ActionType,
    pub symbol: String,
    #[serde(default)]
    pub side: Option<PositionSide>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl SignalAction {
    pub fn new(
        action_type: ActionType,
        symbol: impl Into<String>,
        side: Option<PositionSide>,
        price: Option<f64>,
    ) -> Self {
        Self {
            action_type,
            symbol: symbol.into(),
            side,
            price,
        }
    }

    pub fn close_position(symbol: impl Into<String>) -> Self {
        Self::new(ActionType::ClosePosition, symbol, None, None)
    }

    pub fn cancel_all_orders(symbol: impl Into<String>) -> Self {
        Self::new(ActionType::CancelAllOrders, symbol, None, None)
    }

    pub fn limit_entry(symbol: impl Into<String>, side: PositionSide, price: f64) -> Self {
        Self::new(ActionType::CreateLimitOrder, symbol, Some(side), Some(price))
    }

    pub fn market_entry(symbol: impl Into<String>, side: PositionSide) -> Self {
        Self::new(ActionType::CreateMarketOrder, symbol, Some(side), None)
    }

    pub fn stop_loss(symbol: impl Into<String>, side: PositionSide, trigger: f64) -> Self {
        Self::new(
            ActionType::CreateStopMarketOrder,
            symbol,
            Some(side),
            Some(trigger),
        )
    }

    pub fn take_profit(symbol: impl Into<String>, side: PositionSide, trigger: f64) -> Self {
        Self::new(
            ActionType::CreateTakeProfitMarketOrder,
            symbol,
            Some(side),
            Some(trigger),
        )
    }
}

/// Ordered intents for one bar. Order matters: a reversal is
/// close -> cancel-all -> reopen and must execute in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub actions: Vec<SignalAction>,
    #[serde(default)]
    pub has_exit: bool,
}

impl SignalState {
    pub fn new(actions: Vec<SignalAction>, has_exit: bool) -> Self {
        Self { actions, has_exit }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_entry(&self) -> bool {
        self.actions.iter().any(|a| a.action_type.is_entry())
    }

    pub fn has_limit_entry(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.action_type == ActionType::CreateLimitOrder)
    }

    pub fn has_close_position(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.action_type == ActionType::ClosePosition)
    }

    /// First entry action; it drives sizing for the whole signal
    pub fn first_entry(&self) -> Option<&SignalAction> {
        self.actions.iter().find(|a| a.action_type.is_entry())
    }

    /// Actions left after dropping entries and their protective follow-ups
    pub fn without_entries(&self) -> Vec<SignalAction> {
        self.actions
            .iter()
            .filter(|a| !a.action_type.is_entry() && !a.action_type.is_protective())
            .cloned()
            .collect()
    }
}
