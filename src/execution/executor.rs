use crate::callbacks::ExchangeCallbacks;
use crate::config::EntryOrderType;
use crate::error::{BotError, Result};
use crate::models::*;
use crate::strategy::{ActionType, SignalAction, StrategyParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Executed,
    Skipped,
}

/// What happened to one action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub reason: Option<String>,
}

impl ActionOutcome {
    fn executed(action_type: ActionType) -> Self {
        Self {
            action_type,
            status: ActionStatus::Executed,
            reason: None,
        }
    }

    fn skipped(action_type: ActionType, reason: impl Into<String>) -> Self {
        Self {
            action_type,
            status: ActionStatus::Skipped,
            reason: Some(reason.into()),
        }
    }

    pub fn is_executed(&self) -> bool {
        self.status == ActionStatus::Executed
    }
}

/// Client order id sent with every new order: `eb` + 32 hex chars
pub fn new_client_order_id() -> String {
    format!("eb{}", uuid::Uuid::new_v4().simple())
}

/// Maps abstract actions onto exchange calls, in order, stopping at the first failure
pub struct ActionExecutor<'a, C: ?Sized> {
    callbacks: &'a C,
    entry_order_type: EntryOrderType,
}

impl<'a, C> ActionExecutor<'a, C>
where
    C: ExchangeCallbacks + ?Sized,
{
    pub fn new(callbacks: &'a C, entry_order_type: EntryOrderType) -> Self {
        Self {
            callbacks,
            entry_order_type,
        }
    }

    pub async fn execute_actions(
        &self,
        params: &StrategyParams,
        actions: &[SignalAction],
        calculated_amount: Option<f64>,
    ) -> Result<Vec<ActionOutcome>> {
        let mut outcomes = Vec::with_capacity(actions.len());

        for action in actions {
            let outcome = self
                .execute_action(params, action, calculated_amount)
                .await
                .map_err(|e| {
                    tracing::error!(
                        symbol = %params.symbol,
                        action = %action.action_type,
                        "Action failed, aborting remaining actions: {}",
                        e
                    );
                    BotError::ActionFailed {
                        action: action.action_type.clone(),
                        source: Box::new(e),
                    }
                })?;
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    pub async fn execute_action(
        &self,
        params: &StrategyParams,
        action: &SignalAction,
        calculated_amount: Option<f64>,
    ) -> Result<ActionOutcome> {
        match &action.action_type {
            ActionType::CreateLimitOrder | ActionType::CreateMarketOrder => {
                self.entry(params, action, calculated_amount).await
            }
            ActionType::CreateStopMarketOrder | ActionType::CreateTakeProfitMarketOrder => {
                self.protective(params, action, calculated_amount).await
            }
            ActionType::ClosePosition => {
                self.callbacks
                    .close_position(&ClosePositionRequest {
                        context: params.context(),
                        symbol: action.symbol.clone(),
                        side: action.side,
                    })
                    .await
                    .map_err(|e| BotError::exchange("close_position", e))?;
                tracing::info!(symbol = %action.symbol, "Position closed");
                Ok(ActionOutcome::executed(ActionType::ClosePosition))
            }
            ActionType::CancelAllOrders => {
                self.callbacks
                    .cancel_all_orders(&CancelAllOrdersRequest {
                        context: params.context(),
                        symbol: Some(action.symbol.clone()),
                    })
                    .await
                    .map_err(|e| BotError::exchange("cancel_all_orders", e))?;
                tracing::info!(symbol = %action.symbol, "All orders cancelled");
                Ok(ActionOutcome::executed(ActionType::CancelAllOrders))
            }
            ActionType::Unknown(name) => Err(BotError::UnknownAction(name.clone())),
        }
    }

    async fn entry(
        &self,
        params: &StrategyParams,
        action: &SignalAction,
        calculated_amount: Option<f64>,
    ) -> Result<ActionOutcome> {
        let action_type = action.action_type.clone();
        let side = action.side.ok_or_else(|| BotError::MissingField {
            action: action_type.clone(),
            field: "side",
        })?;

        let amount = match calculated_amount {
            Some(amount) if amount > 0.0 => amount,
            _ => {
                tracing::info!(symbol = %action.symbol, "No positive order amount, skipping entry");
                return Ok(ActionOutcome::skipped(action_type, "no positive order amount"));
            }
        };

        match self.entry_order_type {
            EntryOrderType::Limit => {
                let price = match action.price {
                    Some(price) if price > 0.0 => price,
                    _ => {
                        tracing::warn!(
                            symbol = %action.symbol,
                            requested = %action_type,
                            "Limit entry configured but the signal carries no usable price, skipping"
                        );
                        return Ok(ActionOutcome::skipped(action_type, "limit entry without price"));
                    }
                };

                let request = LimitOrderRequest {
                    context: params.context(),
                    symbol: action.symbol.clone(),
                    side: side.entry_side(),
                    amount,
                    price,
                    client_order_id: Some(new_client_order_id()),
                    time_in_force: None,
                    post_only: false,
                };
                self.callbacks
                    .create_limit_order(&request)
                    .await
                    .map_err(|e| BotError::exchange("create_limit_order", e))?;

                tracing::info!(
                    symbol = %action.symbol,
                    side = %request.side,
                    amount,
                    price,
                    "Limit entry placed"
                );
                Ok(ActionOutcome::executed(ActionType::CreateLimitOrder))
            }
            EntryOrderType::Market => {
                let request = MarketOrderRequest {
                    context: params.context(),
                    symbol: action.symbol.clone(),
                    side: side.entry_side(),
                    amount,
                    client_order_id: Some(new_client_order_id()),
                };
                self.callbacks
                    .create_market_order(&request)
                    .await
                    .map_err(|e| BotError::exchange("create_market_order", e))?;

                tracing::info!(
                    symbol = %action.symbol,
                    side = %request.side,
                    amount,
                    "Market entry placed"
                );
                Ok(ActionOutcome::executed(ActionType::CreateMarketOrder))
            }
        }
    }

    async fn protective(
        &self,
        params: &StrategyParams,
        action: &SignalAction,
        calculated_amount: Option<f64>,
    ) -> Result<ActionOutcome> {
        let action_type = action.action_type.clone();

        let amount = match calculated_amount {
            Some(amount) if amount > 0.0 => amount,
            _ => {
                tracing::info!(
                    symbol = %action.symbol,
                    action = %action_type,
                    "No order amount, skipping protective order"
                );
                return Ok(ActionOutcome::skipped(action_type, "no positive order amount"));
            }
        };

        let side = action.side.ok_or_else(|| BotError::MissingField {
            action: action_type.clone(),
            field: "side",
        })?;
        let trigger_price = action.price.ok_or_else(|| BotError::MissingField {
            action: action_type.clone(),
            field: "price",
        })?;

        let request = TriggerOrderRequest {
            context: params.context(),
            symbol: action.symbol.clone(),
            side: side.exit_side(),
            amount,
            reduce_only: true,
            trigger_price: Some(trigger_price),
            client_order_id: Some(new_client_order_id()),
            time_in_force: None,
        };

        let (operation, result) = if action_type == ActionType::CreateStopMarketOrder {
            (
                "create_stop_market_order",
                self.callbacks.create_stop_market_order(&request).await,
            )
        } else {
            (
                "create_take_profit_market_order",
                self.callbacks.create_take_profit_market_order(&request).await,
            )
        };
        result.map_err(|e| BotError::exchange(operation, e))?;

        tracing::info!(
            symbol = %action.symbol,
            action = %action_type,
            side = %request.side,
            amount,
            trigger_price,
            "Protective order placed"
        );
        Ok(ActionOutcome::executed(action_type))
    }
}
