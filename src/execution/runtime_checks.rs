use crate::callbacks::ExchangeCallbacks;
use crate::error::{BotError, Result};
use crate::models::{CancelAllOrdersRequest, PositionSide, PositionsResponse};
use crate::strategy::{SignalState, StrategyParams};

/// Offsets binary floating-point error at exact multiples of the step size
const QUANTIZE_EPSILON: f64 = 1e-10;

/// Outcome of the duplicate-entry gate
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDecision {
    Proceed,
    Skip { reason: String },
}

/// Outcome of the minimum-order gate
#[derive(Debug, Clone, PartialEq)]
pub enum MinOrderCheck {
    Pass,
    Fail { amount: f64, min_amount: f64 },
}

/// Orphaned resting orders can only exist after an unfilled limit entry or right after an exit
pub fn should_trigger_orphan_check(curr: &SignalState, prev: &SignalState) -> bool {
    curr.has_entry() || prev.has_limit_entry() || prev.has_exit
}

/// Round `raw` down to a whole number of `step`s
pub fn quantize_amount(raw: f64, step: f64) -> f64 {
    (raw / step + QUANTIZE_EPSILON).floor() * step
}

/// Gates and sizes effectful actions from fresh (or proxy-cached) exchange state
pub struct RuntimeChecks<'a, C: ?Sized> {
    callbacks: &'a C,
}

impl<'a, C> RuntimeChecks<'a, C>
where
    C: ExchangeCallbacks + ?Sized,
{
    pub fn new(callbacks: &'a C) -> Self {
        Self { callbacks }
    }

    async fn positions(&self, params: &StrategyParams) -> Result<PositionsResponse> {
        let symbols = [params.symbol.clone()];
        self.callbacks
            .fetch_positions(&params.context(), Some(symbols.as_slice()))
            .await
            .map_err(|e| BotError::exchange("fetch_positions", e))
    }

    /// Cancel every resting order for the symbol when no position is open.
    /// Returns whether a cancel was issued.
    pub async fn orphan_order_check(&self, params: &StrategyParams) -> Result<bool> {
        let positions = self.positions(params).await?;

        if positions.open_position(&params.symbol).is_some() {
            return Ok(false);
        }

        tracing::info!(symbol = %params.symbol, "No open position, cancelling orphaned orders");
        self.callbacks
            .cancel_all_orders(&CancelAllOrdersRequest {
                context: params.context(),
                symbol: Some(params.symbol.clone()),
            })
            .await
            .map_err(|e| BotError::exchange("cancel_all_orders", e))?;

        Ok(true)
    }

    /// Skip any new entry while a position for the symbol is open, whichever side it is on
    pub async fn duplicate_entry_check(
        &self,
        params: &StrategyParams,
        signal_side: PositionSide,
    ) -> Result<EntryDecision> {
        let positions = self.positions(params).await?;

        let Some(position) = positions.open_position(&params.symbol) else {
            return Ok(EntryDecision::Proceed);
        };

        let contracts = position.contracts.unwrap_or_default();
        let reason = match position.side {
            Some(side) if side == signal_side => {
                tracing::info!(
                    symbol = %params.symbol,
                    side = %side,
                    contracts,
                    "Already positioned on this side, skipping entry"
                );
                format!("{} position already open ({} contracts)", side, contracts)
            }
            other => {
                let existing = other.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string());
                tracing::warn!(
                    symbol = %params.symbol,
                    existing = %existing,
                    signal = %signal_side,
                    contracts,
                    "Unexpected open position against a {} entry, skipping",
                    signal_side
                );
                format!(
                    "{} position open while signal wants {} ({} contracts)",
                    existing, signal_side, contracts
                )
            }
        };

        Ok(EntryDecision::Skip { reason })
    }

    /// Order size in base units:
    /// `free[settlement] * position_size_pct * leverage / entry_price`, floored to the step size.
    pub async fn calculate_order_amount(
        &self,
        params: &StrategyParams,
        entry_price: f64,
    ) -> Result<f64> {
        if !(entry_price > 0.0) {
            return Err(BotError::InvalidTickerPrice(params.symbol.clone()));
        }

        let ctx = params.context();
        let balance = self
            .callbacks
            .fetch_balance(&ctx)
            .await
            .map_err(|e| BotError::exchange("fetch_balance", e))?;
        let free = balance.balance.free_for(&params.settlement_currency);

        let raw = free * params.position_size_pct * f64::from(params.leverage) / entry_price;

        let market = self
            .callbacks
            .fetch_market_info(&ctx, &params.symbol)
            .await
            .map_err(|e| BotError::exchange("fetch_market_info", e))?;

        let step = if market.precision_amount > 0.0 && market.precision_amount.is_finite() {
            market.precision_amount
        } else {
            tracing::warn!(
                symbol = %params.symbol,
                precision_amount = market.precision_amount,
                "Unusable precision_amount, sizing with step 1.0"
            );
            1.0
        };

        let amount = quantize_amount(raw, step);
        tracing::debug!(
            symbol = %params.symbol,
            free,
            entry_price,
            raw,
            step,
            amount,
            "Order amount calculated"
        );
        Ok(amount)
    }

    /// Compare `amount` against the market minimum. A zero minimum means one step.
    pub async fn min_order_check(
        &self,
        params: &StrategyParams,
        amount: f64,
    ) -> Result<MinOrderCheck> {
        let market = self
            .callbacks
            .fetch_market_info(&params.context(), &params.symbol)
            .await
            .map_err(|e| BotError::exchange("fetch_market_info", e))?;

        let precision = market.precision_amount;
        if precision.is_nan() {
            return Err(BotError::InvalidPrecision {
                value: precision,
                reason: "not a number",
            });
        }
        if precision <= 0.0 {
            return Err(BotError::InvalidPrecision {
                value: precision,
                reason: "<= 0",
            });
        }

        let min_amount = if market.min_amount > 0.0 {
            market.min_amount
        } else {
            precision
        };

        if amount < min_amount {
            tracing::info!(
                symbol = %params.symbol,
                amount,
                min_amount,
                "Order amount below exchange minimum"
            );
            return Ok(MinOrderCheck::Fail { amount, min_amount });
        }

        Ok(MinOrderCheck::Pass)
    }
}
