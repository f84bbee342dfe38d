//! Refresh reports.

use serde::Serialize;

use crate::domain::orders::records::{OrderStatus, OrderUuid};

/// Why an order was left out of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    NotDispatched,
    Terminal(OrderStatus),
    NoCredential,
}

/// Result of refreshing one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RefreshOutcome {
    Updated {
        from: OrderStatus,
        to: OrderStatus,
        carrier_status: String,
    },
    Unchanged {
        status: OrderStatus,
        carrier_status: String,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRefresh {
    pub order: OrderUuid,

    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

/// Per-order outcomes of a refresh, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub total_processed: usize,
    pub total_updated: usize,
    pub total_errors: usize,
    pub results: Vec<OrderRefresh>,
}

impl RefreshReport {
    #[must_use]
    pub fn from_results(results: Vec<OrderRefresh>) -> Self {
        let total_updated = results
            .iter()
            .filter(|result| matches!(result.outcome, RefreshOutcome::Updated { .. }))
            .count();

        let total_errors = results
            .iter()
            .filter(|result| matches!(result.outcome, RefreshOutcome::Failed { .. }))
            .count();

        Self {
            total_processed: results.len(),
            total_updated,
            total_errors,
            results,
        }
    }

    /// Outcome recorded for `order`, if it was part of the refresh.
    #[must_use]
    pub fn outcome(&self, order: OrderUuid) -> Option<&RefreshOutcome> {
        self.results
            .iter()
            .find(|result| result.order == order)
            .map(|result| &result.outcome)
    }
}
