//! Applying a verified provider outcome to the database.
//!
//! Every capture path (the capture endpoint, Tap verification and the Tap webhook)
//! ends here. The whole step runs in one IMMEDIATE transaction, so concurrent
//! settlements of the same order serialize on SQLite's write lock and the
//! `INSERT OR IGNORE` on `provider_charge_id` yields exactly one subscription.
//! Webhook deliveries record their event id in that same transaction.

use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result, msg};
use crate::models::{CreateSubscription, Subscription, TransactionStatus};
use crate::payments::{PaymentProvider, ProviderCapture};

const SECONDS_PER_DAY: i64 = 86400;

/// Who a payment belongs to and what it buys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub user_id: String,
    pub plan_id: String,
}

#[derive(Debug, Clone)]
pub struct SettlementResult {
    /// Status of the stored transaction after settlement (None if no row exists)
    pub transaction_status: Option<TransactionStatus>,
    /// Subscription for the charge, whether created now or earlier
    pub subscription: Option<Subscription>,
    /// True only for the call that inserted the subscription
    pub created: bool,
    /// Attribution used, if any could be resolved
    pub attribution: Option<Attribution>,
}

/// Settle a capture for `order_id`.
///
/// Attribution is taken from the stored transaction first, then from `fallback`,
/// then from provider metadata. A completed capture with no resolvable attribution
/// is recorded but grants nothing.
pub fn settle_capture(
    conn: &mut Connection,
    provider: PaymentProvider,
    order_id: &str,
    capture: &ProviderCapture,
    fallback: Option<&Attribution>,
) -> Result<SettlementResult> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let result = settle_in(&tx, provider, order_id, capture, fallback)?;
    tx.commit()?;
    Ok(result)
}

/// Settle a capture delivered by webhook event `event_id`.
///
/// Returns `Ok(None)` for an event already processed. The event is recorded
/// only if settlement commits, so a failed delivery is processed again when
/// the provider retries it.
pub fn settle_webhook_capture(
    conn: &mut Connection,
    provider: PaymentProvider,
    event_id: &str,
    order_id: &str,
    capture: &ProviderCapture,
) -> Result<Option<SettlementResult>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !queries::try_record_webhook_event(&tx, provider.as_str(), event_id)? {
        return Ok(None);
    }
    let result = settle_in(&tx, provider, order_id, capture, None)?;
    tx.commit()?;
    Ok(Some(result))
}

fn settle_in(
    tx: &Transaction<'_>,
    provider: PaymentProvider,
    order_id: &str,
    capture: &ProviderCapture,
    fallback: Option<&Attribution>,
) -> Result<SettlementResult> {
    let transaction = queries::get_transaction_by_order(tx, order_id)?
        .filter(|t| t.provider == provider);

    let attribution = transaction
        .as_ref()
        .map(|t| Attribution {
            user_id: t.user_id.clone(),
            plan_id: t.plan_id.clone(),
        })
        .or_else(|| fallback.cloned())
        .or_else(|| match (&capture.user_id, &capture.plan_id) {
            (Some(user_id), Some(plan_id)) => Some(Attribution {
                user_id: user_id.clone(),
                plan_id: plan_id.clone(),
            }),
            _ => None,
        });

    let Some(outcome) = capture.outcome() else {
        if let Some(ref t) = transaction {
            queries::record_provider_status(tx, &t.id, &capture.status)?;
        }
        tracing::debug!(%provider, order_id, status = %capture.status, "Capture not final yet");
        return Ok(SettlementResult {
            transaction_status: transaction.map(|t| t.status),
            subscription: None,
            created: false,
            attribution,
        });
    };

    let transaction_status = match transaction {
        Some(ref t) => {
            let updated = queries::finalize_transaction(
                tx,
                &t.id,
                outcome,
                &capture.status,
                capture.capture_id.as_deref(),
            )?;
            if !updated && t.status != outcome {
                tracing::warn!(
                    %provider,
                    order_id,
                    stored = t.status.as_ref(),
                    reported = %capture.status,
                    "Transaction already terminal, keeping stored status"
                );
            }
            Some(if updated { outcome } else { t.status })
        }
        None => {
            tracing::warn!(%provider, order_id, "No stored transaction for settled order");
            None
        }
    };

    if outcome != TransactionStatus::Completed {
        return Ok(SettlementResult {
            transaction_status,
            subscription: None,
            created: false,
            attribution,
        });
    }

    let Some(ref who) = attribution else {
        tracing::error!(%provider, order_id, "Completed payment has no user/plan attribution");
        return Ok(SettlementResult {
            transaction_status,
            subscription: None,
            created: false,
            attribution: None,
        });
    };

    let plan = queries::get_plan_by_id(tx, &who.plan_id)?
        .ok_or_else(|| AppError::NotFound(msg::PLAN_NOT_FOUND.into()))?;

    let charge_id = capture.capture_id.as_deref().unwrap_or(order_id);
    let start_date = Utc::now().timestamp();
    let end_date = if plan.is_lifetime {
        None
    } else {
        plan.duration_days
            .map(|days| start_date + days as i64 * SECONDS_PER_DAY)
    };

    let created = queries::create_subscription_once(
        tx,
        &CreateSubscription {
            user_id: who.user_id.clone(),
            plan_id: plan.id.clone(),
            provider_charge_id: charge_id.to_string(),
            start_date,
            end_date,
            is_lifetime: plan.is_lifetime,
        },
    )?;

    if created {
        let superseded = queries::cancel_other_active_subscriptions(tx, &who.user_id, charge_id)?;
        tracing::info!(
            %provider,
            order_id,
            charge_id,
            user_id = %who.user_id,
            plan_id = %plan.id,
            superseded,
            "Subscription created"
        );
    } else {
        tracing::debug!(%provider, order_id, charge_id, "Subscription already exists for charge");
    }

    let subscription = queries::get_subscription_by_charge_id(tx, charge_id)?;

    Ok(SettlementResult {
        transaction_status,
        subscription,
        created,
        attribution,
    })
}
