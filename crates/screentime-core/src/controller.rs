//! Foreground daily limits controller.
//!
//! Owns the in-memory view of today's limits, usage and unlocks, writes every
//! change through to the shared container, and recomputes the shielded set
//! from scratch after each change. The background monitor may have written
//! to the container in the meantime; [`DailyLimitsController::reconcile`]
//! folds that back in.

use chrono::Duration;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

use crate::context::Context;
use crate::enforcement::blocked_apps;
use crate::error::Result;
use crate::model::{AppId, DaySummary, LimitSet, Seconds, ShieldContributions, SuppressionSet, UsageRecord};
use crate::monitoring::{MonitoringScheduler, ScheduleName};
use crate::policy::{classify, ApplyNow, ChangeMode};
use crate::rollover::{perform_rollover, RolloverOutcome};
use crate::storage::DailyState;
use crate::unlock::{UnlockGrant, UnlockKind, UnlockSource};

/// Time left before an app is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingTime {
    Unlimited,
    Finite(Duration),
}

impl RemainingTime {
    /// Whole seconds left, or `None` when unlimited.
    pub fn as_secs(&self) -> Option<i64> {
        match self {
            RemainingTime::Unlimited => None,
            RemainingTime::Finite(d) => Some(d.num_seconds()),
        }
    }
}

impl Serialize for RemainingTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_secs().serialize(serializer)
    }
}

pub struct DailyLimitsController {
    ctx: Context,
    scheduler: MonitoringScheduler,
    daily: DailyState,
    suppressions: SuppressionSet,
    selection: BTreeSet<AppId>,
}

impl DailyLimitsController {
    /// Load (and if needed roll over) the shared records, enforce them and
    /// register thresholds.
    ///
    /// # Errors
    /// Returns an error if the enforcement capability rejects the initial
    /// shield. A failed threshold registration is only logged.
    pub fn start(ctx: Context) -> Result<Self> {
        let today = ctx.clock.today();
        let scheduler = ctx.scheduler();
        let mut controller = Self {
            daily: DailyState::first_launch(today),
            suppressions: SuppressionSet::new(),
            selection: BTreeSet::new(),
            scheduler,
            ctx,
        };
        controller.reconcile()?;
        controller.refresh_monitoring("controller start");
        Ok(controller)
    }

    // ── Limits ──────────────────────────────────────────────────────

    /// Set `app`'s daily budget. Immediate writes today's and tomorrow's
    /// sets; deferred writes only tomorrow's.
    pub fn set_limit(&mut self, app: AppId, secs: Seconds, mode: ChangeMode) -> Result<()> {
        self.ensure_today()?;
        if mode == ChangeMode::Immediate {
            self.daily.current.set(app.clone(), secs);
        }
        self.daily.pending.set(app.clone(), secs);
        tracing::info!(app = %app, secs, ?mode, "limit set");
        self.limits_changed("limit set")
    }

    pub fn remove_limit(&mut self, app: &AppId, mode: ChangeMode) -> Result<()> {
        self.ensure_today()?;
        if mode == ChangeMode::Immediate {
            self.daily.current.remove(app);
        }
        self.daily.pending.remove(app);
        tracing::info!(app = %app, ?mode, "limit removed");
        self.limits_changed("limit removed")
    }

    /// Change or remove (`None`) a limit the way the user asked for it.
    /// Tightening applies today; loosening waits for tomorrow.
    pub fn request_limit(&mut self, app: AppId, secs: Option<Seconds>) -> Result<ChangeMode> {
        self.ensure_today()?;
        let mode = classify(self.daily.current.limit_for(&app), secs);
        match secs {
            Some(secs) => self.set_limit(app, secs, mode)?,
            None => self.remove_limit(&app, mode)?,
        }
        Ok(mode)
    }

    /// Make tomorrow's limit for `app` today's as well. Only reachable with
    /// an explicit confirmation token.
    pub fn apply_pending_now(&mut self, app: &AppId, _confirmed: ApplyNow) -> Result<()> {
        self.ensure_today()?;
        match self.daily.pending.per_app.get(app).copied() {
            Some(secs) => self.daily.current.set(app.clone(), secs),
            None => {
                self.daily.current.remove(app);
            }
        }
        tracing::info!(app = %app, "pending limit applied now");
        self.limits_changed("limit applied now")
    }

    pub fn has_exceeded_limit(&self, app: &AppId) -> bool {
        let now = self.ctx.clock.now_utc();
        if self.suppressions.is_active(app, now) {
            return false;
        }
        self.daily
            .current
            .limit_for(app)
            .is_some_and(|limit| self.daily.usage.used(app) >= limit)
    }

    pub fn remaining_time(&self, app: &AppId) -> RemainingTime {
        let Some(limit) = self.daily.current.limit_for(app) else {
            return RemainingTime::Unlimited;
        };
        let now = self.ctx.clock.now_utc();
        if let Some(expiry) = self.suppressions.active_expiry(app, now) {
            return RemainingTime::Finite(expiry - now);
        }
        let left = limit.saturating_sub(self.daily.usage.used(app));
        RemainingTime::Finite(Duration::seconds(i64::try_from(left).unwrap_or(i64::MAX)))
    }

    // ── Usage ───────────────────────────────────────────────────────

    /// Add `secs` of use. Counts even while the app is unlocked.
    pub fn record_usage(&mut self, app: AppId, secs: Seconds) -> Result<Seconds> {
        self.ensure_today()?;
        // Pick up backfill the monitor may have written since the last read.
        if let Some(stored) = self.ctx.state.load_usage() {
            self.daily.usage.merge_max(&stored);
        }
        let total = self.daily.usage.add(app.clone(), secs);
        self.ctx.state.save_usage(&self.daily.usage);
        tracing::debug!(app = %app, secs, total, "usage recorded");
        self.recompute_enforcement()?;
        Ok(total)
    }

    // ── Unlocks ─────────────────────────────────────────────────────

    pub fn grant_temporary_unlock(
        &mut self,
        apps: Vec<AppId>,
        duration: Duration,
        source: UnlockSource,
    ) -> Result<UnlockGrant> {
        self.grant(apps, UnlockKind::timed(duration), source)
    }

    /// Unlock until the next local midnight.
    pub fn grant_until_day_boundary(
        &mut self,
        apps: Vec<AppId>,
        source: UnlockSource,
    ) -> Result<UnlockGrant> {
        self.grant(apps, UnlockKind::DayPass, source)
    }

    fn grant(&mut self, apps: Vec<AppId>, kind: UnlockKind, source: UnlockSource) -> Result<UnlockGrant> {
        self.ensure_today()?;
        let grant = UnlockGrant::new(apps, kind, source, self.ctx.clock.now(), &self.ctx.config.unlock)?;

        let mut suppressions = self.ctx.state.load_suppressions();
        for app in &grant.apps {
            suppressions.grant(app.clone(), grant.expires_at);
        }
        self.ctx.state.save_suppressions(&suppressions);
        self.suppressions = suppressions;

        let unlocked: BTreeSet<AppId> = grant.apps.iter().cloned().collect();
        self.ctx.enforcement.remove(&unlocked)?;

        let donation = grant.source.donation_cents();
        if donation > 0 {
            self.record_donation(donation);
        }
        if let Err(e) = self.scheduler.schedule_unlock_expiry(grant.expires_at) {
            tracing::warn!(error = %e, "could not schedule unlock expiry check");
        }
        tracing::info!(id = %grant.id, apps = grant.apps.len(), expires_at = %grant.expires_at, "unlock granted");

        self.recompute_enforcement()?;
        Ok(grant)
    }

    /// End an unlock early.
    pub fn revoke_unlock(&mut self, app: &AppId) -> Result<bool> {
        let mut suppressions = self.ctx.state.load_suppressions();
        let revoked = suppressions.revoke(app);
        if revoked {
            self.ctx.state.save_suppressions(&suppressions);
            tracing::info!(app = %app, "unlock revoked");
        }
        self.suppressions = suppressions;
        self.recompute_enforcement()?;
        Ok(revoked)
    }

    /// Add a settled donation to today's total.
    pub fn record_donation(&mut self, cents: u64) {
        let mut counters = self.ctx.state.load_counters(self.ctx.clock.today());
        counters.donations_cents = counters.donations_cents.saturating_add(cents);
        self.ctx.state.save_counters(&counters);
    }

    // ── Selection ───────────────────────────────────────────────────

    pub fn set_tracked_apps(&mut self, apps: BTreeSet<AppId>) -> Result<()> {
        self.ctx.state.save_tracked_apps(&apps);
        self.selection = apps;
        self.refresh_monitoring("app selection changed");
        self.recompute_enforcement()?;
        Ok(())
    }

    /// The user's selection plus every app that has a limit today.
    pub fn tracked_apps(&self) -> BTreeSet<AppId> {
        let mut tracked = self.selection.clone();
        tracked.extend(self.daily.current.per_app.keys().cloned());
        tracked
    }

    // ── Day boundary and reconciliation ─────────────────────────────

    /// Roll over if the local day has changed since the last look.
    pub fn check_day_boundary(&mut self) -> Result<RolloverOutcome> {
        let today = self.ctx.clock.today();
        let stored_stale = self
            .ctx
            .state
            .load_current()
            .is_some_and(|current| current.is_stale(today));
        if self.daily.current.is_stale(today) || stored_stale {
            return self.reconcile();
        }
        Ok(RolloverOutcome::Current)
    }

    /// Re-read everything the background side may have changed and enforce
    /// the result. Usage only ever goes up: the in-memory and stored copies
    /// are merged by per-app maximum and raised to the floors left by
    /// threshold events.
    pub fn reconcile(&mut self) -> Result<RolloverOutcome> {
        let today = self.ctx.clock.today();
        let (stored, mut outcome) = perform_rollover(&self.ctx.state, today);
        if outcome == RolloverOutcome::Current && self.daily.current.day != today {
            // The monitor rolled the container over before we looked.
            outcome = RolloverOutcome::Promoted {
                from: self.daily.current.day,
            };
        }

        let mut usage = stored.usage.clone();
        usage.merge_max(&self.daily.usage);
        usage.raise_all(&self.ctx.state.load_limit_reached(today).floors());
        if usage != stored.usage {
            self.ctx.state.save_usage(&usage);
        }

        self.daily = DailyState {
            current: stored.current,
            pending: stored.pending,
            usage,
        };
        self.suppressions = self.ctx.state.load_suppressions();
        self.selection = self.ctx.state.load_tracked_apps();
        self.recompute_enforcement()?;

        if matches!(outcome, RolloverOutcome::Promoted { .. }) {
            self.refresh_monitoring("rollover");
        }
        Ok(outcome)
    }

    /// Shield exactly the apps that are over budget and not unlocked,
    /// replacing whatever was shielded before.
    pub fn recompute_enforcement(&mut self) -> Result<BTreeSet<AppId>> {
        let now = self.ctx.clock.now_utc();
        if !self.suppressions.prune_expired(now).is_empty() {
            self.ctx.state.save_suppressions(&self.suppressions);
        }

        let tracked = self.tracked_apps();
        let blocked: BTreeSet<AppId> =
            blocked_apps(&self.daily.current, &self.daily.usage, &self.suppressions, now)
                .into_iter()
                .filter(|app| tracked.contains(app))
                .collect();
        let previous = self.ctx.enforcement.shielded();
        let newly = blocked.difference(&previous).count();

        let mut contributions = ShieldContributions::default();
        if blocked.is_empty() {
            self.ctx.enforcement.clear()?;
        } else {
            self.ctx.enforcement.replace(&blocked)?;
            contributions.add(&ScheduleName::Daily.to_string(), blocked.iter().cloned());
        }
        self.ctx.state.save_contributions(&contributions);

        if newly > 0 {
            let mut counters = self.ctx.state.load_counters(self.daily.current.day);
            counters.block_count = counters
                .block_count
                .saturating_add(u32::try_from(newly).unwrap_or(u32::MAX));
            self.ctx.state.save_counters(&counters);
            tracing::info!(newly, blocked = blocked.len(), "apps blocked");
        }
        Ok(blocked)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn current_limits(&self) -> &LimitSet {
        &self.daily.current
    }

    pub fn pending_limits(&self) -> &LimitSet {
        &self.daily.pending
    }

    pub fn today_usage(&self) -> &UsageRecord {
        &self.daily.usage
    }

    pub fn suppressions(&self) -> &SuppressionSet {
        &self.suppressions
    }

    pub fn block_count_today(&self) -> u32 {
        self.ctx.state.load_counters(self.daily.current.day).block_count
    }

    pub fn donations_today_cents(&self) -> u64 {
        self.ctx
            .state
            .load_counters(self.daily.current.day)
            .donations_cents
    }

    pub fn day_summaries(&self) -> Vec<DaySummary> {
        self.ctx.state.summaries()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    fn ensure_today(&mut self) -> Result<()> {
        self.check_day_boundary().map(|_| ())
    }

    fn limits_changed(&mut self, reason: &str) -> Result<()> {
        self.ctx.state.save_current(&self.daily.current);
        self.ctx.state.save_pending(&self.daily.pending);
        self.refresh_monitoring(reason);
        self.recompute_enforcement()?;
        Ok(())
    }

    fn refresh_monitoring(&self, reason: &str) {
        if let Err(e) = self.scheduler.refresh(reason) {
            tracing::warn!(reason, error = %e, "threshold registration failed");
        }
    }
}

/// Check for a day-boundary crossing every `period` until `shutdown` fires
/// or its sender is dropped.
pub async fn run_day_boundary_checks(
    controller: Arc<Mutex<DailyLimitsController>>,
    period: std::time::Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut controller = controller.lock().await;
                match controller.check_day_boundary() {
                    Ok(RolloverOutcome::Current) => {}
                    Ok(outcome) => tracing::info!(?outcome, "day boundary handled"),
                    Err(e) => tracing::warn!(error = %e, "day boundary check failed"),
                }
            }
            _ = &mut shutdown => break,
        }
    }
    tracing::debug!("day boundary checks stopped");
}
