//! Scheduled jobs triggered through the `/cron/*` routes
//!
//! A run walks every user that has scrips, delivers the job's notification
//! and writes one `cron_run_logs` row per user. Users missing scrips or
//! recipients are skipped (and logged as such); a failing user never stops
//! the run.

use crate::clock::{MarketWindow, ist_now};
use crate::core::error::AppResult;
use crate::core::model::{CronRunLog, MonitoredScrip, TelegramRecipient};
use crate::core::store::Store;
use crate::notify::Notifier;
use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

const MAX_RUNS: usize = 10;
const MAX_RUN_ITEMS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    BseAnnouncements,
    HourlySpikeAlerts,
    EveningSummary,
    /// Evening summary fired by hand, always forced
    EveningSummaryTest,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::BseAnnouncements => "bse_announcements",
            JobKind::HourlySpikeAlerts => "hourly_spike_alerts",
            JobKind::EveningSummary => "evening_summary",
            JobKind::EveningSummaryTest => "evening_summary_test",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bse_announcements" => Some(JobKind::BseAnnouncements),
            "hourly_spike_alerts" => Some(JobKind::HourlySpikeAlerts),
            "evening_summary" => Some(JobKind::EveningSummary),
            "evening_summary_test" => Some(JobKind::EveningSummaryTest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Announcement lookback in hours
    pub hours_back: i64,
    /// Send the evening summary even before market close
    pub force: bool,
    /// Override for the current IST time
    pub now: Option<DateTime<FixedOffset>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            hours_back: 1,
            force: false,
            now: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub users_processed: u32,
    pub notifications_sent: u32,
    pub users_skipped: u32,
    pub recipients: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserError {
    pub user_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub job: JobKind,
    #[serde(flatten)]
    pub totals: RunTotals,
    pub errors: Vec<UserError>,
}

#[derive(Clone)]
pub struct CronRunner {
    store: Arc<dyn Store>,
    notifier: Notifier,
}

impl CronRunner {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub async fn run(&self, job: JobKind, options: RunOptions) -> AppResult<RunReport> {
        let run_id = Uuid::new_v4();
        let now = options.now.unwrap_or_else(ist_now);
        tracing::info!(%run_id, job = job.name(), "cron run started");

        let scrips = self.store.list_all_scrips().await?;
        let recipients = self.store.list_all_recipients().await?;

        let mut scrips_by_user: IndexMap<Uuid, Vec<MonitoredScrip>> = IndexMap::new();
        for scrip in scrips {
            scrips_by_user.entry(scrip.user_id).or_default().push(scrip);
        }
        let mut recipients_by_user: HashMap<Uuid, Vec<TelegramRecipient>> = HashMap::new();
        for recipient in recipients {
            recipients_by_user
                .entry(recipient.user_id)
                .or_default()
                .push(recipient);
        }

        let mut totals = RunTotals::default();
        let mut errors = Vec::new();

        for (user_id, user_scrips) in &scrips_by_user {
            let user_recipients = recipients_by_user
                .get(user_id)
                .map(Vec::as_slice)
                .unwrap_or_default();

            if user_scrips.is_empty() || user_recipients.is_empty() {
                totals.users_skipped += 1;
                self.log_user(run_id, job, user_id, false, 0, user_recipients.len())
                    .await;
                continue;
            }

            let outcome = self
                .deliver(job, &options, now, user_id, user_scrips, user_recipients)
                .await;
            match outcome {
                Ok(sent) => {
                    totals.users_processed += 1;
                    totals.notifications_sent += sent;
                    totals.recipients += user_recipients.len() as u32;
                    self.log_user(run_id, job, user_id, true, sent, user_recipients.len())
                        .await;
                }
                Err(e) => {
                    tracing::warn!(%run_id, user_id = %user_id, error = %e, "cron delivery failed");
                    errors.push(UserError {
                        user_id: *user_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            %run_id,
            job = job.name(),
            processed = totals.users_processed,
            skipped = totals.users_skipped,
            sent = totals.notifications_sent,
            errors = errors.len(),
            "cron run finished"
        );

        Ok(RunReport {
            run_id,
            job,
            totals,
            errors,
        })
    }

    async fn deliver(
        &self,
        job: JobKind,
        options: &RunOptions,
        now: DateTime<FixedOffset>,
        user_id: &Uuid,
        scrips: &[MonitoredScrip],
        recipients: &[TelegramRecipient],
    ) -> AppResult<u32> {
        match job {
            JobKind::BseAnnouncements => {
                self.notifier
                    .send_announcements(user_id, scrips, recipients, options.hours_back)
                    .await
            }
            JobKind::HourlySpikeAlerts => {
                self.notifier
                    .send_spike_alerts_at(now, user_id, scrips, recipients)
                    .await
            }
            JobKind::EveningSummary => {
                if !options.force && !MarketWindow::at(now).is_after_close(now) {
                    return Ok(0);
                }
                self.notifier
                    .send_market_summary(user_id, scrips, recipients)
                    .await
            }
            JobKind::EveningSummaryTest => {
                self.notifier
                    .send_market_summary(user_id, scrips, recipients)
                    .await
            }
        }
    }

    async fn log_user(
        &self,
        run_id: Uuid,
        job: JobKind,
        user_id: &Uuid,
        processed: bool,
        sent: u32,
        recipients: usize,
    ) {
        let log = CronRunLog {
            id: None,
            run_id,
            job: job.name().to_string(),
            user_id: Some(*user_id),
            processed,
            notifications_sent: sent,
            recipients: recipients as u32,
            run_at: None,
        };
        if let Err(e) = self.store.insert_cron_log(log).await {
            tracing::error!(%run_id, user_id = %user_id, error = %e, "failed to log cron run");
        }
    }
}

/// Aggregated view of one cron run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_at: Option<DateTime<Utc>>,
    pub job: String,
    pub total_users: usize,
    pub processed_users: usize,
    pub skipped_users: usize,
    pub total_notifications: u32,
    pub total_recipients: u32,
    pub items: Vec<CronRunLog>,
}

/// Group log rows by run, newest run first
pub fn summarize_runs(rows: &[CronRunLog]) -> Vec<RunSummary> {
    let mut grouped: IndexMap<Uuid, Vec<&CronRunLog>> = IndexMap::new();
    for row in rows {
        grouped.entry(row.run_id).or_default().push(row);
    }

    let mut runs: Vec<RunSummary> = grouped
        .into_iter()
        .filter_map(|(run_id, items)| {
            let newest = items.iter().max_by_key(|i| i.run_at)?;
            let users: HashSet<Uuid> = items.iter().filter_map(|i| i.user_id).collect();

            let mut sorted: Vec<CronRunLog> = items.iter().map(|i| (*i).clone()).collect();
            sorted.sort_by_key(|i| i.user_id);
            sorted.truncate(MAX_RUN_ITEMS);

            Some(RunSummary {
                run_id,
                run_at: newest.run_at,
                job: newest.job.clone(),
                total_users: users.len(),
                processed_users: items.iter().filter(|i| i.processed).count(),
                skipped_users: items.iter().filter(|i| !i.processed).count(),
                total_notifications: items.iter().map(|i| i.notifications_sent).sum(),
                total_recipients: items.iter().map(|i| i.recipients).sum(),
                items: sorted,
            })
        })
        .collect();

    runs.sort_by(|a, b| b.run_at.cmp(&a.run_at));
    runs.truncate(MAX_RUNS);
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn row(run_id: Uuid, user: Option<Uuid>, processed: bool, sent: u32, minute: i64) -> CronRunLog {
        CronRunLog {
            id: None,
            run_id,
            job: "bse_announcements".to_string(),
            user_id: user,
            processed,
            notifications_sent: sent,
            recipients: 1,
            run_at: Some(Utc.with_ymd_and_hms(2024, 3, 13, 10, 0, 0).unwrap() + Duration::minutes(minute)),
        }
    }

    #[test]
    fn test_job_names_round_trip() {
        for job in [
            JobKind::BseAnnouncements,
            JobKind::HourlySpikeAlerts,
            JobKind::EveningSummary,
            JobKind::EveningSummaryTest,
        ] {
            assert_eq!(JobKind::from_name(job.name()), Some(job));
        }
        assert_eq!(JobKind::from_name("nightly"), None);
    }

    #[test]
    fn test_summarize_groups_by_run() {
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = vec![
            row(older, Some(a), true, 2, 0),
            row(older, Some(b), false, 0, 1),
            row(newer, Some(a), true, 3, 60),
            row(newer, Some(b), true, 1, 61),
            row(newer, Some(b), true, 1, 62),
        ];

        let runs = summarize_runs(&rows);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, newer);
        assert_eq!(runs[0].total_users, 2);
        assert_eq!(runs[0].processed_users, 3);
        assert_eq!(runs[0].total_notifications, 5);
        assert_eq!(runs[0].run_at, rows[4].run_at);

        assert_eq!(runs[1].run_id, older);
        assert_eq!(runs[1].processed_users, 1);
        assert_eq!(runs[1].skipped_users, 1);
        assert_eq!(runs[1].total_recipients, 2);
    }

    #[test]
    fn test_summarize_caps_runs_and_items() {
        let mut rows = Vec::new();
        for r in 0..12 {
            rows.push(row(Uuid::new_v4(), Some(Uuid::new_v4()), true, 1, r));
        }
        let big_run = Uuid::new_v4();
        for _ in 0..60 {
            rows.push(row(big_run, Some(Uuid::new_v4()), true, 0, 100));
        }

        let runs = summarize_runs(&rows);
        assert_eq!(runs.len(), 10);
        assert_eq!(runs[0].run_id, big_run);
        assert_eq!(runs[0].items.len(), 50);
        assert_eq!(runs[0].total_users, 60);
        let ids: Vec<_> = runs[0].items.iter().map(|i| i.user_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
