//! Per-user Telegram deliveries: price summaries, BSE announcements and
//! hourly spike alerts
//!
//! Every delivery returns the number of messages Telegram accepted. Failures
//! for a single recipient are logged and do not abort the delivery.

use crate::bse::{Announcement, BseClient, LOOKBACK_DAYS, category_allowed};
use crate::catalog::CompanyCatalog;
use crate::clock::{MarketWindow, ist_now};
use crate::core::error::{AppError, AppResult};
use crate::core::model::{MonitoredScrip, SeenAnnouncement, TelegramRecipient};
use crate::core::store::Store;
use crate::market::{HourlyMove, YahooClient, format_inr};
use crate::telegram::{TelegramClient, escape_html};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

const MAX_LINES_PER_SCRIP: usize = 5;

/// Price figures for one scrip in the market summary
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteLine {
    pub company_name: String,
    pub bse_code: String,
    pub symbol: String,
    pub price: Option<f64>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
}

impl QuoteLine {
    fn has_data(&self) -> bool {
        self.price.is_some() || self.ma50.is_some() || self.ma200.is_some()
    }
}

/// HTML price summary; company names are escaped
pub fn market_summary_text(now: DateTime<FixedOffset>, quotes: &[QuoteLine]) -> String {
    let mut lines = vec![
        "📊 Market Update".to_string(),
        format!("🕐 {} IST", now.format("%Y-%m-%d %H:%M:%S")),
        String::new(),
    ];

    for quote in quotes {
        lines.push(format!(
            "• {} ({})",
            escape_html(&quote.company_name),
            escape_html(&quote.bse_code)
        ));
        lines.push(format!("  - Price: {}", format_inr(quote.price)));
        lines.push(format!(
            "  - MA50: {} | MA200: {}",
            format_inr(quote.ma50),
            format_inr(quote.ma200)
        ));
        lines.push(String::new());
    }

    let failed: Vec<String> = quotes
        .iter()
        .filter(|q| !q.has_data())
        .map(|q| format!("{} ({})", escape_html(&q.company_name), escape_html(&q.symbol)))
        .collect();
    if !failed.is_empty() {
        lines.push(format!("⚠️ Could not fetch data for: {}", failed.join(", ")));
    }

    lines.join("\n").trim().to_string()
}

/// HTML summary grouped by scrip, newest first, at most five lines per scrip
///
/// `items` must already be sorted newest first.
pub fn announcement_summary_text(
    now: DateTime<FixedOffset>,
    items: &[Announcement],
    names: &HashMap<String, String>,
) -> String {
    let mut by_scrip: IndexMap<&str, Vec<&Announcement>> = IndexMap::new();
    for item in items {
        by_scrip.entry(item.scrip_code.as_str()).or_default().push(item);
    }

    let mut lines = vec![
        "📰 BSE Announcements".to_string(),
        format!("🕐 {} IST", now.format("%Y-%m-%d %H:%M:%S")),
        String::new(),
    ];
    for (code, group) in by_scrip {
        let name = names.get(code).map(String::as_str).unwrap_or(code);
        lines.push(format!("• {}", escape_html(name)));
        for item in group.iter().take(MAX_LINES_PER_SCRIP) {
            lines.push(format!(
                "  - {} — {}",
                item.ann_dt.format("%d-%m %H:%M"),
                escape_html(&item.headline)
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n").trim().to_string()
}

pub fn announcement_caption(company_name: &str, item: &Announcement) -> String {
    format!(
        "Company: {}\nAnnouncement: {}\nDate: {} IST",
        escape_html(company_name),
        escape_html(&item.headline),
        item.ann_dt.format("%d-%m-%Y %H:%M")
    )
}

/// A scrip that crossed the spike threshold
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeLine {
    pub company_name: String,
    pub bse_code: String,
    pub movement: HourlyMove,
}

/// HTML spike alert; company names are escaped
pub fn spike_alert_text(now: DateTime<FixedOffset>, threshold_pct: f64, spikes: &[SpikeLine]) -> String {
    let mut lines = vec![
        "⚡ Price Spike Alert".to_string(),
        format!("🕐 {} IST", now.format("%Y-%m-%d %H:%M:%S")),
        format!("Moves of {:.1}% or more in the last hour", threshold_pct),
        String::new(),
    ];
    for spike in spikes {
        let arrow = if spike.movement.change_pct >= 0.0 { "📈" } else { "📉" };
        lines.push(format!(
            "• {} ({}): {} {:+.2}% ({} → {})",
            escape_html(&spike.company_name),
            escape_html(&spike.bse_code),
            arrow,
            spike.movement.change_pct,
            format_inr(Some(spike.movement.reference)),
            format_inr(Some(spike.movement.latest)),
        ));
    }
    lines.join("\n").trim().to_string()
}

fn display_names(scrips: &[MonitoredScrip]) -> HashMap<String, String> {
    scrips
        .iter()
        .map(|s| (s.bse_code.clone(), s.display_name().to_string()))
        .collect()
}

/// Delivers notifications for one user at a time
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn Store>,
    catalog: Arc<CompanyCatalog>,
    yahoo: YahooClient,
    bse: BseClient,
    telegram: TelegramClient,
    spike_threshold_pct: f64,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<CompanyCatalog>,
        yahoo: YahooClient,
        bse: BseClient,
        telegram: TelegramClient,
        spike_threshold_pct: f64,
    ) -> Self {
        Self {
            store,
            catalog,
            yahoo,
            bse,
            telegram,
            spike_threshold_pct,
        }
    }

    fn ensure_telegram(&self) -> AppResult<()> {
        if self.telegram.is_configured() {
            Ok(())
        } else {
            Err(AppError::Config(
                "Telegram bot token missing. Set TELEGRAM_BOT_TOKEN and restart the app."
                    .to_string(),
            ))
        }
    }

    /// Send `text` to every recipient, counting accepted messages
    async fn broadcast(&self, recipients: &[TelegramRecipient], text: &str) -> u32 {
        let mut sent = 0;
        for recipient in recipients {
            match self.telegram.send_message(&recipient.chat_id, text).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(chat_id = %recipient.chat_id, error = %e, "telegram send failed")
                }
            }
        }
        sent
    }

    /// Consolidated price and moving-average message, one per recipient
    pub async fn send_market_summary(
        &self,
        user_id: &Uuid,
        scrips: &[MonitoredScrip],
        recipients: &[TelegramRecipient],
    ) -> AppResult<u32> {
        self.ensure_telegram()?;

        let mut quotes = Vec::new();
        for scrip in scrips {
            let Some(symbol) = self.catalog.yahoo_symbol(&scrip.bse_code) else {
                tracing::warn!(bse_code = %scrip.bse_code, "no Yahoo Finance symbol for scrip");
                continue;
            };

            let price = self.yahoo.current_price(symbol).await;
            let (ma50, ma200) = self.yahoo.moving_averages(symbol).await;
            quotes.push(QuoteLine {
                company_name: scrip.display_name().to_string(),
                bse_code: scrip.bse_code.clone(),
                symbol: symbol.to_string(),
                price,
                ma50,
                ma200,
            });
        }

        if quotes.is_empty() {
            tracing::info!(user_id = %user_id, "no valid Yahoo symbols for monitored scrips");
            return Ok(0);
        }

        let text = market_summary_text(ist_now(), &quotes);
        let sent = self.broadcast(recipients, &text).await;
        tracing::info!(user_id = %user_id, sent, "market summary delivered");
        Ok(sent)
    }

    /// New announcements of the last `hours_back` hours with their PDFs
    ///
    /// Returns the number of summary messages delivered. Each collected
    /// announcement is marked seen, even when its PDF could not be fetched.
    pub async fn send_announcements(
        &self,
        user_id: &Uuid,
        scrips: &[MonitoredScrip],
        recipients: &[TelegramRecipient],
        hours_back: i64,
    ) -> AppResult<u32> {
        self.ensure_telegram()?;

        let prefs = self.store.category_prefs(user_id).await.unwrap_or_else(|e| {
            tracing::warn!(user_id = %user_id, error = %e, "category prefs unavailable, using all");
            Vec::new()
        });
        // BSE is only queried for the last LOOKBACK_DAYS anyway
        let hours_back = hours_back.clamp(1, LOOKBACK_DAYS * 24);
        let since = ist_now() - ChronoDuration::hours(hours_back);

        let mut fresh = Vec::new();
        let mut ids = HashSet::new();
        for scrip in scrips {
            for item in self.bse.fetch_announcements(&scrip.bse_code, since).await {
                if !category_allowed(&prefs, &item.category) || ids.contains(&item.news_id) {
                    continue;
                }
                if self.store.seen_announcement_exists(user_id, &item.news_id).await? {
                    continue;
                }
                ids.insert(item.news_id.clone());
                fresh.push(item);
            }
        }

        if fresh.is_empty() {
            return Ok(0);
        }
        fresh.sort_by(|a, b| b.ann_dt.cmp(&a.ann_dt));

        let names = display_names(scrips);
        let summary = announcement_summary_text(ist_now(), &fresh, &names);
        let sent = self.broadcast(recipients, &summary).await;

        for item in &fresh {
            let company = names
                .get(&item.scrip_code)
                .map(String::as_str)
                .unwrap_or(&item.scrip_code);
            let caption = announcement_caption(company, item);

            match self.bse.fetch_pdf(&item.pdf_name).await {
                Ok(Some(bytes)) => {
                    for recipient in recipients {
                        let delivered = self
                            .telegram
                            .send_document(&recipient.chat_id, &item.pdf_name, bytes.clone(), &caption)
                            .await;
                        if let Err(e) = delivered {
                            tracing::warn!(chat_id = %recipient.chat_id, pdf = %item.pdf_name, error = %e, "document send failed");
                        }
                    }
                }
                Ok(None) => tracing::debug!(pdf = %item.pdf_name, "attachment not available"),
                Err(e) => tracing::warn!(pdf = %item.pdf_name, error = %e, "attachment download failed"),
            }

            let seen = SeenAnnouncement {
                user_id: *user_id,
                news_id: item.news_id.clone(),
                scrip_code: item.scrip_code.clone(),
                headline: item.headline.clone(),
                pdf_name: item.pdf_name.clone(),
                ann_date: item.ann_dt,
                caption,
            };
            if let Err(e) = self.store.save_seen_announcement(seen).await {
                tracing::warn!(news_id = %item.news_id, error = %e, "failed to record seen announcement");
            }
        }

        tracing::info!(user_id = %user_id, announcements = fresh.len(), sent, "announcements delivered");
        Ok(sent)
    }

    pub async fn send_spike_alerts(
        &self,
        user_id: &Uuid,
        scrips: &[MonitoredScrip],
        recipients: &[TelegramRecipient],
    ) -> AppResult<u32> {
        self.send_spike_alerts_at(ist_now(), user_id, scrips, recipients)
            .await
    }

    /// Spike alerts as of `now`; nothing is sent while the market is closed
    pub async fn send_spike_alerts_at(
        &self,
        now: DateTime<FixedOffset>,
        user_id: &Uuid,
        scrips: &[MonitoredScrip],
        recipients: &[TelegramRecipient],
    ) -> AppResult<u32> {
        if !MarketWindow::at(now).is_open {
            tracing::debug!(user_id = %user_id, "market closed, skipping spike alerts");
            return Ok(0);
        }
        self.ensure_telegram()?;

        let mut spikes = Vec::new();
        for scrip in scrips {
            let Some(symbol) = self.catalog.yahoo_symbol(&scrip.bse_code) else {
                continue;
            };
            if let Some(movement) = self.yahoo.hourly_move(symbol).await {
                if movement.is_spike(self.spike_threshold_pct) {
                    spikes.push(SpikeLine {
                        company_name: scrip.display_name().to_string(),
                        bse_code: scrip.bse_code.clone(),
                        movement,
                    });
                }
            }
        }

        if spikes.is_empty() {
            return Ok(0);
        }

        let text = spike_alert_text(now, self.spike_threshold_pct, &spikes);
        let sent = self.broadcast(recipients, &text).await;
        tracing::info!(user_id = %user_id, spikes = spikes.len(), sent, "spike alerts delivered");
        Ok(sent)
    }
}
