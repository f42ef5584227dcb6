//! `bse-monitor setup`: credential walkthrough for the sentiment sources
//!
//! Prompts for the X bearer token and the NewsAPI key, smoke-tests the
//! analyzer and writes an env template listing every variable the service
//! reads. Input and output are injected so the wizard runs under test.

use crate::config::AppConfig;
use crate::sentiment::SentimentAnalyzer;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const RULE: &str = "============================================================";

const SAMPLE_TEXTS: [&str; 3] = [
    "Reliance Industries reports strong quarterly results with 25% growth",
    "Reliance stock falls due to market concerns",
    "Reliance announces new digital initiatives",
];

#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Skip prompts and keep whatever the environment already provides
    pub non_interactive: bool,
    pub output: PathBuf,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            non_interactive: false,
            output: PathBuf::from("env_template.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetupOutcome {
    pub twitter_bearer_token: Option<String>,
    pub news_api_key: Option<String>,
    pub template_path: PathBuf,
}

impl SetupOutcome {
    pub fn any_configured(&self) -> bool {
        self.twitter_bearer_token.is_some() || self.news_api_key.is_some()
    }
}

pub fn run<R, W>(
    config: &AppConfig,
    options: &SetupOptions,
    input: &mut R,
    out: &mut W,
) -> Result<SetupOutcome>
where
    R: BufRead,
    W: Write,
{
    writeln!(out, "🚀 BSE MONITOR - API SETUP")?;
    writeln!(out, "{RULE}")?;

    writeln!(out, "\n🐦 X.COM (TWITTER) API SETUP:")?;
    writeln!(out, "1. Go to: https://developer.x.com/en/portal/dashboard")?;
    writeln!(out, "2. Sign in with your X (Twitter) account")?;
    writeln!(out, "3. Create a new app or use existing one")?;
    writeln!(out, "4. Go to 'Keys and Tokens' tab")?;
    writeln!(out, "5. Copy your 'Bearer Token'")?;
    let twitter = credential(
        options,
        config.twitter_bearer_token.clone(),
        "Enter your Twitter Bearer Token (or press Enter to skip): ",
        input,
        out,
    )?;
    match &twitter {
        Some(_) => writeln!(out, "✅ Twitter Bearer Token set")?,
        None => writeln!(out, "⚠️ Twitter API will not be available")?,
    }

    writeln!(out, "\n📰 NEWS API SETUP:")?;
    writeln!(out, "1. Go to: https://newsapi.org/")?;
    writeln!(out, "2. Sign up for a free account")?;
    writeln!(out, "3. Get your API key from the dashboard")?;
    let news = credential(
        options,
        config.news_api_key.clone(),
        "Enter your News API key (or press Enter to skip): ",
        input,
        out,
    )?;
    match &news {
        Some(_) => writeln!(out, "✅ News API key set")?,
        None => writeln!(out, "⚠️ News API will not be available")?,
    }
    writeln!(out, "\n{RULE}")?;

    test_analyzer(out)?;

    writeln!(out, "\n📝 CREATING ENVIRONMENT FILE:")?;
    writeln!(out, "{RULE}")?;
    write_template(&options.output, twitter.as_deref(), news.as_deref())?;
    writeln!(out, "✅ Created {}", options.output.display())?;
    writeln!(out, "📋 Copy this to .env and fill in your actual API keys")?;

    let outcome = SetupOutcome {
        twitter_bearer_token: twitter,
        news_api_key: news,
        template_path: options.output.clone(),
    };

    writeln!(out, "\n🎯 NEXT STEPS:")?;
    writeln!(out, "1. Copy {} to .env", options.output.display())?;
    writeln!(out, "2. Fill in your actual API keys in .env")?;
    writeln!(out, "3. Restart the server (bse-monitor serve)")?;
    writeln!(out, "4. Test sentiment analysis in the web interface")?;
    if outcome.any_configured() {
        writeln!(
            out,
            "\n✅ Your application is ready to use with the configured APIs!"
        )?;
    } else {
        writeln!(
            out,
            "\n⚠️ No APIs configured. The sentiment analysis will work with limited functionality."
        )?;
    }

    Ok(outcome)
}

/// Prompt for one credential; blank input skips it
fn credential<R: BufRead, W: Write>(
    options: &SetupOptions,
    existing: Option<String>,
    prompt: &str,
    input: &mut R,
    out: &mut W,
) -> Result<Option<String>> {
    if options.non_interactive {
        return Ok(existing.filter(|v| !v.trim().is_empty()));
    }

    write!(out, "\n{prompt}")?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("reading credential")?;
    let value = line.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn test_analyzer<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "\n🧪 TESTING SENTIMENT ANALYZER:")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Testing with stock: RELIANCE (Reliance Industries)")?;
    writeln!(out, "\n📊 Testing sentiment analysis on sample texts:")?;

    let analyzer = SentimentAnalyzer::new();
    for text in SAMPLE_TEXTS {
        let (score, label) = analyzer.analyze(text);
        let preview: String = text.chars().take(50).collect();
        writeln!(out, "   Text: {preview}...")?;
        writeln!(out, "   Sentiment: {} (Score: {score:.3})", label.as_str())?;
        writeln!(out)?;
    }
    writeln!(out, "✅ Sentiment analyzer is working correctly!")?;
    Ok(())
}

pub fn env_template(twitter: Option<&str>, news: Option<&str>) -> String {
    format!(
        "\
# BSE Monitor - Environment Variables
# Copy this file to .env and fill in your actual API keys

# Server
HOST=0.0.0.0
PORT=5000
RUST_LOG=bse_monitor=info,tower_http=info
# Optional YAML config file, overridden by the variables below
BSE_MONITOR_CONFIG=

# Twitter API Configuration
TWITTER_BEARER_TOKEN={twitter}

# News API Configuration
NEWS_API_KEY={news}

# Supabase Configuration
SUPABASE_URL=your_supabase_url_here
SUPABASE_SERVICE_KEY=your_supabase_service_key_here
SUPABASE_KEY=

# Firebase (sign-in)
FIREBASE_API_KEY=
FIREBASE_AUTH_DOMAIN=
FIREBASE_PROJECT_ID=

# Telegram Bot Configuration
TELEGRAM_BOT_TOKEN=

# Scheduler secret for /cron/* (?key=...)
CRON_SECRET_KEY=

# Market data
COMPANIES_CSV=indian_stock_tickers.csv
YAHOO_CACHE_TTL=60
SPIKE_THRESHOLD_PCT=3.0

# Admin and diagnostics
ADMIN_PURGE_SECRET=
DEBUG_ENDPOINTS=0
SECURE_COOKIES=0
",
        twitter = twitter.unwrap_or("your_twitter_bearer_token_here"),
        news = news.unwrap_or("your_news_api_key_here"),
    )
}

fn write_template(path: &Path, twitter: Option<&str>, news: Option<&str>) -> Result<()> {
    std::fs::write(path, env_template(twitter, news))
        .with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_interactive_run_writes_entered_token() {
        let dir = tempfile::tempdir().unwrap();
        let options = SetupOptions {
            non_interactive: false,
            output: dir.path().join("env_template.txt"),
        };
        let mut input = Cursor::new("tw-token\n\n");
        let mut out = Vec::new();

        let outcome = run(&AppConfig::default(), &options, &mut input, &mut out).unwrap();
        assert_eq!(outcome.twitter_bearer_token.as_deref(), Some("tw-token"));
        assert!(outcome.news_api_key.is_none());
        assert!(outcome.any_configured());

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("⚠️ News API will not be available"));
        assert!(printed.contains("Sentiment: Positive"));

        let template = std::fs::read_to_string(&options.output).unwrap();
        assert!(template.contains("TWITTER_BEARER_TOKEN=tw-token"));
        assert!(template.contains("NEWS_API_KEY=your_news_api_key_here"));
    }

    #[test]
    fn test_non_interactive_uses_environment() {
        let dir = tempfile::tempdir().unwrap();
        let options = SetupOptions {
            non_interactive: true,
            output: dir.path().join("env.txt"),
        };
        let config = AppConfig {
            news_api_key: Some("news-key".to_string()),
            ..AppConfig::default()
        };
        let mut out = Vec::new();

        let outcome = run(&config, &options, &mut Cursor::new(""), &mut out).unwrap();
        assert_eq!(outcome.news_api_key.as_deref(), Some("news-key"));
        assert!(outcome.twitter_bearer_token.is_none());
    }

    #[test]
    fn test_template_lists_every_variable() {
        let template = env_template(None, None);
        for key in [
            "PORT",
            "SUPABASE_URL",
            "TELEGRAM_BOT_TOKEN",
            "CRON_SECRET_KEY",
            "FIREBASE_API_KEY",
            "ADMIN_PURGE_SECRET",
            "DEBUG_ENDPOINTS",
        ] {
            assert!(template.contains(&format!("{key}=")), "{key} missing");
        }
    }
}
