//! HTML pages, embedded in the binary
//!
//! Templates use tera inheritance from `base.html`. Autoescaping is on for
//! every `.html` template.

use crate::core::error::AppResult;
use axum::response::Html;
use tera::{Context, Tera};

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("dashboard.html", include_str!("../../templates/dashboard.html")),
    (
        "sentiment_analysis.html",
        include_str!("../../templates/sentiment_analysis.html"),
    ),
    (
        "admin_dashboard.html",
        include_str!("../../templates/admin_dashboard.html"),
    ),
    (
        "admin_cron_runs.html",
        include_str!("../../templates/admin_cron_runs.html"),
    ),
];

pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> AppResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        tera.autoescape_on(vec![".html"]);
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> AppResult<Html<String>> {
        Ok(Html(self.tera.render(name, context)?))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tera.get_template_names().collect()
    }
}
