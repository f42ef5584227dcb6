//! Company catalog loaded from the tickers CSV
//!
//! The CSV carries `BSE Code`, `Company Name` and `Yahoo Symbol` columns.
//! Search results serialize with the same column names.

use crate::core::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

const MAX_MATCHES: usize = 10;
const MIN_QUERY_LEN: usize = 2;

/// One listed company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "BSE Code")]
    pub bse_code: String,
    #[serde(rename = "Company Name")]
    pub company_name: String,
    #[serde(rename = "Yahoo Symbol", default)]
    pub yahoo_symbol: String,
}

/// In-memory list of companies, searchable by name or BSE code
#[derive(Debug, Clone, Default)]
pub struct CompanyCatalog {
    companies: Vec<Company>,
}

impl CompanyCatalog {
    pub fn new(companies: Vec<Company>) -> Self {
        Self { companies }
    }

    /// Load the catalog from disk
    ///
    /// A missing or unreadable file yields an empty catalog so the rest of
    /// the service keeps running; search then returns nothing.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let loaded = std::fs::File::open(path)
            .map_err(|e| AppError::Config(format!("cannot open {}: {}", path.display(), e)))
            .and_then(Self::from_reader);

        match loaded {
            Ok(catalog) => {
                tracing::info!(path = %path.display(), companies = catalog.len(), "company catalog loaded");
                catalog
            }
            Err(e) => {
                tracing::error!(error = %e, "company list not available, search will not work");
                Self::default()
            }
        }
    }

    /// Parse CSV content; malformed rows are skipped
    pub fn from_reader<R: Read>(reader: R) -> AppResult<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv
            .headers()
            .map_err(|e| AppError::Config(format!("invalid company CSV: {}", e)))?;
        if !headers.iter().any(|h| h == "BSE Code") {
            return Err(AppError::Config(
                "company CSV has no 'BSE Code' column".to_string(),
            ));
        }

        let mut companies = Vec::new();
        for (line, row) in csv.deserialize::<Company>().enumerate() {
            match row {
                Ok(company) if !company.bse_code.is_empty() => companies.push(company),
                Ok(_) => {}
                Err(e) => tracing::debug!(line = line + 2, error = %e, "skipping company row"),
            }
        }

        Ok(Self { companies })
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    /// Companies whose name contains `query` (case-insensitive) or whose BSE
    /// code starts with it
    pub fn search(&self, query: &str) -> Vec<Company> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }

        let needle = query.to_lowercase();
        self.companies
            .iter()
            .filter(|c| c.company_name.to_lowercase().contains(&needle) || c.bse_code.starts_with(query))
            .take(MAX_MATCHES)
            .cloned()
            .collect()
    }

    pub fn find_by_code(&self, bse_code: &str) -> Option<&Company> {
        let code = bse_code.trim();
        self.companies.iter().find(|c| c.bse_code == code)
    }

    /// Yahoo Finance symbol for a BSE code, if one is listed
    pub fn yahoo_symbol(&self, bse_code: &str) -> Option<&str> {
        self.find_by_code(bse_code)
            .map(|c| c.yahoo_symbol.trim())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
BSE Code,Company Name,Yahoo Symbol
500325,Reliance Industries Ltd,RELIANCE.NS
532540,Tata Consultancy Services Ltd,TCS.NS
500570,Tata Motors Ltd,
500180,HDFC Bank Ltd,HDFCBANK.NS
";

    fn catalog() -> CompanyCatalog {
        CompanyCatalog::from_reader(SAMPLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_short_query_returns_nothing() {
        assert!(catalog().search("t").is_empty());
        assert!(catalog().search("  ").is_empty());
    }

    #[test]
    fn test_search_by_name_is_case_insensitive() {
        let matches = catalog().search("tata");
        let codes: Vec<_> = matches.iter().map(|c| c.bse_code.as_str()).collect();
        assert_eq!(codes, vec!["532540", "500570"]);
    }

    #[test]
    fn test_search_by_code_prefix() {
        let matches = catalog().search("500");
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|c| c.bse_code.starts_with("500")));
    }

    #[test]
    fn test_search_caps_results() {
        let mut csv = String::from("BSE Code,Company Name,Yahoo Symbol\n");
        for i in 0..25 {
            csv.push_str(&format!("5{:05},Alpha {} Ltd,A{}.NS\n", i, i, i));
        }
        let catalog = CompanyCatalog::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(catalog.search("alpha").len(), 10);
    }

    #[test]
    fn test_search_serializes_with_csv_columns() {
        let matches = catalog().search("Reliance");
        let json = serde_json::to_value(&matches).unwrap();
        assert_eq!(json[0]["BSE Code"], "500325");
        assert_eq!(json[0]["Company Name"], "Reliance Industries Ltd");
    }

    #[test]
    fn test_yahoo_symbol_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.yahoo_symbol("500325"), Some("RELIANCE.NS"));
        assert_eq!(catalog.yahoo_symbol("500570"), None);
        assert_eq!(catalog.yahoo_symbol("999999"), None);
    }

    #[test]
    fn test_missing_file_gives_empty_catalog() {
        let catalog = CompanyCatalog::load("/definitely/not/here.csv");
        assert!(catalog.is_empty());
        assert!(catalog.search("reliance").is_empty());
    }

    #[test]
    fn test_csv_without_code_column_is_rejected() {
        let err = CompanyCatalog::from_reader("Name,Symbol\nA,B\n".as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
