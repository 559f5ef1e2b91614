use crate::analysis::catalog::IssueCatalog;
use crate::models::issue::IssueSet;
use std::sync::Arc;

/// Stateless scanner: every pattern is evaluated on its own.
#[derive(Debug, Clone)]
pub struct IssueScanner {
    catalog: Arc<IssueCatalog>,
}

impl IssueScanner {
    pub fn new(catalog: Arc<IssueCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<IssueCatalog> {
        &self.catalog
    }

    pub fn scan(&self, code: &str) -> IssueSet {
        self.catalog
            .all_patterns()
            .iter()
            .filter(|pattern| pattern.detector.matches(code))
            .map(|pattern| pattern.id.clone())
            .collect()
    }

    /// Like `scan`, restricted to patterns scoped to `language`.
    pub fn scan_language(&self, code: &str, language: &str) -> IssueSet {
        self.catalog
            .all_patterns()
            .iter()
            .filter(|pattern| pattern.applies_to(language))
            .filter(|pattern| pattern.detector.matches(code))
            .map(|pattern| pattern.id.clone())
            .collect()
    }
}

/// Maps an editor language id or file extension to a language tag.
pub fn detect_language(hint: &str) -> String {
    match hint.rsplit('.').next().unwrap_or(hint).to_lowercase().as_str() {
        "ts" | "tsx" | "typescript" | "typescriptreact" => "typescript".to_string(),
        "js" | "jsx" | "mjs" | "cjs" | "javascript" | "javascriptreact" => "javascript".to_string(),
        "py" | "python" => "python".to_string(),
        _ => "unknown".to_string(),
    }
}
