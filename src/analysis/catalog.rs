use crate::error::{EcoError, Result};
use crate::models::issue::IssueCategory;
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub const BUG_FIX_POINTS: u32 = 10;
pub const ECO_TIP_POINTS: u32 = 5;

/// Predicate over raw code text. No parsing, only pattern classification.
#[derive(Debug, Clone)]
pub enum Detector {
    Pattern(Regex),
    Predicate(fn(&str) -> bool),
}

impl Detector {
    pub fn matches(&self, code: &str) -> bool {
        match self {
            Detector::Pattern(re) => re.is_match(code),
            Detector::Predicate(check) => check(code),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuePattern {
    pub id: String,
    pub detector: Detector,
    pub reward_points: u32,
    pub category: IssueCategory,
    pub message: String,
    pub suggestion: String,
    /// Language tags this pattern applies to; empty means every language.
    pub languages: Vec<String>,
}

impl IssuePattern {
    pub fn regex(
        id: &str,
        pattern: &str,
        category: IssueCategory,
        message: &str,
        suggestion: &str,
    ) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| EcoError::Config(format!("Invalid detector for {id}: {e}")))?;
        Ok(Self::new(id, Detector::Pattern(re), category, message, suggestion))
    }

    pub fn predicate(
        id: &str,
        check: fn(&str) -> bool,
        category: IssueCategory,
        message: &str,
        suggestion: &str,
    ) -> Self {
        Self::new(id, Detector::Predicate(check), category, message, suggestion)
    }

    fn new(
        id: &str,
        detector: Detector,
        category: IssueCategory,
        message: &str,
        suggestion: &str,
    ) -> Self {
        let reward_points = match category {
            IssueCategory::BugFix => BUG_FIX_POINTS,
            IssueCategory::EcoTip => ECO_TIP_POINTS,
        };
        Self {
            id: id.to_string(),
            detector,
            reward_points,
            category,
            message: message.to_string(),
            suggestion: suggestion.to_string(),
            languages: Vec::new(),
        }
    }

    pub fn with_reward(mut self, reward_points: u32) -> Self {
        self.reward_points = reward_points;
        self
    }

    pub fn for_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_lowercase()).collect();
        self
    }

    pub fn applies_to(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    pub fn is_bug_fix(&self) -> bool {
        self.category == IssueCategory::BugFix
    }
}

/// Ordered, immutable registry of issue patterns.
#[derive(Debug, Clone)]
pub struct IssueCatalog {
    patterns: Vec<IssuePattern>,
    index: HashMap<String, usize>,
}

impl IssueCatalog {
    pub fn new(patterns: Vec<IssuePattern>) -> Result<Self> {
        let mut index = HashMap::with_capacity(patterns.len());
        for (position, pattern) in patterns.iter().enumerate() {
            if pattern.reward_points == 0 {
                return Err(EcoError::Config(format!(
                    "Pattern {} must award at least one point",
                    pattern.id
                )));
            }
            if index.insert(pattern.id.clone(), position).is_some() {
                return Err(EcoError::Config(format!("Duplicate pattern id: {}", pattern.id)));
            }
        }
        Ok(Self { patterns, index })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(builtin_patterns()?)
    }

    pub fn all_patterns(&self) -> &[IssuePattern] {
        &self.patterns
    }

    pub fn by_id(&self, id: &str) -> Result<&IssuePattern> {
        self.index
            .get(id)
            .map(|&position| &self.patterns[position])
            .ok_or_else(|| EcoError::NotFound(format!("Issue pattern {id}")))
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Sorts ids into catalog order. Unknown ids are an error.
    pub fn ordered<'a, I>(&self, ids: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut positioned = ids
            .into_iter()
            .map(|id| {
                self.position(id)
                    .map(|position| (position, id.to_string()))
                    .ok_or_else(|| EcoError::NotFound(format!("Issue pattern {id}")))
            })
            .collect::<Result<Vec<_>>>()?;
        positioned.sort_by_key(|(position, _)| *position);
        Ok(positioned.into_iter().map(|(_, id)| id).collect())
    }

    /// Catalog without the given pattern ids.
    pub fn without(&self, disabled: &[String]) -> Result<Self> {
        let disabled: HashSet<&str> = disabled.iter().map(String::as_str).collect();
        Self::new(
            self.patterns
                .iter()
                .filter(|p| !disabled.contains(p.id.as_str()))
                .cloned()
                .collect(),
        )
    }
}

fn builtin_patterns() -> Result<Vec<IssuePattern>> {
    use IssueCategory::{BugFix, EcoTip};

    Ok(vec![
        IssuePattern::regex(
            "var-declaration",
            r"\bvar\s+\w+",
            BugFix,
            "Using 'var' instead of 'const'/'let'",
            "Use block-scoped 'const' or 'let' instead of 'var'.",
        )?
        .for_languages(&["javascript", "typescript"]),
        IssuePattern::regex(
            "nested-loops",
            r"for\s*\([^)]*\)\s*\{[^{}]*for\s*\([^)]*\)",
            BugFix,
            "Nested loops detected",
            "Avoid nested loops. Consider more efficient algorithms or data structures.",
        )?,
        IssuePattern::predicate(
            "unused-variable",
            has_unused_variable,
            BugFix,
            "Variable declared but never used",
            "Remove unused variables to improve code efficiency.",
        ),
        IssuePattern::regex(
            "infinite-loop",
            r"while\s*\(\s*true\s*\)|while\s+True\s*:",
            BugFix,
            "Potential infinite loop",
            "Avoid infinite loops (while true) unless absolutely necessary.",
        )?,
        IssuePattern::regex(
            "empty-catch",
            r"catch\s*(\([^)]*\))?\s*\{\s*\}|except[^:\n]*:\s*pass\b",
            BugFix,
            "Empty error handler swallows failures",
            "Handle or log the error instead of silently ignoring it.",
        )?,
        IssuePattern::regex(
            "console-log",
            r"console\.log\s*\(",
            EcoTip,
            "Console.log statements present",
            "Avoid unnecessary console.log in production.",
        )?
        .for_languages(&["javascript", "typescript"]),
        IssuePattern::regex(
            "debug-print",
            r"(?m)^[ \t]*print\s*\(",
            EcoTip,
            "print() statements present",
            "Avoid unnecessary print() in production.",
        )?
        .for_languages(&["python"]),
        IssuePattern::regex(
            "for-of-loop",
            r"for\s*\(\s*(let|const|var)\s+\w+\s+of\s+\w+\s*\)\s*\{",
            EcoTip,
            "for...of loop could be a map()",
            "Use map() instead of a for loop when building a new array.",
        )?
        .for_languages(&["javascript", "typescript"]),
        IssuePattern::regex(
            "push-in-loop",
            r"(for|while)\s*\([^)]*\)\s*\{[^}]*\.push\(",
            EcoTip,
            "Array push inside a loop",
            "Avoid .push() in loops for large arrays. Pre-allocate or use array methods.",
        )?
        .for_languages(&["javascript", "typescript"]),
        IssuePattern::regex(
            "append-in-loop",
            r"for\s+\w+\s+in\s+[^:\n]+:[ \t]*\n(?:[ \t]+.*\n)*?[ \t]+\w+\.append\(",
            EcoTip,
            "list.append inside a loop",
            "Use list/set comprehensions for better efficiency.",
        )?
        .for_languages(&["python"]),
        IssuePattern::regex(
            "string-concat-in-loop",
            r#"(?:for|while)\s*\([^)]*\)\s*\{[^}]*\w+\s*\+=\s*["'`]|(?:for|while)\s[^:\n]*:[ \t]*\n(?:[ \t]+.*\n)*?[ \t]+\w+\s*\+=\s*["']"#,
            EcoTip,
            "String concatenation inside a loop",
            "Avoid string concatenation in loops. Use join() or template literals.",
        )?,
    ])
}

/// `let name = ...` where `name` never appears again.
fn has_unused_variable(code: &str) -> bool {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in code.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if !word.is_empty() {
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let words: Vec<&str> = code.split_whitespace().collect();
    words.windows(2).any(|pair| {
        if pair[0] != "let" {
            return false;
        }
        let name: String = pair[1]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        !name.is_empty() && counts.get(name.as_str()).copied().unwrap_or(0) == 1
    })
}
