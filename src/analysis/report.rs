use crate::analysis::catalog::IssueCatalog;
use crate::models::issue::IssueCategory;
use crate::models::progression::{FixResult, LEVEL_STEP};
use std::fmt::Write;

/// Plain-text summary of a snapshot, for status bars and notifications.
pub fn format_report(result: &FixResult, catalog: &IssueCatalog) -> String {
    let mut report = String::from("📊 Code Analysis Report:\n");

    if result.earned_points > 0 {
        let _ = writeln!(report, "🎉 Earned XP: +{}", result.earned_points);
        let fixed_bugs = messages_for(result, catalog, IssueCategory::BugFix);
        let applied_tips = messages_for(result, catalog, IssueCategory::EcoTip);
        if !fixed_bugs.is_empty() {
            let _ = writeln!(report, "✅ Fixed bugs:\n{}", bullet_list(&fixed_bugs));
        }
        if !applied_tips.is_empty() {
            let _ = writeln!(report, "🌱 Applied eco tips:\n{}", bullet_list(&applied_tips));
        }
    }

    if let Some(level_up) = result.level_up {
        let _ = writeln!(
            report,
            "\n🏆 LEVEL UP! Level {} → {}",
            level_up.old_level, level_up.new_level
        );
    }

    if !result.suggestions.is_empty() {
        let _ = writeln!(report, "\n💡 New Eco Tips:\n{}", bullet_list(&result.suggestions));
    }

    if !result.remaining_issue_ids.is_empty() {
        let _ = writeln!(report, "\n⚠️  Remaining issues: {}", result.remaining_issue_ids.len());
    }

    let next_level = result.level as u64 * LEVEL_STEP;
    let _ = write!(
        report,
        "\n🔥 XP: {}/{} | Level: {}",
        result.total_points, next_level, result.level
    );
    report
}

fn messages_for(result: &FixResult, catalog: &IssueCatalog, category: IssueCategory) -> Vec<String> {
    result
        .fixed_issue_ids
        .iter()
        .filter_map(|id| catalog.by_id(id).ok())
        .filter(|pattern| pattern.category == category)
        .map(|pattern| format!("{} (+{} XP)", pattern.message, pattern.reward_points))
        .collect()
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::progression::ProgressionEngine;
    use crate::models::issue::IssueSet;
    use std::sync::Arc;

    #[test]
    fn report_lists_fixed_bugs_and_progress() {
        let catalog = Arc::new(IssueCatalog::builtin().unwrap());
        let mut engine = ProgressionEngine::new(catalog.clone());
        let first: IssueSet = ["var-declaration", "console-log"].into_iter().collect();
        engine.process_snapshot(&first).unwrap();
        let second: IssueSet = ["console-log"].into_iter().collect();
        let result = engine.process_snapshot(&second).unwrap();

        let report = format_report(&result, &catalog);
        assert!(report.contains("Earned XP: +10"));
        assert!(report.contains("Using 'var' instead of 'const'/'let' (+10 XP)"));
        assert!(!report.contains("Applied eco tips"));
        assert!(report.contains("Remaining issues: 1"));
        assert!(report.ends_with("XP: 10/100 | Level: 1"));
    }

    #[test]
    fn report_announces_level_up() {
        let catalog = Arc::new(IssueCatalog::builtin().unwrap());
        let result = FixResult {
            earned_points: 10,
            fixed_issue_ids: vec!["nested-loops".to_string()],
            newly_appeared_issue_ids: Vec::new(),
            remaining_issue_ids: Vec::new(),
            level_up: Some(crate::models::progression::LevelUp { old_level: 1, new_level: 2 }),
            total_points: 5,
            level: 2,
            fixed_bug_count: 1,
            applied_eco_tip_count: 0,
            suggestions: Vec::new(),
        };
        let report = format_report(&result, &catalog);
        assert!(report.contains("LEVEL UP! Level 1 → 2"));
        assert!(report.ends_with("XP: 5/200 | Level: 2"));
    }
}
