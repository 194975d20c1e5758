//! Trend cards: small summary metrics reduced from fetched collections.
//!
//! Every function here is pure. Percentages for card values round half away
//! from zero; an empty source collection yields zeros rather than NaN.

use crate::document::{ActivitySample, Document, DocumentStatus};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendCard {
    pub id: &'static str,
    pub label: &'static str,
    pub value: CardValue,
    pub change: String,
    pub change_variant: ChangeVariant,
    pub header_text: &'static str,
    pub footer_text: String,
}

/// A card value is either a plain count or a preformatted string such as `67%`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CardValue {
    Number(u64),
    Text(String),
}

impl fmt::Display for CardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardValue::Number(n) => write!(f, "{n}"),
            CardValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeVariant {
    Up,
    Down,
}

/// `part / total` as a percentage, 0 when `total` is 0.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

fn whole_percent(value: f64) -> String {
    format!("{}%", value.round() as i64)
}

fn one_decimal(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    format!("{rounded:.1}")
}

fn count_status(docs: &[Document], status: DocumentStatus) -> usize {
    docs.iter().filter(|d| d.status == status).count()
}

/// Share of documents marked `Done`, 0 for an empty collection.
pub fn completion_rate(docs: &[Document]) -> f64 {
    percentage(count_status(docs, DocumentStatus::Done), docs.len())
}

/// Share of documents with a reviewer assigned.
pub fn review_coverage(docs: &[Document]) -> f64 {
    let reviewed = docs.iter().filter(|d| d.reviewer.is_some()).count();
    percentage(reviewed, docs.len())
}

/// Period-over-period change between the last two samples, in percent.
///
/// 0 when there are fewer than two samples or the earlier total is 0.
pub fn visitors_change(activity: &[ActivitySample]) -> f64 {
    let [.., prev, last] = activity else {
        return 0.0;
    };
    let prev = prev.total();
    if prev == 0 {
        return 0.0;
    }
    (last.total() as f64 - prev as f64) / prev as f64 * 100.0
}

pub fn total_visitors(activity: &[ActivitySample]) -> u64 {
    activity.iter().map(ActivitySample::total).sum()
}

/// Max daily total minus min daily total, 0 when empty.
pub fn activity_variance(activity: &[ActivitySample]) -> u64 {
    let totals = activity.iter().map(ActivitySample::total);
    match (totals.clone().max(), totals.min()) {
        (Some(max), Some(min)) => max - min,
        _ => 0,
    }
}

fn distinct_reviewers(docs: &[Document]) -> usize {
    docs.iter()
        .filter_map(Document::reviewer_id)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Cards for the landing dashboard.
pub fn dashboard_trends(docs: &[Document], activity: &[ActivitySample]) -> Vec<TrendCard> {
    let total = docs.len();
    let done = count_status(docs, DocumentStatus::Done);
    let change = visitors_change(activity);
    let rising = change >= 0.0;

    let sign = if change > 0.0 { "+" } else { "" };
    let completed_change = if total == 0 {
        "0%".to_string()
    } else {
        format!("{}%", one_decimal(percentage(done, total)))
    };

    vec![
        TrendCard {
            id: "total-visitors",
            label: "Total Visitors",
            value: CardValue::Number(total_visitors(activity)),
            change: format!("{sign}{}%", one_decimal(change)),
            change_variant: if rising { ChangeVariant::Up } else { ChangeVariant::Down },
            header_text: if rising {
                "Traffic increased recently"
            } else {
                "Traffic decreased recently"
            },
            footer_text: "Desktop + Mobile".into(),
        },
        TrendCard {
            id: "total-documents",
            label: "Documents",
            value: CardValue::Number(total as u64),
            change: "+0%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "Total documents in the system",
            footer_text: "Not affected by filtering".into(),
        },
        TrendCard {
            id: "completed-documents",
            label: "Completed",
            value: CardValue::Number(done as u64),
            change: completed_change,
            change_variant: ChangeVariant::Up,
            header_text: "Completion progress",
            footer_text: "Documents marked Done".into(),
        },
        TrendCard {
            id: "active-reviewers",
            label: "Active Reviewers",
            value: CardValue::Number(distinct_reviewers(docs) as u64),
            change: "+0%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "Unique reviewers assigned",
            footer_text: "Based on document data".into(),
        },
    ]
}

/// Cards for the documents page.
pub fn documents_trends(docs: &[Document]) -> Vec<TrendCard> {
    let total = docs.len();
    let completed = count_status(docs, DocumentStatus::Done);
    let in_process = count_status(docs, DocumentStatus::InProcess);
    let reviewed = docs.iter().filter(|d| d.reviewer.is_some()).count();

    vec![
        TrendCard {
            id: "total-documents",
            label: "Total Documents",
            value: CardValue::Number(total as u64),
            change: "+8%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "Document count increased",
            footer_text: "Compared to last import".into(),
        },
        TrendCard {
            id: "completion-rate",
            label: "Completion Rate",
            value: CardValue::Text(whole_percent(completion_rate(docs))),
            change: "+12%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "More documents completed",
            footer_text: format!("{completed} of {total} items finished"),
        },
        TrendCard {
            id: "review-coverage",
            label: "Review Coverage",
            value: CardValue::Text(whole_percent(review_coverage(docs))),
            change: "0%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "Reviewer assignments steady",
            footer_text: format!("{reviewed}/{total} documents assigned"),
        },
        TrendCard {
            id: "workflow-status",
            label: "In-Process Items",
            value: CardValue::Number(in_process as u64),
            change: "+10%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "Workflow active",
            footer_text: format!("{in_process} currently being worked on"),
        },
    ]
}

/// Cards for the analytics page.
pub fn analytics_trends(activity: &[ActivitySample]) -> Vec<TrendCard> {
    let desktop: u64 = activity.iter().map(|d| u64::from(d.desktop)).sum();
    let mobile: u64 = activity.iter().map(|d| u64::from(d.mobile)).sum();
    let total = desktop + mobile;

    vec![
        TrendCard {
            id: "total-activity",
            label: "Total Activity",
            value: CardValue::Number(total),
            change: "+5.2%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "Solid traffic across platforms",
            footer_text: "Combined desktop + mobile activity".into(),
        },
        TrendCard {
            id: "desktop-share",
            label: "Desktop Share",
            value: CardValue::Text(whole_percent(percentage(desktop as usize, total as usize))),
            change: "-1.8%".into(),
            change_variant: ChangeVariant::Down,
            header_text: "Desktop slightly down",
            footer_text: "Compared to previous period".into(),
        },
        TrendCard {
            id: "mobile-growth",
            label: "Mobile Growth",
            value: CardValue::Text(whole_percent(percentage(mobile as usize, total as usize))),
            change: "+3.4%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "Mobile usage increasing",
            footer_text: "More consistent engagement".into(),
        },
        TrendCard {
            id: "activity-variance",
            label: "Activity Variance",
            value: CardValue::Number(activity_variance(activity)),
            change: "+0.9%".into(),
            change_variant: ChangeVariant::Up,
            header_text: "Higher day-to-day swings",
            footer_text: "Indicates fluctuations in traffic".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::{document, reviewer};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn samples(pairs: &[(u32, u32)]) -> Vec<ActivitySample> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        pairs
            .iter()
            .enumerate()
            .map(|(i, &(mobile, desktop))| ActivitySample {
                date: start + chrono::Days::new(i as u64),
                mobile,
                desktop,
            })
            .collect()
    }

    fn card<'a>(cards: &'a [TrendCard], id: &str) -> &'a TrendCard {
        cards.iter().find(|c| c.id == id).unwrap()
    }

    fn with_status(statuses: &[DocumentStatus]) -> Vec<Document> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, &s)| document(&format!("d{i}"), |d| d.status = s))
            .collect()
    }

    #[test]
    fn test_completion_rate_empty_is_zero() {
        assert_eq!(completion_rate(&[]), 0.0);
        let cards = documents_trends(&[]);
        assert_eq!(card(&cards, "completion-rate").value, CardValue::Text("0%".into()));
        assert_eq!(card(&cards, "review-coverage").value, CardValue::Text("0%".into()));
    }

    #[test]
    fn test_completion_rate_rounds_two_thirds() {
        use DocumentStatus::*;
        let docs = with_status(&[Done, Done, InProcess]);
        let cards = documents_trends(&docs);
        let rate = card(&cards, "completion-rate");
        assert_eq!(rate.value, CardValue::Text("67%".into()));
        assert_eq!(rate.footer_text, "2 of 3 items finished");
        assert_eq!(card(&cards, "workflow-status").value, CardValue::Number(1));
    }

    #[test]
    fn test_visitors_change_zero_when_previous_day_empty() {
        assert_eq!(visitors_change(&samples(&[(5, 5), (0, 0), (40, 2)])), 0.0);
        assert_eq!(visitors_change(&samples(&[(0, 0), (0, 0)])), 0.0);
        assert_eq!(visitors_change(&samples(&[(3, 4)])), 0.0);
        assert_eq!(visitors_change(&[]), 0.0);
        assert_eq!(visitors_change(&samples(&[(10, 10), (15, 15)])), 50.0);
    }

    #[test]
    fn test_dashboard_cards() {
        use DocumentStatus::*;
        let mut docs = with_status(&[Done, NotStarted, InProcess, Done]);
        docs[0].reviewer = Some(reviewer("r1", "Ana"));
        docs[1].reviewer = Some(reviewer("r1", "Ana"));
        docs[2].reviewer = Some(reviewer("r2", "Bo"));

        let cards = dashboard_trends(&docs, &samples(&[(10, 10), (5, 5)]));
        let visitors = card(&cards, "total-visitors");
        assert_eq!(visitors.value, CardValue::Number(30));
        assert_eq!(visitors.change, "-50.0%");
        assert_eq!(visitors.change_variant, ChangeVariant::Down);
        assert_eq!(visitors.header_text, "Traffic decreased recently");

        assert_eq!(card(&cards, "total-documents").value, CardValue::Number(4));
        let completed = card(&cards, "completed-documents");
        assert_eq!(completed.value, CardValue::Number(2));
        assert_eq!(completed.change, "50.0%");
        assert_eq!(card(&cards, "active-reviewers").value, CardValue::Number(2));
    }

    #[test]
    fn test_dashboard_positive_change_has_sign() {
        let cards = dashboard_trends(&[], &samples(&[(1, 2), (2, 2)]));
        let visitors = card(&cards, "total-visitors");
        assert_eq!(visitors.change, "+33.3%");
        assert_eq!(visitors.change_variant, ChangeVariant::Up);
        assert_eq!(card(&cards, "completed-documents").change, "0%");
    }

    #[test]
    fn test_analytics_shares_sum_to_hundred() {
        let activity = samples(&[(33, 0), (0, 34), (0, 33)]);
        let cards = analytics_trends(&activity);
        let share = |id| match &card(&cards, id).value {
            CardValue::Text(s) => s.trim_end_matches('%').parse::<i64>().unwrap(),
            other => panic!("unexpected {other:?}"),
        };
        let sum = share("desktop-share") + share("mobile-growth");
        assert!((99..=101).contains(&sum), "sum was {sum}");
        assert_eq!(card(&cards, "total-activity").value, CardValue::Number(100));
        assert_eq!(card(&cards, "activity-variance").value, CardValue::Number(1));
    }

    #[test]
    fn test_analytics_empty_collection() {
        let cards = analytics_trends(&[]);
        assert_eq!(card(&cards, "total-activity").value, CardValue::Number(0));
        assert_eq!(card(&cards, "desktop-share").value, CardValue::Text("0%".into()));
        assert_eq!(card(&cards, "activity-variance").value, CardValue::Number(0));
    }

    #[test]
    fn test_card_serializes_variant_lowercase() {
        let cards = documents_trends(&[]);
        let json = serde_json::to_value(&cards[0]).unwrap();
        assert_eq!(json["change_variant"], "up");
        assert_eq!(json["value"], 0);
    }
}
