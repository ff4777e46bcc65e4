// src/mapping.rs

//! Flattening of a full project record into one export row.
//!
//! The column set and order below is the export schema contract: targets
//! first, then text metrics, reward aggregates, categorical features, and
//! derived ratios. The header written by the exporter and the rows produced
//! here must always agree; `EXPORT_HEADER.len()` is checked in tests against
//! the field count of a mapped row.

use crate::models::ProjectDetails;

/// Column names for the dataset header, in export order.
pub const EXPORT_HEADER: &[&str] = &[
    "project_id",
    // Targets
    "goal_amount",
    "pledged_amount",
    "percent_funded",
    "backer_count",
    "is_successful",
    // Text and content metrics
    "description_length",
    "story_length",
    "has_risks",
    "risks_word_count",
    "has_video",
    "faq_count",
    "comments_count",
    "updates_count",
    // Reward aggregates
    "rewards_count",
    "min_reward_amount",
    "max_reward_amount",
    "avg_reward_amount",
    "has_early_bird_rewards",
    "has_limited_rewards",
    "has_shipping_rewards",
    // Categorical features
    "category",
    "subcategory",
    "country",
    "currency",
    // Temporal features
    "duration_days",
    // Creator features
    "creator_name",
    "creator_backings_count",
    "creator_projects_count",
    // Boolean features
    "is_project_we_love",
    "has_location",
    "environmental_commitments_count",
    // Title/description text metrics
    "title_length",
    "title_word_count",
    "description_word_count",
    // Derived metrics
    "total_backers_from_rewards",
    "funding_ratio",
    "avg_pledge_per_backer",
];

/// One flattened, ordered dataset row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    fields: Vec<String>,
}

impl ExportRow {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Serialize to a single CSV line (no trailing newline).
    pub fn to_csv_line(&self) -> String {
        self.fields
            .iter()
            .map(|f| escape(f))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The dataset header as a CSV line.
pub fn header_line() -> String {
    EXPORT_HEADER.join(",")
}

/// Map a full project record to one export row. Pure.
pub fn map_record(details: &ProjectDetails) -> ExportRow {
    let project = &details.project;
    let rewards = &details.rewards;

    let reward_amounts: Vec<f64> = rewards.iter().map(|r| r.amount.amount).collect();
    let min_reward = reward_amounts.iter().copied().fold(f64::INFINITY, f64::min);
    let max_reward = reward_amounts
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let avg_reward = if reward_amounts.is_empty() {
        0.0
    } else {
        reward_amounts.iter().sum::<f64>() / reward_amounts.len() as f64
    };

    let risks = details.risks.as_deref().unwrap_or("");
    let duration_days = project
        .launched_at
        .map(|launched| (project.deadline - launched) / 86_400);

    let funding_ratio = if project.goal.amount > 0.0 {
        project.pledged.amount / project.goal.amount
    } else {
        0.0
    };
    let avg_pledge_per_backer = if project.backer_count > 0 {
        project.pledged.amount / project.backer_count as f64
    } else {
        0.0
    };

    let fields = vec![
        project.id.clone(),
        // Targets
        project.goal.amount.to_string(),
        project.pledged.amount.to_string(),
        project.percent_funded.map_or(String::new(), |p| p.to_string()),
        project.backer_count.to_string(),
        details.is_successful().to_string(),
        // Text and content metrics
        project.description.chars().count().to_string(),
        details.story.chars().count().to_string(),
        (!risks.is_empty()).to_string(),
        word_count(risks).to_string(),
        details.has_video.to_string(),
        details.faq_count.to_string(),
        details.comments_count.to_string(),
        details.updates_count.to_string(),
        // Reward aggregates
        rewards.len().to_string(),
        if reward_amounts.is_empty() { 0.0 } else { min_reward }.to_string(),
        if reward_amounts.is_empty() { 0.0 } else { max_reward }.to_string(),
        avg_reward.to_string(),
        rewards.iter().any(|r| r.is_early_bird).to_string(),
        rewards.iter().any(|r| r.is_limited).to_string(),
        rewards.iter().any(|r| r.has_shipping).to_string(),
        // Categorical features
        project.category.clone(),
        project.subcategory.clone().unwrap_or_default(),
        project.country.clone(),
        project.currency.clone(),
        // Temporal features
        duration_days.map_or(String::new(), |d| d.to_string()),
        // Creator features
        project.creator_name.clone(),
        project
            .creator_backings_count
            .map_or(String::new(), |c| c.to_string()),
        project
            .creator_projects_count
            .map_or(String::new(), |c| c.to_string()),
        // Boolean features
        project.is_project_we_love.to_string(),
        project
            .location
            .as_deref()
            .is_some_and(|l| !l.is_empty())
            .to_string(),
        details.environmental_commitments.len().to_string(),
        // Title/description text metrics
        project.name.chars().count().to_string(),
        word_count(&project.name).to_string(),
        word_count(&project.description).to_string(),
        // Derived metrics
        rewards
            .iter()
            .map(|r| r.backers_count)
            .sum::<i64>()
            .to_string(),
        funding_ratio.to_string(),
        avg_pledge_per_backer.to_string(),
    ];

    ExportRow { fields }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Quote a CSV field when it contains a comma, quote, or newline; embedded
/// quotes are doubled.
fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
