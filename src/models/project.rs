// src/models/project.rs

//! Project domain models.
//!
//! `ProjectSummary` comes from the paginated listing; `ProjectDetails` adds
//! the per-project fields fetched by a follow-up detail call. Both are plain
//! values: the crawl engine moves them from the transport to the exporter
//! without interpreting them.

use serde::{Deserialize, Serialize};

/// A monetary amount with its currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Money {
    pub amount: f64,
    pub currency: String,
    pub symbol: String,
}

/// A project as returned by the paginated listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub state: String,
    pub goal: Money,
    pub pledged: Money,
    pub percent_funded: Option<i64>,
    pub backer_count: i64,
    pub category: String,
    pub subcategory: Option<String>,
    pub country: String,
    pub currency: String,
    pub creator_name: String,
    pub creator_backings_count: Option<i64>,
    pub creator_projects_count: Option<i64>,
    /// Launch time as Unix epoch seconds; absent for unlaunched drafts.
    pub launched_at: Option<i64>,
    /// Funding deadline as Unix epoch seconds.
    pub deadline: i64,
    pub location: Option<String>,
    pub is_project_we_love: bool,
}

/// Full project record assembled from the listing entry plus the detail call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub project: ProjectSummary,
    pub story: String,
    pub risks: Option<String>,
    pub has_video: bool,
    pub faq_count: i64,
    pub comments_count: i64,
    pub updates_count: i64,
    pub rewards: Vec<Reward>,
    pub environmental_commitments: Vec<String>,
}

/// A reward tier offered by a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub name: String,
    pub amount: Money,
    pub backers_count: i64,
    pub is_limited: bool,
    pub is_early_bird: bool,
    pub has_shipping: bool,
    pub remaining_quantity: Option<i64>,
    pub limit: Option<i64>,
}

/// One page of the project listing.
///
/// `next_cursor` is `None` when `has_next` is false; the transport normalizes
/// this so the cursor store can derive "more pages" from cursor presence.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<ProjectSummary>,
    pub next_cursor: Option<String>,
    pub has_next: bool,
}

impl ProjectDetails {
    /// True when the project reached its funding goal.
    pub fn is_successful(&self) -> bool {
        self.project.state == "successful"
    }
}
