// src/api/client.rs

//! reqwest-backed GraphQL transport.
//!
//! Speaks the listing/detail protocol from `queries.rs`, paces requests so
//! consecutive calls stay `min_request_interval_ms` apart, and maps HTTP
//! status codes onto the tagged [`FetchError`] kinds: 401/403 are auth
//! failures, 429 is a rate limit, everything else (including timeouts) is
//! `Other` and left to the orchestrator's fixed-delay retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::api::queries::{PROJECTS_QUERY, PROJECT_DETAILS_QUERY};
use crate::api::{FetchError, FetchResult, TokenCache, Transport};
use crate::error::Result;
use crate::models::{ApiConfig, Money, Page, ProjectDetails, ProjectSummary, Reward};

/// GraphQL transport over HTTPS.
pub struct GraphTransport {
    client: Client,
    endpoint: String,
    client_id: String,
    tokens: TokenCache,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl GraphTransport {
    /// Build a transport from API settings and a shared token cache.
    pub fn new(config: &ApiConfig, tokens: TokenCache) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            client_id: config.client_id.clone(),
            tokens,
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: Mutex::new(None),
        })
    }

    /// Delay until the minimum inter-request spacing has elapsed.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn execute(
        &self,
        operation: &'static str,
        variables: serde_json::Value,
        query: &'static str,
    ) -> FetchResult<reqwest::Response> {
        self.pace().await;

        let request = GraphRequest {
            operation_name: operation,
            variables,
            query,
        };

        log::debug!("Executing {} against {}", operation, self.endpoint);

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&request);

        if !self.client_id.is_empty() {
            builder = builder.header("X-Api-Client", &self.client_id);
        }
        if let Some(token) = self.tokens.get() {
            builder = builder.header("X-Auth", format!("token {token}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Other(format!("{operation}: {e}")))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => {
                // The cached token is dead; force a fresh escalation.
                self.tokens.clear();
                Err(FetchError::Auth(format!("{operation}: token rejected")))
            }
            StatusCode::FORBIDDEN => Err(FetchError::Auth(format!("{operation}: access forbidden"))),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(FetchError::RateLimit(format!("{operation}: server throttled")))
            }
            status => Err(FetchError::Other(format!(
                "{operation}: unexpected status {status}"
            ))),
        }
    }
}

#[async_trait]
impl Transport for GraphTransport {
    async fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> FetchResult<Page> {
        let mut variables = serde_json::json!({
            "sort": "MAGIC",
            "first": limit,
        });
        if let Some(cursor) = cursor {
            variables["cursor"] = serde_json::Value::String(cursor.to_string());
        }

        let response = self
            .execute("FetchProjects", variables, PROJECTS_QUERY)
            .await?;

        let body: ProjectsResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Other(format!("FetchProjects: invalid body: {e}")))?;

        let connection = body.data.projects;
        let items = connection
            .edges
            .into_iter()
            .map(|edge| summary_from_node(edge.node))
            .collect();

        // A terminal page may still carry a stale endCursor; drop it so the
        // cursor store derives has_more from cursor presence.
        let has_next = connection.page_info.has_next_page;
        let next_cursor = if has_next {
            connection.page_info.end_cursor
        } else {
            None
        };

        Ok(Page {
            items,
            next_cursor,
            has_next,
        })
    }

    async fn fetch_details(&self, slug: &str) -> FetchResult<ProjectDetails> {
        let variables = serde_json::json!({ "slug": slug });
        let response = self
            .execute("FetchProject", variables, PROJECT_DETAILS_QUERY)
            .await?;

        let body: DetailsResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Other(format!("FetchProject: invalid body: {e}")))?;

        let node = body
            .data
            .project
            .ok_or_else(|| FetchError::Other(format!("FetchProject: no project for {slug}")))?;

        Ok(details_from_node(node))
    }
}

// --- Wire format ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphRequest {
    operation_name: &'static str,
    variables: serde_json::Value,
    query: &'static str,
}

#[derive(Deserialize)]
struct ProjectsResponse {
    data: ProjectsData,
}

#[derive(Deserialize)]
struct ProjectsData {
    projects: ProjectConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectConnection {
    #[serde(default)]
    edges: Vec<ProjectEdge>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct ProjectEdge {
    node: ProjectNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct DetailsResponse {
    data: DetailsData,
}

#[derive(Deserialize)]
struct DetailsData {
    project: Option<ProjectNode>,
}

/// Shared node shape for the listing and detail operations; detail-only
/// fields default to absent when the listing response omits them.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ProjectNode {
    id: String,
    name: String,
    slug: String,
    description: String,
    state: String,
    backers_count: i64,
    percent_funded: Option<i64>,
    comments_count: Option<i64>,
    category: Option<CategoryNode>,
    country: Option<CountryNode>,
    creator: Option<CreatorNode>,
    currency: Option<String>,
    goal: Option<MoneyNode>,
    pledged: Option<MoneyNode>,
    launched_at: Option<i64>,
    deadline_at: Option<i64>,
    location: Option<LocationNode>,
    is_project_we_love: bool,
    story: Option<String>,
    risks: Option<String>,
    posts: Option<TotalCountNode>,
    video: Option<VideoNode>,
    faqs: Option<FaqConnection>,
    rewards: Option<RewardConnection>,
    environmental_commitments: Option<Vec<CommitmentNode>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CategoryNode {
    name: String,
    parent_category: Option<Box<CategoryNode>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CountryNode {
    name: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CreatorNode {
    name: String,
    backings_count: Option<i64>,
    launched_projects: Option<TotalCountNode>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct MoneyNode {
    amount: f64,
    currency: String,
    symbol: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct TotalCountNode {
    total_count: i64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct LocationNode {
    displayable_name: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct VideoNode {
    video_sources: Option<VideoSourcesNode>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct VideoSourcesNode {
    high: Option<VideoSourceNode>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct VideoSourceNode {
    src: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FaqConnection {
    nodes: Vec<FaqNode>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FaqNode {
    #[allow(dead_code)]
    id: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RewardConnection {
    nodes: Vec<RewardNode>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RewardNode {
    id: String,
    name: String,
    backers_count: i64,
    amount: MoneyNode,
    remaining_quantity: Option<i64>,
    limit: Option<i64>,
    shipping_preference: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CommitmentNode {
    commitment_category: String,
    description: String,
}

// --- Node to domain conversion ---

fn money_from(node: Option<MoneyNode>) -> Money {
    let node = node.unwrap_or_default();
    Money {
        amount: node.amount,
        currency: node.currency,
        symbol: node.symbol,
    }
}

fn summary_from_node(node: ProjectNode) -> ProjectSummary {
    // The parent category is the top-level category; a node without a parent
    // is itself top-level and has no subcategory.
    let (category, subcategory) = match node.category {
        Some(cat) => match cat.parent_category {
            Some(parent) => (parent.name, Some(cat.name)),
            None => (cat.name, None),
        },
        None => (String::new(), None),
    };

    let creator = node.creator.unwrap_or_default();

    ProjectSummary {
        id: node.id,
        name: node.name,
        slug: node.slug,
        description: node.description,
        state: node.state,
        goal: money_from(node.goal),
        pledged: money_from(node.pledged),
        percent_funded: node.percent_funded,
        backer_count: node.backers_count,
        category,
        subcategory,
        country: node.country.unwrap_or_default().name,
        currency: node.currency.unwrap_or_default(),
        creator_name: creator.name,
        creator_backings_count: creator.backings_count,
        creator_projects_count: creator.launched_projects.map(|p| p.total_count),
        launched_at: node.launched_at,
        deadline: node.deadline_at.unwrap_or_default(),
        location: node.location.map(|l| l.displayable_name),
        is_project_we_love: node.is_project_we_love,
    }
}

fn details_from_node(mut node: ProjectNode) -> ProjectDetails {
    let story = node.story.take().unwrap_or_default();
    let risks = node.risks.take();
    let has_video = node
        .video
        .take()
        .and_then(|v| v.video_sources)
        .and_then(|s| s.high)
        .is_some();
    let faq_count = node.faqs.take().map_or(0, |f| f.nodes.len() as i64);
    let comments_count = node.comments_count.take().unwrap_or_default();
    let updates_count = node.posts.take().map_or(0, |p| p.total_count);

    let rewards = node
        .rewards
        .take()
        .map(|connection| {
            connection
                .nodes
                .into_iter()
                .map(reward_from_node)
                .collect()
        })
        .unwrap_or_default();

    let environmental_commitments = node
        .environmental_commitments
        .take()
        .map(|commitments| {
            commitments
                .into_iter()
                .map(|c| format!("{}: {}", c.commitment_category, c.description))
                .collect()
        })
        .unwrap_or_default();

    ProjectDetails {
        project: summary_from_node(node),
        story,
        risks,
        has_video,
        faq_count,
        comments_count,
        updates_count,
        rewards,
        environmental_commitments,
    }
}

fn reward_from_node(node: RewardNode) -> Reward {
    Reward {
        is_limited: node.limit.is_some() || node.remaining_quantity.is_some(),
        is_early_bird: node.name.to_lowercase().contains("early bird"),
        has_shipping: node.shipping_preference.as_deref() != Some("none")
            && node.shipping_preference.is_some(),
        id: node.id,
        name: node.name,
        amount: money_from(Some(node.amount)),
        backers_count: node.backers_count,
        remaining_quantity: node.remaining_quantity,
        limit: node.limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_node_json() -> serde_json::Value {
        serde_json::json!({
            "id": "UHJvamVjdC0x",
            "name": "Solar Lantern",
            "slug": "solar-lantern",
            "description": "A lantern that charges itself.",
            "state": "successful",
            "backersCount": 420,
            "percentFunded": 173,
            "category": {
                "name": "Gadgets",
                "parentCategory": { "name": "Technology" }
            },
            "country": { "code": "US", "name": "the United States" },
            "creator": { "name": "Ada" },
            "goal": { "amount": 10000.0, "currency": "USD", "symbol": "$" },
            "pledged": { "amount": 17300.0, "currency": "USD", "symbol": "$" },
            "currency": "USD",
            "launchedAt": 1700000000,
            "deadlineAt": 1702592000,
            "location": { "displayableName": "Portland, OR" },
            "isProjectWeLove": true
        })
    }

    #[test]
    fn test_summary_from_listing_node() {
        let node: ProjectNode = serde_json::from_value(listing_node_json()).unwrap();
        let summary = summary_from_node(node);

        assert_eq!(summary.slug, "solar-lantern");
        assert_eq!(summary.category, "Technology");
        assert_eq!(summary.subcategory.as_deref(), Some("Gadgets"));
        assert_eq!(summary.backer_count, 420);
        assert_eq!(summary.launched_at, Some(1700000000));
        assert_eq!(summary.location.as_deref(), Some("Portland, OR"));
    }

    #[test]
    fn test_summary_top_level_category_has_no_subcategory() {
        let mut json = listing_node_json();
        json["category"] = serde_json::json!({ "name": "Music" });
        let node: ProjectNode = serde_json::from_value(json).unwrap();
        let summary = summary_from_node(node);

        assert_eq!(summary.category, "Music");
        assert!(summary.subcategory.is_none());
    }

    #[test]
    fn test_details_from_node_derives_counters_and_flags() {
        let mut json = listing_node_json();
        json["story"] = serde_json::json!("Once upon a time.");
        json["risks"] = serde_json::json!("Supply chain.");
        json["commentsCount"] = serde_json::json!(12);
        json["posts"] = serde_json::json!({ "totalCount": 4 });
        json["faqs"] = serde_json::json!({ "nodes": [{ "id": "f1" }, { "id": "f2" }] });
        json["video"] = serde_json::json!({
            "videoSources": { "high": { "src": "https://cdn.example/v.mp4" } }
        });
        json["rewards"] = serde_json::json!({
            "nodes": [{
                "id": "r1",
                "name": "Early Bird Lantern",
                "backersCount": 50,
                "amount": { "amount": 25.0, "currency": "USD", "symbol": "$" },
                "remainingQuantity": 10,
                "limit": 100,
                "shippingPreference": "unrestricted"
            }]
        });
        json["environmentalCommitments"] = serde_json::json!([
            { "commitmentCategory": "longLastingDesign", "description": "Built to last." }
        ]);

        let node: ProjectNode = serde_json::from_value(json).unwrap();
        let details = details_from_node(node);

        assert_eq!(details.story, "Once upon a time.");
        assert!(details.has_video);
        assert_eq!(details.faq_count, 2);
        assert_eq!(details.comments_count, 12);
        assert_eq!(details.updates_count, 4);
        assert_eq!(details.rewards.len(), 1);
        assert!(details.rewards[0].is_early_bird);
        assert!(details.rewards[0].is_limited);
        assert!(details.rewards[0].has_shipping);
        assert_eq!(
            details.environmental_commitments[0],
            "longLastingDesign: Built to last."
        );
        assert!(details.is_successful());
    }

    #[test]
    fn test_page_parse_drops_cursor_on_terminal_page() {
        let body: ProjectsResponse = serde_json::from_value(serde_json::json!({
            "data": {
                "projects": {
                    "edges": [{ "cursor": "c1", "node": listing_node_json() }],
                    "pageInfo": { "hasNextPage": false, "endCursor": "c1" },
                    "totalCount": 1
                }
            }
        }))
        .unwrap();

        let has_next = body.data.projects.page_info.has_next_page;
        let next_cursor = if has_next {
            body.data.projects.page_info.end_cursor
        } else {
            None
        };
        assert!(!has_next);
        assert!(next_cursor.is_none());
    }
}
