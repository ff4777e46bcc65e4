// src/api/queries.rs

//! GraphQL documents for the project listing and detail operations.

/// Paginated project listing. Cursor paging via `pageInfo.endCursor`.
pub const PROJECTS_QUERY: &str = r#"
query FetchProjects($first: Int = 15, $cursor: String, $sort: ProjectSort) {
  projects(first: $first, after: $cursor, sort: $sort) {
    edges {
      cursor
      node {
        __typename
        id
        name
        slug
        description
        state
        backersCount
        percentFunded
        category {
          name
          parentCategory {
            name
          }
        }
        country {
          code
          name
        }
        creator {
          name
        }
        goal {
          amount
          currency
          symbol
        }
        pledged {
          amount
          currency
          symbol
        }
        currency
        launchedAt
        deadlineAt
        location {
          displayableName
        }
        isProjectWeLove
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
    totalCount
  }
}
"#;

/// Full per-project detail record.
pub const PROJECT_DETAILS_QUERY: &str = r#"
query FetchProject($slug: String!) {
  project(slug: $slug) {
    __typename
    id
    name
    slug
    description
    state
    backersCount
    percentFunded
    commentsCount
    category {
      name
      parentCategory {
        name
      }
    }
    country {
      code
      name
    }
    creator {
      name
      backingsCount
      launchedProjects {
        totalCount
      }
    }
    currency
    goal {
      amount
      currency
      symbol
    }
    pledged {
      amount
      currency
      symbol
    }
    launchedAt
    deadlineAt
    location {
      displayableName
    }
    isProjectWeLove
    story
    risks
    posts {
      totalCount
    }
    video {
      videoSources {
        high {
          src
        }
      }
    }
    faqs {
      nodes {
        id
      }
    }
    rewards {
      nodes {
        id
        name
        backersCount
        amount {
          amount
          currency
          symbol
        }
        remainingQuantity
        limit
        startsAt
        endsAt
        shippingPreference
      }
    }
    environmentalCommitments {
      commitmentCategory
      description
    }
  }
}
"#;
