//! Fuzzy user resolution over the tracker's user directory.
//!
//! Resolution turns free text ("ivan", "@ivan_k", "Ivan Karpov") into a
//! directory user: an exact username hit short-circuits, otherwise
//! candidates are scored against every name the directory knows for
//! them and the caller gets either a confident match, a ranked
//! suggestion list, or nothing.

pub mod similarity;

use database::{user, Database, DatabaseError, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the resolution pipeline.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Tuning knobs for fuzzy matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum similarity for a candidate to be suggested at all.
    pub fuzzy_threshold: f64,
    /// Maximum number of suggestions returned.
    pub max_suggestions: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.6,
            max_suggestions: 5,
        }
    }
}

/// A fuzzily matched user with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredUser {
    #[serde(flatten)]
    pub user: User,
    pub match_score: f64,
}

/// Outcome of resolving a free-text reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveOutcome {
    /// A single confident match: exact username, or a fuzzy score of
    /// 0.95 or better.
    ExactMatch { user: User },
    /// Plausible candidates ranked by score, best first.
    Suggestions { users: Vec<ScoredUser> },
    /// Nothing in the directory came close.
    NotFound,
}

/// Resolves free-text user references against the directory.
#[derive(Debug, Clone)]
pub struct Resolver {
    db: Database,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(db: Database) -> Self {
        Self::with_config(db, ResolverConfig::default())
    }

    pub fn with_config(db: Database, config: ResolverConfig) -> Self {
        Self { db, config }
    }

    /// Resolve a free-text reference, optionally restricted to users
    /// seen in a given chat.
    ///
    /// The query is trimmed, stripped of a leading `@`, and lowercased
    /// before matching. An exact username hit inside the scope wins
    /// outright; otherwise every scoped user is scored against all the
    /// names known for them and candidates at or above the threshold
    /// are returned, best first. A top score of 0.95 or better is
    /// promoted to an exact match.
    pub async fn resolve(
        &self,
        query: &str,
        chat_scope: Option<i64>,
    ) -> Result<ResolveOutcome, ResolverError> {
        let query = query.trim().trim_start_matches('@').to_lowercase();
        if query.is_empty() {
            return Ok(ResolveOutcome::NotFound);
        }

        if let Some(user) = user::get_user_by_username(self.db.pool(), &query).await? {
            let in_scope = match chat_scope {
                Some(chat_id) => user.chat_ids.contains(&chat_id),
                None => true,
            };
            if in_scope {
                tracing::debug!(query = %query, user_id = user.id, "exact username match");
                return Ok(ResolveOutcome::ExactMatch { user });
            }
        }

        let candidates = user::list_users(self.db.pool(), chat_scope).await?;
        let mut scored: Vec<ScoredUser> = candidates
            .into_iter()
            .filter_map(|user| {
                let score = best_score(&query, &user);
                (score >= self.config.fuzzy_threshold).then_some(ScoredUser {
                    user,
                    match_score: score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.match_score
                .total_cmp(&a.match_score)
                .then(a.user.id.cmp(&b.user.id))
        });
        scored.truncate(self.config.max_suggestions);

        if scored.is_empty() {
            return Ok(ResolveOutcome::NotFound);
        }
        if scored[0].match_score >= 0.95 {
            let best = scored.remove(0);
            tracing::debug!(query = %query, user_id = best.user.id, "fuzzy match promoted");
            return Ok(ResolveOutcome::ExactMatch { user: best.user });
        }
        Ok(ResolveOutcome::Suggestions { users: scored })
    }
}

/// The best similarity between the query and every name the directory
/// knows for the user.
fn best_score(query: &str, user: &User) -> f64 {
    let mut names: Vec<String> = Vec::new();
    let mut add = |value: &Option<String>| {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            names.push(v.to_lowercase());
        }
    };
    add(&user.username);
    add(&user.first_name);
    add(&user.last_name);
    add(&user.display_name);
    if let (Some(first), Some(last)) = (user.first_name.as_deref(), user.last_name.as_deref()) {
        names.push(format!("{} {}", first, last).to_lowercase());
    }

    names
        .iter()
        .map(|name| similarity::ratio(query, name))
        .fold(0.0, f64::max)
}
