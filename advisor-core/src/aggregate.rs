use advisor_sdk::{AdvisorSession, FetchError, FetchErrorKind, Recommendation, ScopeId};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What to do when one scope fails during a multi-scope run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Discard everything collected so far and surface the error.
    #[default]
    Abort,
    /// Drop the failing scope and keep going.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFailure {
    pub scope: ScopeId,
    pub error: FetchError,
}

impl Serialize for ScopeFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Repr<'a> {
            scope: &'a ScopeId,
            kind: FetchErrorKind,
            message: String,
        }

        Repr {
            scope: &self.scope,
            kind: self.error.kind(),
            message: self.error.to_string(),
        }
        .serialize(serializer)
    }
}

/// Result of a successful aggregation; `Empty` is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    Records {
        records: Vec<Recommendation>,
        skipped: Vec<ScopeFailure>,
    },
    Empty {
        skipped: Vec<ScopeFailure>,
    },
}

impl Aggregation {
    fn from_parts(records: Vec<Recommendation>, skipped: Vec<ScopeFailure>) -> Self {
        if records.is_empty() {
            Aggregation::Empty { skipped }
        } else {
            Aggregation::Records { records, skipped }
        }
    }

    pub fn records(&self) -> &[Recommendation] {
        match self {
            Aggregation::Records { records, .. } => records,
            Aggregation::Empty { .. } => &[],
        }
    }

    pub fn skipped(&self) -> &[ScopeFailure] {
        match self {
            Aggregation::Records { skipped, .. } | Aggregation::Empty { skipped } => skipped,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Aggregation::Empty { .. })
    }
}

/// Fetches every scope in order and concatenates the results.
///
/// With `tag_scopes` each record is stamped with its subscription id. Auth
/// failures always abort; other failures follow `policy`.
pub fn aggregate(
    session: &dyn AdvisorSession,
    scopes: &[ScopeId],
    policy: FailurePolicy,
    tag_scopes: bool,
) -> Result<Aggregation, FetchError> {
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for scope in scopes {
        match fetch_scope(session, scope, tag_scopes) {
            Ok(batch) => {
                debug!(scope = %scope, count = batch.len(), "fetched scope");
                records.extend(batch);
            }
            Err(error) if policy == FailurePolicy::Skip && error.is_scope_level() => {
                warn!(scope = %scope, error = %error, "skipping scope");
                skipped.push(ScopeFailure {
                    scope: scope.clone(),
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }

    info!(
        scopes = scopes.len(),
        records = records.len(),
        skipped = skipped.len(),
        "aggregation finished"
    );
    Ok(Aggregation::from_parts(records, skipped))
}

fn fetch_scope(
    session: &dyn AdvisorSession,
    scope: &ScopeId,
    tag: bool,
) -> Result<Vec<Recommendation>, FetchError> {
    session
        .recommendations(scope)?
        .map(|item| {
            item.map(|record| {
                if tag {
                    record.tagged(scope.as_str())
                } else {
                    record
                }
            })
        })
        .collect()
}
