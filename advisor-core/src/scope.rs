use advisor_sdk::{AdvisorSession, FetchError, ScopeId};
use serde::Serialize;
use tracing::warn;

use crate::AdvisorError;

/// How many subscriptions a report spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    SingleSubscription,
    ExplicitList,
    AllAccessible,
}

impl ScopeMode {
    pub fn is_multi(&self) -> bool {
        !matches!(self, ScopeMode::SingleSubscription)
    }
}

/// The user's choice of subscriptions to query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSelection {
    Single(ScopeId),
    ByDisplayName(String),
    ExplicitList(Vec<ScopeId>),
    AllAccessible,
}

impl ScopeSelection {
    pub fn single(value: &str) -> Result<Self, AdvisorError> {
        ScopeId::parse(value)
            .map(ScopeSelection::Single)
            .map_err(|e| AdvisorError::Validation(e.to_string()))
    }

    pub fn by_display_name(name: &str) -> Result<Self, AdvisorError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AdvisorError::Validation(
                "subscription name must not be empty".to_string(),
            ));
        }
        Ok(ScopeSelection::ByDisplayName(name.to_string()))
    }

    /// Parses newline-delimited subscription ids, ignoring blank lines.
    pub fn from_list_text(text: &str) -> Result<Self, AdvisorError> {
        let mut ids = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let id = ScopeId::parse(line).map_err(|e| {
                AdvisorError::Validation(format!("line {}: {}", index + 1, e))
            })?;
            ids.push(id);
        }

        if ids.is_empty() {
            return Err(AdvisorError::Validation(
                "subscription list contains no ids".to_string(),
            ));
        }
        Ok(ScopeSelection::ExplicitList(ids))
    }

    pub fn mode(&self) -> ScopeMode {
        match self {
            ScopeSelection::Single(_) | ScopeSelection::ByDisplayName(_) => {
                ScopeMode::SingleSubscription
            }
            ScopeSelection::ExplicitList(_) => ScopeMode::ExplicitList,
            ScopeSelection::AllAccessible => ScopeMode::AllAccessible,
        }
    }
}

/// Concrete scopes to query, in order, plus the label shown on the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScopes {
    pub scopes: Vec<ScopeId>,
    pub label: Option<String>,
}

pub fn resolve_scopes(
    selection: &ScopeSelection,
    session: &dyn AdvisorSession,
) -> Result<ResolvedScopes, FetchError> {
    match selection {
        ScopeSelection::Single(id) => Ok(ResolvedScopes {
            scopes: vec![id.clone()],
            label: Some(id.to_string()),
        }),
        ScopeSelection::ExplicitList(ids) => Ok(ResolvedScopes {
            scopes: ids.clone(),
            label: None,
        }),
        ScopeSelection::AllAccessible => Ok(ResolvedScopes {
            scopes: session.list_scopes()?.into_iter().map(|s| s.id).collect(),
            label: None,
        }),
        ScopeSelection::ByDisplayName(name) => {
            let listing = session.list_scopes()?;
            let mut matches = listing.into_iter().filter(|s| s.display_name == *name);
            let found = matches.next().ok_or_else(|| {
                FetchError::scope(name, "no accessible subscription has this display name")
            })?;
            if matches.next().is_some() {
                warn!(name = %name, chosen = %found.id, "display name is ambiguous, using first match");
            }
            Ok(ResolvedScopes {
                scopes: vec![found.id],
                label: Some(found.display_name),
            })
        }
    }
}
