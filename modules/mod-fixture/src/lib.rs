use std::fs;
use std::path::Path;

use advisor_sdk::{
    AdvisorSession, Category, Credential, FetchContext, FetchError, Impact, Recommendation,
    RecommendationSource, RecommendationStream, ScopeId, ScopeInfo, SourceMetadata,
    register_source,
};
use serde::Deserialize;
use tracing::debug;

struct FixtureSource;

impl RecommendationSource for FixtureSource {
    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            id: "fixture",
            title: "Fixture file",
            description: "Recommendations replayed from a local JSON file",
        }
    }

    fn connect(
        &self,
        credential: &Credential,
        ctx: &FetchContext,
    ) -> Result<Box<dyn AdvisorSession>, FetchError> {
        let path = ctx.fixture().ok_or_else(|| {
            FetchError::Transient("fixture source needs a fixture file path".to_string())
        })?;
        let fixture = load_fixture(path)?;

        if let Some(expected) = fixture.tenant_id.as_deref() {
            if expected != credential.tenant_id() {
                return Err(FetchError::Auth(format!(
                    "tenant '{}' is not accepted by this fixture",
                    credential.tenant_id()
                )));
            }
        }

        debug!(
            path = %path.display(),
            subscriptions = fixture.subscriptions.len(),
            "loaded fixture"
        );
        Ok(Box::new(FixtureSession { fixture }))
    }
}

fn create_source() -> Box<dyn RecommendationSource> {
    Box::new(FixtureSource)
}

register_source!(create_source);

#[derive(Debug, Deserialize)]
struct Fixture {
    tenant_id: Option<String>,
    #[serde(default)]
    subscriptions: Vec<FixtureSubscription>,
}

#[derive(Debug, Deserialize)]
struct FixtureSubscription {
    subscription_id: String,
    display_name: Option<String>,
    #[serde(default)]
    denied: bool,
    #[serde(default)]
    recommendations: Vec<FixtureRecommendation>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureRecommendation {
    category: String,
    #[serde(default)]
    problem: String,
    #[serde(default)]
    solution: String,
    impact: String,
    resource_group: Option<String>,
    resource_name: Option<String>,
}

fn load_fixture(path: &Path) -> Result<Fixture, FetchError> {
    let content = fs::read_to_string(path).map_err(|e| {
        FetchError::Transient(format!("failed to read fixture {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        FetchError::Transient(format!("failed to parse fixture {}: {e}", path.display()))
    })
}

fn convert(raw: FixtureRecommendation) -> Result<Recommendation, FetchError> {
    let impact = raw.impact.parse::<Impact>()?;
    Ok(
        Recommendation::new(Category::from(raw.category), raw.problem, raw.solution, impact)
            .with_resource(raw.resource_group.as_deref(), raw.resource_name.as_deref()),
    )
}

struct FixtureSession {
    fixture: Fixture,
}

impl AdvisorSession for FixtureSession {
    fn list_scopes(&self) -> Result<Vec<ScopeInfo>, FetchError> {
        self.fixture
            .subscriptions
            .iter()
            .map(|sub| {
                let id = ScopeId::parse(&sub.subscription_id)
                    .map_err(|e| FetchError::Transient(format!("fixture lists {e}")))?;
                let display_name = sub.display_name.clone().unwrap_or_else(|| id.to_string());
                Ok(ScopeInfo { id, display_name })
            })
            .collect()
    }

    fn recommendations(&self, scope: &ScopeId) -> Result<RecommendationStream<'_>, FetchError> {
        let entry = self
            .fixture
            .subscriptions
            .iter()
            .find(|sub| sub.subscription_id.eq_ignore_ascii_case(scope.as_str()))
            .ok_or_else(|| FetchError::scope(scope, "subscription not found"))?;

        if entry.denied {
            return Err(FetchError::scope(scope, "access denied"));
        }

        Ok(Box::new(entry.recommendations.iter().cloned().map(convert)))
    }
}
