use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Sentinel used wherever an advisory item carries no resource metadata.
pub const NOT_AVAILABLE: &str = "N/A";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Advisory category as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Cost,
    Security,
    HighAvailability,
    Performance,
    OperationalExcellence,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Cost => "Cost",
            Category::Security => "Security",
            Category::HighAvailability => "HighAvailability",
            Category::Performance => "Performance",
            Category::OperationalExcellence => "OperationalExcellence",
            Category::Other(value) => value,
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "cost" => Category::Cost,
            "security" => Category::Security,
            "highavailability" => Category::HighAvailability,
            "performance" => Category::Performance,
            "operationalexcellence" => Category::OperationalExcellence,
            _ => Category::Other(value),
        }
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Category::from(value.to_string())
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "Low",
            Impact::Medium => "Medium",
            Impact::High => "High",
        }
    }
}

impl FromStr for Impact {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Impact::Low),
            "medium" => Ok(Impact::Medium),
            "high" => Ok(Impact::High),
            other => Err(FetchError::Transient(format!(
                "unexpected impact value '{other}' in service payload"
            ))),
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription identifier, validated to GUID shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ScopeId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a valid subscription id (expected a GUID)")]
pub struct InvalidScopeId(pub String);

impl ScopeId {
    pub fn parse(value: &str) -> Result<Self, InvalidScopeId> {
        let trimmed = value.trim();
        if is_guid(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(InvalidScopeId(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ScopeId {
    type Err = InvalidScopeId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ScopeId::parse(value)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true for the `8-4-4-4-12` hexadecimal GUID layout.
pub fn is_guid(value: &str) -> bool {
    let groups: Vec<&str> = value.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8usize, 4, 4, 4, 12])
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

/// One entry of a subscription listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeInfo {
    pub id: ScopeId,
    pub display_name: String,
}

/// A single advisory finding, flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    /// Owning subscription; filled in only by multi-subscription aggregation.
    pub subscription_id: Option<String>,
    pub category: Category,
    pub problem: String,
    pub solution: String,
    pub impact: Impact,
    pub resource_group: String,
    pub resource_name: String,
}

impl Recommendation {
    pub fn new<P: Into<String>, S: Into<String>>(
        category: Category,
        problem: P,
        solution: S,
        impact: Impact,
    ) -> Self {
        Self {
            subscription_id: None,
            category,
            problem: problem.into(),
            solution: solution.into(),
            impact,
            resource_group: NOT_AVAILABLE.to_string(),
            resource_name: NOT_AVAILABLE.to_string(),
        }
    }

    pub fn with_resource(mut self, group: Option<&str>, name: Option<&str>) -> Self {
        self.resource_group = normalize_resource(group);
        self.resource_name = normalize_resource(name);
        self
    }

    pub fn tagged<S: Into<String>>(mut self, subscription_id: S) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }
}

/// Maps absent or blank resource metadata to [`NOT_AVAILABLE`].
pub fn normalize_resource(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Service-principal credential triple. Read-only once built.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl Credential {
    pub fn new<T, C, S>(tenant_id: T, client_id: C, client_secret: S) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        S: Into<String>,
    {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Errors raised while talking to a recommendation source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("subscription {scope} is not accessible: {reason}")]
    Scope { scope: String, reason: String },
    #[error("transient service failure: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Auth,
    Scope,
    Transient,
}

impl FetchError {
    pub fn scope<S: fmt::Display, R: Into<String>>(scope: S, reason: R) -> Self {
        FetchError::Scope {
            scope: scope.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Auth(_) => FetchErrorKind::Auth,
            FetchError::Scope { .. } => FetchErrorKind::Scope,
            FetchError::Transient(_) => FetchErrorKind::Transient,
        }
    }

    /// Credential failures affect every scope, so they are never skippable.
    pub fn is_scope_level(&self) -> bool {
        !matches!(self, FetchError::Auth(_))
    }
}

/// Fetch context; endpoints and source-specific parameters.
#[derive(Debug, Clone)]
pub struct FetchContext {
    authority_host: String,
    management_endpoint: String,
    fixture: Option<PathBuf>,
}

impl Default for FetchContext {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            fixture: None,
        }
    }
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            fixture: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn set_authority_host<S: Into<String>>(&mut self, host: Option<S>) {
        if let Some(host) = host {
            self.authority_host = host.into();
        }
    }

    pub fn set_management_endpoint<S: Into<String>>(&mut self, endpoint: Option<S>) {
        if let Some(endpoint) = endpoint {
            self.management_endpoint = endpoint.into();
        }
    }

    pub fn set_fixture<P: Into<PathBuf>>(&mut self, path: Option<P>) {
        self.fixture = path.map(Into::into);
    }

    pub fn authority_host(&self) -> &str {
        self.authority_host.trim_end_matches('/')
    }

    pub fn management_endpoint(&self) -> &str {
        self.management_endpoint.trim_end_matches('/')
    }

    pub fn fixture(&self) -> Option<&PathBuf> {
        self.fixture.as_ref()
    }
}

/// Source metadata used for selection and logging.
#[derive(Debug, Clone, Copy)]
pub struct SourceMetadata {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// Finite, single-pass sequence of recommendations for one scope.
pub type RecommendationStream<'a> = Box<dyn Iterator<Item = Result<Recommendation, FetchError>> + 'a>;

/// Authenticated connection to a recommendation source.
pub trait AdvisorSession {
    fn list_scopes(&self) -> Result<Vec<ScopeInfo>, FetchError>;
    fn recommendations(&self, scope: &ScopeId) -> Result<RecommendationStream<'_>, FetchError>;
}

/// Common interface for recommendation backends.
pub trait RecommendationSource: Send + Sync + 'static {
    fn metadata(&self) -> SourceMetadata;
    fn connect(
        &self,
        credential: &Credential,
        ctx: &FetchContext,
    ) -> Result<Box<dyn AdvisorSession>, FetchError>;
}

/// Descriptor of a compile-time registry entry.
pub struct SourceRegistration {
    pub constructor: fn() -> Box<dyn RecommendationSource>,
}

inventory::collect!(SourceRegistration);

pub use inventory;

/// Helper macro to register a source inside a module.
#[macro_export]
macro_rules! register_source {
    ($ctor:expr) => {
        ::advisor_sdk::inventory::submit! {
            ::advisor_sdk::SourceRegistration {
                constructor: $ctor,
            }
        }
    };
}

pub fn iter_registered_sources() -> impl Iterator<Item = &'static SourceRegistration> {
    inventory::iter::<SourceRegistration>.into_iter()
}

pub fn find_source(id: &str) -> Option<Box<dyn RecommendationSource>> {
    iter_registered_sources()
        .map(|entry| (entry.constructor)())
        .find(|source| source.metadata().id == id)
}
