use std::collections::VecDeque;

use advisor_sdk::{
    AdvisorSession, Category, Credential, FetchContext, FetchError, Impact, Recommendation,
    RecommendationSource, RecommendationStream, ScopeId, ScopeInfo, SourceMetadata,
    register_source,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const ADVISOR_API_VERSION: &str = "2023-01-01";

struct AzureAdvisorSource;

impl RecommendationSource for AzureAdvisorSource {
    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            id: "azure",
            title: "Azure Advisor",
            description: "Recommendations from the Azure Resource Manager Advisor API",
        }
    }

    fn connect(
        &self,
        credential: &Credential,
        ctx: &FetchContext,
    ) -> Result<Box<dyn AdvisorSession>, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("advisor-report/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transient(format!("failed to build HTTP client: {e}")))?;

        let token = acquire_token(&client, credential, ctx)?;
        info!(tenant = credential.tenant_id(), "acquired management token");

        Ok(Box::new(ArmSession {
            client,
            token,
            endpoint: ctx.management_endpoint().to_string(),
        }))
    }
}

fn create_source() -> Box<dyn RecommendationSource> {
    Box::new(AzureAdvisorSource)
}

register_source!(create_source);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

fn acquire_token(
    client: &Client,
    credential: &Credential,
    ctx: &FetchContext,
) -> Result<String, FetchError> {
    let url = format!(
        "{}/{}/oauth2/v2.0/token",
        ctx.authority_host(),
        credential.tenant_id()
    );
    let scope = format!("{}/.default", ctx.management_endpoint());

    let response = client
        .post(&url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credential.client_id()),
            ("client_secret", credential.client_secret()),
            ("scope", scope.as_str()),
        ])
        .send()
        .map_err(|e| FetchError::Transient(format!("token request failed: {e}")))?;

    let status = response.status();
    if status.is_success() {
        let token: TokenResponse = response
            .json()
            .map_err(|e| FetchError::Transient(format!("malformed token response: {e}")))?;
        return Ok(token.access_token);
    }

    let body = response.text().unwrap_or_default();
    Err(classify_token_failure(status, &body))
}

fn classify_token_failure(status: StatusCode, body: &str) -> FetchError {
    let parsed: OAuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = parsed
        .error_description
        .or(parsed.error)
        .map(|text| first_line(&text))
        .unwrap_or_else(|| format!("identity provider returned {status}"));

    if is_retryable(status) {
        FetchError::Transient(detail)
    } else {
        FetchError::Auth(detail)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorBody {
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

fn arm_error_detail(status: StatusCode, body: &str) -> String {
    let parsed: ArmErrorBody = serde_json::from_str(body).unwrap_or_default();
    match parsed.error {
        Some(ArmErrorDetail {
            code: Some(code),
            message: Some(message),
        }) => format!("{code}: {}", first_line(&message)),
        Some(ArmErrorDetail {
            code: Some(code), ..
        }) => code,
        Some(ArmErrorDetail {
            message: Some(message),
            ..
        }) => first_line(&message),
        _ => format!("management API returned {status}"),
    }
}

fn classify_arm_failure(status: StatusCode, scope: Option<&ScopeId>, body: &str) -> FetchError {
    let detail = arm_error_detail(status, body);

    if status == StatusCode::UNAUTHORIZED {
        return FetchError::Auth(detail);
    }
    if is_retryable(status) {
        return FetchError::Transient(detail);
    }

    let scope_rejection = status == StatusCode::BAD_REQUEST
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::NOT_FOUND;

    match scope {
        Some(scope) if scope_rejection => FetchError::scope(scope, detail),
        None if status == StatusCode::FORBIDDEN => FetchError::Auth(detail),
        _ => FetchError::Transient(detail),
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSubscription {
    subscription_id: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRecommendation {
    id: Option<String>,
    properties: RawProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperties {
    category: Option<String>,
    impact: Option<String>,
    short_description: Option<ShortDescription>,
    resource_metadata: Option<ResourceMetadata>,
    impacted_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShortDescription {
    problem: Option<String>,
    solution: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceMetadata {
    resource_id: Option<String>,
}

fn convert_recommendation(raw: RawRecommendation) -> Result<Recommendation, FetchError> {
    let props = raw.properties;
    let category = props
        .category
        .map(Category::from)
        .ok_or_else(|| FetchError::Transient("recommendation without category".to_string()))?;
    let impact = props
        .impact
        .as_deref()
        .ok_or_else(|| FetchError::Transient("recommendation without impact".to_string()))?
        .parse::<Impact>()?;

    let (problem, solution) = props
        .short_description
        .map(|d| (d.problem.unwrap_or_default(), d.solution.unwrap_or_default()))
        .unwrap_or_default();

    let resource_id = props
        .resource_metadata
        .and_then(|m| m.resource_id)
        .or_else(|| raw.id.as_deref().and_then(resource_id_from_recommendation_id));

    let group = resource_id.as_deref().and_then(resource_group_from_id);
    let name = props
        .impacted_value
        .or_else(|| resource_id.as_deref().and_then(resource_name_from_id));

    Ok(Recommendation::new(category, problem, solution, impact)
        .with_resource(group.as_deref(), name.as_deref()))
}

/// Recommendation ids are `<resource id>/providers/Microsoft.Advisor/recommendations/<guid>`.
fn resource_id_from_recommendation_id(id: &str) -> Option<String> {
    let lower = id.to_ascii_lowercase();
    let cut = lower.find("/providers/microsoft.advisor/")?;
    (cut > 0).then(|| id[..cut].to_string())
}

fn resource_group_from_id(resource_id: &str) -> Option<String> {
    let mut segments = resource_id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next().map(ToOwned::to_owned);
        }
    }
    None
}

fn resource_name_from_id(resource_id: &str) -> Option<String> {
    resource_id
        .rsplit('/')
        .find(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

struct ArmSession {
    client: Client,
    token: String,
    endpoint: String,
}

impl ArmSession {
    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        scope: Option<&ScopeId>,
    ) -> Result<T, FetchError> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| FetchError::Transient(format!("request to {url} failed: {e}")))?;
        decode_response(response, scope)
    }

    fn fetch_page(&self, url: &str, scope: &ScopeId) -> Result<Page<RawRecommendation>, FetchError> {
        self.get_json(url, Some(scope))
    }
}

fn decode_response<T: DeserializeOwned>(
    response: Response,
    scope: Option<&ScopeId>,
) -> Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(classify_arm_failure(status, scope, &body));
    }
    response
        .json()
        .map_err(|e| FetchError::Transient(format!("malformed management API payload: {e}")))
}

impl AdvisorSession for ArmSession {
    fn list_scopes(&self) -> Result<Vec<ScopeInfo>, FetchError> {
        let mut url = Some(format!(
            "{}/subscriptions?api-version={SUBSCRIPTIONS_API_VERSION}",
            self.endpoint
        ));
        let mut scopes = Vec::new();

        while let Some(current) = url.take() {
            let page: Page<RawSubscription> = self.get_json(&current, None)?;
            for raw in page.value {
                let id = ScopeId::parse(&raw.subscription_id).map_err(|e| {
                    FetchError::Transient(format!("subscription listing returned {e}"))
                })?;
                let display_name = raw.display_name.unwrap_or_else(|| id.to_string());
                scopes.push(ScopeInfo { id, display_name });
            }
            url = page.next_link.filter(|link| !link.is_empty());
        }

        info!(count = scopes.len(), "listed accessible subscriptions");
        Ok(scopes)
    }

    fn recommendations(&self, scope: &ScopeId) -> Result<RecommendationStream<'_>, FetchError> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Advisor/recommendations?api-version={ADVISOR_API_VERSION}",
            self.endpoint, scope
        );
        let first = self.fetch_page(&url, scope)?;
        let mut pages = AdvisorPages::new(self, scope.clone());
        pages.absorb(first);
        Ok(Box::new(pages))
    }
}

/// Lazily walks the `nextLink` chain of one subscription's listing.
struct AdvisorPages<'a> {
    session: &'a ArmSession,
    scope: ScopeId,
    buffer: VecDeque<Result<Recommendation, FetchError>>,
    next_link: Option<String>,
    pages: usize,
}

impl<'a> AdvisorPages<'a> {
    fn new(session: &'a ArmSession, scope: ScopeId) -> Self {
        Self {
            session,
            scope,
            buffer: VecDeque::new(),
            next_link: None,
            pages: 0,
        }
    }

    fn absorb(&mut self, page: Page<RawRecommendation>) {
        self.pages += 1;
        debug!(
            scope = %self.scope,
            page = self.pages,
            items = page.value.len(),
            "received recommendation page"
        );
        self.buffer
            .extend(page.value.into_iter().map(convert_recommendation));
        self.next_link = page.next_link.filter(|link| !link.is_empty());
    }
}

impl Iterator for AdvisorPages<'_> {
    type Item = Result<Recommendation, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            let link = self.next_link.take()?;
            match self.session.fetch_page(&link, &self.scope) {
                Ok(page) => self.absorb(page),
                Err(error) => return Some(Err(error)),
            }
        }
    }
}
