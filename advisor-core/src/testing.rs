use std::cell::RefCell;

use advisor_sdk::{
    AdvisorSession, Category, FetchError, Impact, Recommendation, RecommendationStream, ScopeId,
    ScopeInfo,
};

pub fn rec(problem: &str) -> Recommendation {
    Recommendation::new(Category::Cost, problem, "fix it", Impact::Medium)
}

enum Behaviour {
    Records(Vec<Recommendation>),
    Fail(FetchError),
    FailMidStream(Vec<Recommendation>, FetchError),
}

/// In-memory session; records which scopes were fetched.
pub struct StubSession {
    scopes: Vec<(ScopeInfo, Behaviour)>,
    listing_error: Option<FetchError>,
    calls: RefCell<Vec<String>>,
}

impl StubSession {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            listing_error: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn push(mut self, id: &str, name: &str, behaviour: Behaviour) -> Self {
        let info = ScopeInfo {
            id: ScopeId::parse(id).expect("stub scope id"),
            display_name: name.to_string(),
        };
        self.scopes.push((info, behaviour));
        self
    }

    pub fn with_scope(
        self,
        id: &str,
        name: &str,
        result: Result<Vec<Recommendation>, FetchError>,
    ) -> Self {
        let behaviour = match result {
            Ok(records) => Behaviour::Records(records),
            Err(error) => Behaviour::Fail(error),
        };
        self.push(id, name, behaviour)
    }

    pub fn with_failing_stream(
        self,
        id: &str,
        name: &str,
        before: Vec<Recommendation>,
        error: FetchError,
    ) -> Self {
        self.push(id, name, Behaviour::FailMidStream(before, error))
    }

    pub fn with_listing_error(mut self, error: FetchError) -> Self {
        self.listing_error = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl AdvisorSession for StubSession {
    fn list_scopes(&self) -> Result<Vec<ScopeInfo>, FetchError> {
        if let Some(error) = &self.listing_error {
            return Err(error.clone());
        }
        Ok(self.scopes.iter().map(|(info, _)| info.clone()).collect())
    }

    fn recommendations(&self, scope: &ScopeId) -> Result<RecommendationStream<'_>, FetchError> {
        self.calls.borrow_mut().push(scope.to_string());
        let (_, behaviour) = self
            .scopes
            .iter()
            .find(|(info, _)| info.id == *scope)
            .ok_or_else(|| FetchError::scope(scope, "unknown to stub"))?;

        match behaviour {
            Behaviour::Records(records) => Ok(Box::new(records.clone().into_iter().map(Ok))),
            Behaviour::Fail(error) => Err(error.clone()),
            Behaviour::FailMidStream(before, error) => Ok(Box::new(
                before
                    .clone()
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error.clone()))),
            )),
        }
    }
}
