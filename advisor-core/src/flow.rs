use advisor_sdk::AdvisorSession;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{Aggregation, FailurePolicy, ScopeFailure, aggregate};
use crate::scope::{ScopeSelection, resolve_scopes};
use crate::table::{ReportMode, ResourceDimension, format_table};
use crate::{AdvisorError, Report};

/// Everything one report run needs besides the session.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub selection: ScopeSelection,
    pub resource: ResourceDimension,
    pub policy: FailurePolicy,
}

impl ReportRequest {
    pub fn new(selection: ScopeSelection) -> Self {
        Self {
            selection,
            resource: ResourceDimension::default(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn mode(&self) -> ReportMode {
        ReportMode::new(self.selection.mode(), self.resource)
    }
}

/// Nothing to report: every queried scope came back empty or was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct EmptyResult {
    pub scopes_queried: usize,
    pub skipped: Vec<ScopeFailure>,
}

#[derive(Debug)]
pub enum Outcome {
    Report(Report),
    Empty(EmptyResult),
}

/// Resolves scopes, aggregates, then formats the table.
pub fn run_report(
    session: &dyn AdvisorSession,
    request: &ReportRequest,
) -> Result<Outcome, AdvisorError> {
    let mode = request.mode();
    let resolved = resolve_scopes(&request.selection, session)?;
    debug!(scopes = resolved.scopes.len(), mode = ?mode, "resolved scopes");

    let aggregation = aggregate(
        session,
        &resolved.scopes,
        request.policy,
        mode.scope.is_multi(),
    )?;

    match aggregation {
        Aggregation::Empty { skipped } => {
            info!(scopes = resolved.scopes.len(), "nothing to report");
            Ok(Outcome::Empty(EmptyResult {
                scopes_queried: resolved.scopes.len(),
                skipped,
            }))
        }
        Aggregation::Records { records, skipped } => {
            let table = format_table(&records, mode);
            Ok(Outcome::Report(Report::new(
                table,
                mode,
                resolved.label,
                skipped,
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    AwaitingInput,
    Fetching,
    Displaying,
    NothingToReport,
    Failed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Displaying | FlowState::NothingToReport | FlowState::Failed
        )
    }
}

/// Tracks the interactive request cycle around [`run_report`].
#[derive(Debug, Default)]
pub struct ReportFlow {
    state: FlowState,
}

impl ReportFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = FlowState::AwaitingInput;
    }

    /// Runs one request. A terminal state counts as awaiting input again;
    /// a flow left in `Fetching` by an interrupted run refuses new work
    /// until [`ReportFlow::reset`].
    pub fn submit<F>(&mut self, run: F) -> Result<Outcome, AdvisorError>
    where
        F: FnOnce() -> Result<Outcome, AdvisorError>,
    {
        if self.state.is_terminal() {
            self.reset();
        }
        if self.state != FlowState::AwaitingInput {
            return Err(AdvisorError::Validation(
                "a report is already being fetched".to_string(),
            ));
        }

        self.state = FlowState::Fetching;
        let result = run();
        self.state = match &result {
            Ok(Outcome::Report(_)) => FlowState::Displaying,
            Ok(Outcome::Empty(_)) => FlowState::NothingToReport,
            Err(_) => FlowState::Failed,
        };
        debug!(state = ?self.state, "report flow finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeMode;
    use crate::table::Column;
    use crate::testing::{StubSession, rec};
    use advisor_sdk::{Credential, FetchContext, FetchError, FetchErrorKind};
    use std::io::Write;

    // Link the fixture source so it registers during tests.
    use mod_fixture as _;

    const A: &str = "11111111-1111-1111-1111-111111111111";
    const B: &str = "22222222-2222-2222-2222-222222222222";

    fn two_scopes() -> StubSession {
        StubSession::new()
            .with_scope(A, "Production", Ok(vec![rec("A0"), rec("A1")]))
            .with_scope(B, "Staging", Ok(vec![rec("B0"), rec("B1"), rec("B2")]))
    }

    #[test]
    fn all_accessible_run_builds_multi_subscription_table() {
        let session = two_scopes();
        let request = ReportRequest::new(ScopeSelection::AllAccessible);
        let Outcome::Report(report) = run_report(&session, &request).expect("run") else {
            panic!("expected a report");
        };
        assert_eq!(report.table.len(), 5);
        assert_eq!(report.table.columns()[0], Column::Subscription);
        assert_eq!(report.table.rows()[2][0], B);
        assert_eq!(report.summary.total, 5);
        assert_eq!(report.label(), None);
    }

    #[test]
    fn single_subscription_run_has_no_subscription_column() {
        let session = two_scopes();
        let request = ReportRequest {
            resource: ResourceDimension::Omitted,
            ..ReportRequest::new(ScopeSelection::single(A).expect("id"))
        };
        let Outcome::Report(report) = run_report(&session, &request).expect("run") else {
            panic!("expected a report");
        };
        assert_eq!(report.table.columns().len(), 4);
        assert_eq!(report.metadata.mode.scope, ScopeMode::SingleSubscription);
        assert_eq!(report.label(), Some(A));
        assert_eq!(session.calls(), vec![A.to_string()]);
    }

    #[test]
    fn display_name_selection_labels_report_with_name() {
        let session = two_scopes();
        let request = ReportRequest::new(ScopeSelection::by_display_name("Staging").expect("name"));
        let Outcome::Report(report) = run_report(&session, &request).expect("run") else {
            panic!("expected a report");
        };
        assert_eq!(report.label(), Some("Staging"));
        assert_eq!(report.pdf_filename(), "azure_advisor_report_Staging.pdf");
    }

    #[test]
    fn empty_listing_is_nothing_to_report() {
        let session = StubSession::new();
        let request = ReportRequest::new(ScopeSelection::AllAccessible);
        match run_report(&session, &request).expect("run") {
            Outcome::Empty(empty) => assert_eq!(empty.scopes_queried, 0),
            Outcome::Report(_) => panic!("expected empty outcome"),
        }
    }

    #[test]
    fn listing_failure_surfaces_as_fetch_error() {
        let session = StubSession::new().with_listing_error(FetchError::Auth("expired".into()));
        let request = ReportRequest::new(ScopeSelection::AllAccessible);
        let err = run_report(&session, &request).unwrap_err();
        assert!(matches!(err, AdvisorError::Fetch(ref e) if e.kind() == FetchErrorKind::Auth));
    }

    #[test]
    fn flow_moves_through_states() {
        let session = two_scopes();
        let mut flow = ReportFlow::new();
        assert_eq!(flow.state(), FlowState::AwaitingInput);

        let request = ReportRequest::new(ScopeSelection::AllAccessible);
        flow.submit(|| run_report(&session, &request)).expect("report");
        assert_eq!(flow.state(), FlowState::Displaying);

        let empty = StubSession::new();
        flow.submit(|| run_report(&empty, &request)).expect("empty");
        assert_eq!(flow.state(), FlowState::NothingToReport);

        let failing = StubSession::new().with_listing_error(FetchError::Transient("503".into()));
        assert!(flow.submit(|| run_report(&failing, &request)).is_err());
        assert_eq!(flow.state(), FlowState::Failed);

        flow.reset();
        assert_eq!(flow.state(), FlowState::AwaitingInput);
    }

    #[test]
    fn interrupted_flow_rejects_new_submissions() {
        let mut flow = ReportFlow {
            state: FlowState::Fetching,
        };
        let err = flow
            .submit(|| Ok(Outcome::Empty(EmptyResult { scopes_queried: 0, skipped: vec![] })))
            .unwrap_err();
        assert!(matches!(err, AdvisorError::Validation(_)));
        assert_eq!(flow.state(), FlowState::Fetching);
    }

    #[test]
    fn fixture_source_end_to_end() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{
                "subscriptions": [
                    {{
                        "subscription_id": "{A}",
                        "display_name": "Production",
                        "recommendations": [
                            {{ "category": "Cost", "problem": "Idle VM", "solution": "Deallocate", "impact": "High", "resource_group": "rg-prod" }},
                            {{ "category": "Security", "problem": "No MFA", "solution": "Enable MFA", "impact": "Medium" }}
                        ]
                    }},
                    {{ "subscription_id": "{B}", "denied": true }}
                ]
            }}"#
        )
        .expect("write fixture");

        let source = advisor_sdk::find_source("fixture").expect("fixture source registered");
        let session = source
            .connect(
                &Credential::new("tenant", "client", "secret"),
                &FetchContext::with_fixture(file.path()),
            )
            .expect("connect");

        let request = ReportRequest {
            policy: FailurePolicy::Skip,
            ..ReportRequest::new(ScopeSelection::AllAccessible)
        };
        let Outcome::Report(report) = run_report(session.as_ref(), &request).expect("run") else {
            panic!("expected a report");
        };
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].scope.as_str(), B);
        assert_eq!(report.table.rows()[1][5], "N/A");
        assert_eq!(report.summary.distinct_resources.map(|d| d.count), Some(2));

        let abort = ReportRequest::new(ScopeSelection::AllAccessible);
        let err = run_report(session.as_ref(), &abort).unwrap_err();
        assert!(matches!(err, AdvisorError::Fetch(ref e) if e.kind() == FetchErrorKind::Scope));
    }
}
