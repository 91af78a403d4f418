//! End-to-end workflow scenarios over stub tools and scripted providers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use conflux::config::OrchestratorConfig;
use conflux::error::{ErrorKind, GatewayError, ToolError};
use conflux::gateway::{CompletionRequest, LlmGateway, LlmProvider};
use conflux::plan::{AgentType, DataSourceClass};
use conflux::registry::{
    ParameterKind, ParameterSpec, SemanticType, Tool, ToolDescriptor, ToolRegistry, ToolResult,
};
use conflux::state::AgentState;
use conflux::workflow::{WorkflowDriver, WorkflowEvent, format};

/// Provider that replays a fixed sequence of outcomes, then keeps
/// failing.
struct SequenceProvider {
    outcomes: Mutex<VecDeque<Result<Value, String>>>,
}

impl SequenceProvider {
    fn new(outcomes: Vec<Result<Value, String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
        }
    }

    /// Provider that fails every call (completion service down).
    fn offline() -> Self {
        Self::new(Vec::new())
    }

    fn analysis(body: Value) -> Value {
        json!({"choices": [{"message": {"content": body.to_string()}}]})
    }
}

#[async_trait]
impl LlmProvider for SequenceProvider {
    fn name(&self) -> &'static str {
        "sequence"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Value, GatewayError> {
        let next = self
            .outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(GatewayError::Request {
                message,
                status: None,
            }),
            None => Err(GatewayError::Request {
                message: "no scripted response left".to_string(),
                status: None,
            }),
        }
    }
}

type Rows = Vec<Map<String, Value>>;

fn rows(value: Value) -> Rows {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

/// Tool stub that records received arguments and replays outcomes.
struct StubTool {
    descriptor: ToolDescriptor,
    outcome: Result<Rows, ToolError>,
    captured: Mutex<Vec<Map<String, Value>>>,
    delay: Duration,
}

impl StubTool {
    fn ok(descriptor: ToolDescriptor, result_rows: Rows) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            outcome: Ok(result_rows),
            captured: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    fn failing(descriptor: ToolDescriptor, error: ToolError) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            outcome: Err(error),
            captured: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    fn sleeping(descriptor: ToolDescriptor, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            outcome: Ok(Vec::new()),
            captured: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn calls(&self) -> Vec<Map<String, Value>> {
        self.captured
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Tool for StubTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        arguments: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        self.captured
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(arguments);
        if !self.delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(ToolError::Upstream {
                        message: "invocation cancelled".to_string(),
                    });
                }
                () = tokio::time::sleep(self.delay) => {}
            }
        }
        self.outcome
            .clone()
            .map(|rows| ToolResult::from_rows(rows, &self.descriptor.name))
    }
}

fn list_alerts_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "list_alerts",
        "List alerts filtered by status. Keywords: alerts, open, show.",
        DataSourceClass::RestApi,
    )
    .with_parameters(vec![ParameterSpec::required(
        "status",
        ParameterKind::Query,
        SemanticType::String,
    )])
}

fn registry_of(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    let mut builder = ToolRegistry::builder();
    for tool in tools {
        builder.register(tool).unwrap();
    }
    Arc::new(builder.build())
}

fn driver(
    registry: Arc<ToolRegistry>,
    provider: SequenceProvider,
    config: OrchestratorConfig,
) -> WorkflowDriver {
    WorkflowDriver::new(
        registry,
        Arc::new(LlmGateway::new(Arc::new(provider))),
        config,
    )
}

/// Runs the workflow to completion, returning the final state and the
/// emitted events in order.
async fn run_to_completion(
    driver: WorkflowDriver,
    query: &str,
    cancel: CancellationToken,
) -> (AgentState, Vec<WorkflowEvent>) {
    let state = AgentState::new(query, Map::new());
    let (tx, mut rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { driver.run(state, tx, cancel).await });
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    let state = handle.await.unwrap();
    (state, events)
}

fn final_response(events: &[WorkflowEvent]) -> Option<String> {
    events.iter().find_map(|e| match e {
        WorkflowEvent::Completed { final_response } => Some(final_response.clone()),
        WorkflowEvent::Node(_) => None,
    })
}

#[tokio::test]
async fn single_source_read_binds_status_and_lists_ids() {
    // S1: one REST tool, heuristic planning and binding (LLM offline).
    let tool = StubTool::ok(
        list_alerts_descriptor(),
        rows(json!([{"alert_id": "A1"}, {"alert_id": "A2"}])),
    );
    let registry = registry_of(vec![Arc::clone(&tool) as Arc<dyn Tool>]);
    let driver = driver(
        registry,
        SequenceProvider::offline(),
        OrchestratorConfig::default(),
    );

    let (state, events) = run_to_completion(
        driver,
        "Show me all open alerts",
        CancellationToken::new(),
    )
    .await;

    // One REST step executed with status bound from the query text.
    assert_eq!(state.rest_results().len(), 1);
    assert!(state.rest_results()[0].ok);
    let calls = tool.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].get("status"), Some(&Value::String("open".to_string())));

    let text = final_response(&events).expect("run must complete");
    assert!(text.contains("A1") && text.contains("A2"), "got: {text}");
    assert!(!text.is_empty());
    assert_eq!(state.final_response(), Some(text.as_str()));
}

#[tokio::test]
async fn cross_source_join_merges_users_and_alerts() {
    // S2: REST users then SQL alerts, joined on user_id.
    let users = StubTool::ok(
        ToolDescriptor::new(
            "list_users",
            "List users of a department. Keywords: users, engineering, department.",
            DataSourceClass::RestApi,
        )
        .with_parameters(vec![ParameterSpec::optional(
            "department",
            ParameterKind::Query,
            SemanticType::String,
        )]),
        rows(json!([{"user_id": "U7", "dept": "Eng"}])),
    );
    let alerts = StubTool::ok(
        ToolDescriptor::new(
            "alerts_by_user",
            "Query alerts for a user id. Keywords: alerts, severity, user.",
            DataSourceClass::RelationalDb,
        )
        .with_parameters(vec![ParameterSpec::optional(
            "user_id",
            ParameterKind::Positional,
            SemanticType::String,
        )]),
        rows(json!([{"alert_id": "A9", "user_id": "U7", "severity": "high"}])),
    );
    let registry = registry_of(vec![
        Arc::clone(&users) as Arc<dyn Tool>,
        Arc::clone(&alerts) as Arc<dyn Tool>,
    ]);

    // Analysis succeeds, both tool-selection calls fail (fallback to the
    // top-ranked candidate), and the consolidation call returns a table.
    let table = "| user_id | alert_id | severity |\n| --- | --- | --- |\n| U7 | A9 | high |";
    let provider = SequenceProvider::new(vec![
        Ok(SequenceProvider::analysis(json!({
            "intent": "find high severity alerts for engineering users",
            "entities": [],
            "required_sources": ["rest_api", "relational_db"],
            "requires_consolidation": true,
            "estimated_complexity": "high"
        }))),
        Err("selection service down".to_string()),
        Err("selection service down".to_string()),
        Ok(json!({"content": table})),
    ]);
    let driver = driver(registry, provider, OrchestratorConfig::default());

    let (state, events) = run_to_completion(
        driver,
        "High severity alerts for Engineering users",
        CancellationToken::new(),
    )
    .await;

    assert_eq!(state.rest_results().len(), 1);
    assert_eq!(state.sql_results().len(), 1);
    assert!(state.plan().unwrap().requires_consolidation);

    let text = final_response(&events).expect("run must complete");
    // Joined rows render as a markdown table carrying both sources' data.
    assert!(text.contains('|'), "expected markdown table: {text}");
    assert!(text.contains("U7"));
    assert!(text.contains("A9"));
}

#[tokio::test]
async fn partial_failure_still_completes_with_note() {
    // S3: step 1 succeeds, step 2's tool reports an upstream failure.
    let users = StubTool::ok(
        ToolDescriptor::new(
            "list_users",
            "List users of a department. Keywords: users, engineering, department.",
            DataSourceClass::RestApi,
        ),
        rows(json!([{"user_id": "U7", "dept": "Eng"}])),
    );
    let alerts = StubTool::failing(
        ToolDescriptor::new(
            "alerts_by_user",
            "Query alerts for a user id. Keywords: alerts, severity, user.",
            DataSourceClass::RelationalDb,
        ),
        ToolError::Upstream {
            message: "HTTP 503 from upstream".to_string(),
        },
    );
    let registry = registry_of(vec![
        Arc::clone(&users) as Arc<dyn Tool>,
        Arc::clone(&alerts) as Arc<dyn Tool>,
    ]);
    let provider = SequenceProvider::new(vec![Ok(SequenceProvider::analysis(json!({
        "intent": "alerts for users",
        "required_sources": ["rest_api", "relational_db"],
        "requires_consolidation": true,
        "estimated_complexity": "med"
    })))]);
    let driver = driver(registry, provider, OrchestratorConfig::default());

    let (state, events) = run_to_completion(
        driver,
        "alerts for engineering users",
        CancellationToken::new(),
    )
    .await;

    // The failure is recorded against step 2 and does not abort the run.
    let step2_errors: Vec<_> = state
        .errors()
        .iter()
        .filter(|e| e.step_number == Some(2))
        .collect();
    assert_eq!(step2_errors.len(), 1);
    assert_eq!(step2_errors[0].kind, ErrorKind::Upstream);
    assert!(!state.sql_results()[0].ok);

    let text = final_response(&events).expect("run must still complete");
    assert!(text.contains("U7"), "step 1 data present: {text}");
    assert!(text.contains("partial data"), "failure note present: {text}");
    // Raw backend detail never reaches the user.
    assert!(!text.contains("503"));
}

#[tokio::test]
async fn node_timeout_converts_to_failed_result() {
    // S4: node timeout 1 s, tool sleeps 5 s.
    let sleeper = StubTool::sleeping(list_alerts_descriptor(), Duration::from_secs(5));
    let registry = registry_of(vec![Arc::clone(&sleeper) as Arc<dyn Tool>]);
    let config = OrchestratorConfig::builder()
        .node_timeout(Duration::from_secs(1))
        .build();
    let driver = driver(registry, SequenceProvider::offline(), config);

    let start = Instant::now();
    let (state, events) = run_to_completion(driver, "show open alerts", CancellationToken::new())
        .await;
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_secs(3), "no hang: {elapsed:?}");
    let result = &state.rest_results()[0];
    assert!(!result.ok);
    assert_eq!(result.error, Some(ErrorKind::Timeout));
    assert!(final_response(&events).is_some());
}

#[tokio::test]
async fn cancellation_stops_run_without_completion() {
    // S5 (driver level): cancel shortly after start; no terminal event.
    let sleeper = StubTool::sleeping(list_alerts_descriptor(), Duration::from_secs(30));
    let registry = registry_of(vec![Arc::clone(&sleeper) as Arc<dyn Tool>]);
    let config = OrchestratorConfig::builder()
        .node_timeout(Duration::from_secs(60))
        .build();
    let driver = driver(registry, SequenceProvider::offline(), config);

    let cancel = CancellationToken::new();
    let child = cancel.clone();
    let state = AgentState::new("show open alerts", Map::new());
    let (tx, mut rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { driver.run(state, tx, child).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    let state = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancelled run must return promptly")
        .unwrap();

    assert!(final_response(&events).is_none(), "no completion after cancel");
    assert!(state.has_error(ErrorKind::Cancelled));
    assert!(state.final_response().is_none());
}

#[tokio::test]
async fn unparseable_analysis_falls_back_to_top_ranked_class() {
    // S6: the completion service answers nonsense; the plan degrades to
    // one step of the top-ranked tool's class.
    let tool = StubTool::ok(
        list_alerts_descriptor(),
        rows(json!([{"alert_id": "A1"}])),
    );
    let registry = registry_of(vec![Arc::clone(&tool) as Arc<dyn Tool>]);
    let provider = SequenceProvider::new(vec![Ok(SequenceProvider::analysis(json!(
        "I'd rather chat about the weather."
    )))]);
    let driver = driver(registry, provider, OrchestratorConfig::default());

    let (state, events) = run_to_completion(driver, "show open alerts", CancellationToken::new())
        .await;

    let plan = state.plan().unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.steps[0].agent_type, AgentType::Rest);
    assert!(final_response(&events).is_some());
}

#[tokio::test]
async fn empty_catalogue_ends_without_invoking_agents() {
    // Property 10: empty registry → empty plan → no agent runs.
    let registry = Arc::new(ToolRegistry::builder().build());
    let driver = driver(
        registry,
        SequenceProvider::offline(),
        OrchestratorConfig::default(),
    );

    let (state, events) = run_to_completion(driver, "anything", CancellationToken::new()).await;

    assert!(state.has_error(ErrorKind::Plan));
    assert_eq!(state.all_results().count(), 0);
    let text = final_response(&events).expect("still answers");
    assert!(
        text.contains("could not be planned"),
        "empty-plan flavored answer: {text}"
    );
}

#[tokio::test]
async fn single_step_final_equals_deterministic_formatting() {
    // Property 11: consolidation disabled, one tool, one step.
    let result_rows = rows(json!([{"alert_id": "A1"}, {"alert_id": "A2"}, {"alert_id": "A3"}]));
    let tool = StubTool::ok(list_alerts_descriptor(), result_rows.clone());
    let registry = registry_of(vec![Arc::clone(&tool) as Arc<dyn Tool>]);
    let driver = driver(
        registry,
        SequenceProvider::offline(),
        OrchestratorConfig::default(),
    );

    let (state, events) = run_to_completion(driver, "show open alerts", CancellationToken::new())
        .await;

    assert!(!state.plan().unwrap().requires_consolidation);
    let text = final_response(&events).unwrap();
    assert_eq!(text, format::render_auto(&result_rows, None));
}

#[tokio::test]
async fn iteration_cap_terminates_with_incomplete() {
    // Property 12: a three-step plan against a cap of two supervisor
    // visits consolidates instead of looping.
    let rest = StubTool::ok(
        ToolDescriptor::new("users", "List users", DataSourceClass::RestApi),
        rows(json!([{"user_id": "U1"}])),
    );
    let sql = StubTool::ok(
        ToolDescriptor::new("alerts", "Query alerts", DataSourceClass::RelationalDb),
        rows(json!([{"alert_id": "A1"}])),
    );
    let soap = StubTool::ok(
        ToolDescriptor::new("accounts", "Fetch accounts", DataSourceClass::SoapApi),
        rows(json!([{"account_no": "C1"}])),
    );
    let registry = registry_of(vec![
        Arc::clone(&rest) as Arc<dyn Tool>,
        Arc::clone(&sql) as Arc<dyn Tool>,
        Arc::clone(&soap) as Arc<dyn Tool>,
    ]);
    let provider = SequenceProvider::new(vec![Ok(SequenceProvider::analysis(json!({
        "intent": "everything",
        "required_sources": ["rest_api", "relational_db", "soap_api"],
        "requires_consolidation": true,
        "estimated_complexity": "high"
    })))]);
    let config = OrchestratorConfig::builder().max_iterations(2).build();
    let driver = driver(registry, provider, config);

    let start = Instant::now();
    let (state, events) = run_to_completion(driver, "everything", CancellationToken::new()).await;

    assert!(start.elapsed() < Duration::from_secs(10), "must not loop");
    assert!(
        state
            .errors()
            .iter()
            .any(|e| e.message.contains("incomplete")),
        "incomplete marker recorded: {:?}",
        state.errors()
    );
    assert!(final_response(&events).is_some());
}

#[tokio::test]
async fn result_sequences_only_grow_and_cursor_is_monotone() {
    // Property 2, observed across a two-step run via the event stream.
    let users = StubTool::ok(
        ToolDescriptor::new("users", "List users of a department", DataSourceClass::RestApi),
        rows(json!([{"user_id": "U7"}])),
    );
    let alerts = StubTool::ok(
        ToolDescriptor::new("alerts", "Query alerts for a user", DataSourceClass::RelationalDb),
        rows(json!([{"alert_id": "A9", "user_id": "U7"}])),
    );
    let registry = registry_of(vec![
        Arc::clone(&users) as Arc<dyn Tool>,
        Arc::clone(&alerts) as Arc<dyn Tool>,
    ]);
    let provider = SequenceProvider::new(vec![Ok(SequenceProvider::analysis(json!({
        "intent": "list users and their alerts",
        "required_sources": ["rest_api", "relational_db"],
        "requires_consolidation": true,
        "estimated_complexity": "med"
    })))]);
    let driver = driver(registry, provider, OrchestratorConfig::default());

    let (state, events) = run_to_completion(driver, "alerts for users", CancellationToken::new())
        .await;

    // Step numbers in agent events never decrease.
    let mut last_step = 0;
    for event in &events {
        if let WorkflowEvent::Node(update) = event {
            if let (Some(step), Some(_)) = (update.step_number, update.ok) {
                assert!(step >= last_step, "step cursor went backwards");
                last_step = step;
            }
        }
    }
    assert_eq!(state.rest_results().len(), 1);
    assert_eq!(state.sql_results().len(), 1);
}
