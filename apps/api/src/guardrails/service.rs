//! Guardrail orchestration: ordered registries and stage execution.
//!
//! Execution model:
//! - Guardrails run in ascending priority. Ties keep registration order.
//! - Guardrails sharing a priority run concurrently; their results are still
//!   reported in registration order.
//! - A guardrail that errors, panics or exceeds the timeout yields a
//!   `GuardrailFailure` deny result. Failures deny in every mode.
//! - With `fail_fast`, execution stops after the first priority level that
//!   denies; later guardrails are reported as skipped.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::guardrails::{
    Guardrail, GuardrailContext, GuardrailResult, InputGuardrail, OutputGuardrail,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Output,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Output => "output",
        }
    }
}

/// How tripwires affect the aggregate `allow_execution` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Any tripwire denies execution.
    #[default]
    Enforce,
    /// Tripwires are reported but do not deny. Guardrail failures still deny.
    Monitor,
}

impl EnforcementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementMode::Enforce => "enforce",
            EnforcementMode::Monitor => "monitor",
        }
    }
}

impl FromStr for EnforcementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(EnforcementMode::Enforce),
            "monitor" => Ok(EnforcementMode::Monitor),
            other => Err(format!(
                "unknown guardrail mode '{other}' (expected 'enforce' or 'monitor')"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub mode: EnforcementMode,
    pub fail_fast: bool,
    /// Upper bound for a single guardrail call.
    pub timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            mode: EnforcementMode::Enforce,
            fail_fast: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Registry entry as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredGuardrail {
    pub name: String,
    pub priority: i32,
    pub stage: Stage,
}

type Registry = RwLock<Vec<Arc<dyn Guardrail>>>;

/// Holds the input and output guardrail registries and runs them.
///
/// Registries are kept sorted on insert, so a run only snapshots the vector
/// and never holds the lock while a guardrail is executing.
pub struct GuardrailService {
    input: Registry,
    output: Registry,
    options: ServiceOptions,
}

impl Default for GuardrailService {
    fn default() -> Self {
        Self::new(ServiceOptions::default())
    }
}

impl GuardrailService {
    pub fn new(options: ServiceOptions) -> Self {
        Self {
            input: RwLock::new(Vec::new()),
            output: RwLock::new(Vec::new()),
            options,
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Adds an input guardrail. Registration is not idempotent: registering the
    /// same name twice keeps both entries and logs a warning.
    pub async fn register_input_guardrail<G: InputGuardrail + 'static>(&self, guardrail: G) {
        register(&self.input, Stage::Input, Arc::new(guardrail)).await;
    }

    /// Adds an output guardrail. Same duplicate semantics as the input registry.
    pub async fn register_output_guardrail<G: OutputGuardrail + 'static>(&self, guardrail: G) {
        register(&self.output, Stage::Output, Arc::new(guardrail)).await;
    }

    pub async fn input_guardrails(&self) -> Vec<RegisteredGuardrail> {
        describe(&self.input, Stage::Input).await
    }

    pub async fn output_guardrails(&self) -> Vec<RegisteredGuardrail> {
        describe(&self.output, Stage::Output).await
    }

    /// Runs every input guardrail against `context` and aggregates the results.
    pub async fn execute_input_guardrails(&self, context: &GuardrailContext) -> GuardrailResult {
        self.run_stage(Stage::Input, &self.input, context).await
    }

    /// Runs every output guardrail against `context` and aggregates the results.
    pub async fn execute_output_guardrails(&self, context: &GuardrailContext) -> GuardrailResult {
        self.run_stage(Stage::Output, &self.output, context).await
    }

    async fn run_stage(
        &self,
        stage: Stage,
        registry: &Registry,
        context: &GuardrailContext,
    ) -> GuardrailResult {
        let snapshot: Vec<Arc<dyn Guardrail>> = registry.read().await.clone();

        let mut outcomes: Vec<Outcome> = Vec::with_capacity(snapshot.len());
        let mut skipped: Vec<String> = Vec::new();
        let mut halted = false;

        for group in snapshot.chunk_by(|a, b| a.priority() == b.priority()) {
            if halted {
                skipped.extend(group.iter().map(|g| g.name().to_string()));
                continue;
            }

            let results = join_all(
                group
                    .iter()
                    .map(|g| self.invoke(stage, g.as_ref(), context)),
            )
            .await;

            for (guardrail, (result, elapsed)) in group.iter().zip(results) {
                outcomes.push(Outcome {
                    name: guardrail.name().to_string(),
                    priority: guardrail.priority(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    result,
                });
            }

            let group_denied = outcomes
                .iter()
                .rev()
                .take(group.len())
                .any(|o| denies(&o.result, self.options.mode));

            if self.options.fail_fast && group_denied {
                debug!(
                    "{} guardrails halted at priority {} (fail-fast)",
                    stage.as_str(),
                    group[0].priority()
                );
                halted = true;
            }
        }

        let aggregate = aggregate(stage, self.options.mode, &outcomes, skipped);

        info!(
            "{} guardrails for session {} (agent {}): evaluated={}, tripwire={}, allow={}",
            stage.as_str(),
            context.session_id,
            context.agent_name,
            outcomes.len(),
            aggregate.tripwire_triggered,
            aggregate.allow_execution
        );

        aggregate
    }

    /// Calls one guardrail, converting errors, panics and timeouts into deny results.
    async fn invoke(
        &self,
        stage: Stage,
        guardrail: &dyn Guardrail,
        context: &GuardrailContext,
    ) -> (GuardrailResult, Duration) {
        let name = guardrail.name();
        let started = Instant::now();

        let call = AssertUnwindSafe(guardrail.validate(context)).catch_unwind();

        let result = match tokio::time::timeout(self.options.timeout, call).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                error!("Guardrail {} errored on {}: {}", name, stage.as_str(), e);
                GuardrailResult::failure(name, e.to_string())
            }
            Ok(Err(payload)) => {
                let reason = panic_message(payload.as_ref());
                error!("Guardrail {} panicked on {}: {}", name, stage.as_str(), reason);
                GuardrailResult::failure(name, format!("panicked: {reason}"))
            }
            Err(_) => {
                error!(
                    "Guardrail {} timed out on {} after {}ms",
                    name,
                    stage.as_str(),
                    self.options.timeout.as_millis()
                );
                GuardrailResult::failure(
                    name,
                    format!("timed out after {}ms", self.options.timeout.as_millis()),
                )
            }
        };

        if result.tripwire_triggered && !result.is_failure() {
            warn!(
                "Guardrail {} triggered on {}: {}",
                name,
                stage.as_str(),
                result.message.as_deref().unwrap_or("no message")
            );
        }

        (result, started.elapsed())
    }
}

struct Outcome {
    name: String,
    priority: i32,
    elapsed_ms: u64,
    result: GuardrailResult,
}

async fn register(registry: &Registry, stage: Stage, guardrail: Arc<dyn Guardrail>) {
    let mut guardrails = registry.write().await;

    if guardrails.iter().any(|g| g.name() == guardrail.name()) {
        warn!(
            "Duplicate {} guardrail name '{}' registered; both entries will run",
            stage.as_str(),
            guardrail.name()
        );
    }

    // Insert after every entry with priority <= new priority: keeps the vector
    // sorted and ties in registration order.
    let position = guardrails.partition_point(|g| g.priority() <= guardrail.priority());
    info!(
        "Registered {} guardrail '{}' (priority {})",
        stage.as_str(),
        guardrail.name(),
        guardrail.priority()
    );
    guardrails.insert(position, guardrail);
}

async fn describe(registry: &Registry, stage: Stage) -> Vec<RegisteredGuardrail> {
    registry
        .read()
        .await
        .iter()
        .map(|g| RegisteredGuardrail {
            name: g.name().to_string(),
            priority: g.priority(),
            stage,
        })
        .collect()
}

fn denies(result: &GuardrailResult, mode: EnforcementMode) -> bool {
    match mode {
        EnforcementMode::Enforce => result.tripwire_triggered || !result.allow_execution,
        EnforcementMode::Monitor => result.is_failure(),
    }
}

fn aggregate(
    stage: Stage,
    mode: EnforcementMode,
    outcomes: &[Outcome],
    skipped: Vec<String>,
) -> GuardrailResult {
    let allow_execution = !outcomes.iter().any(|o| denies(&o.result, mode));
    let triggered: Vec<&Outcome> = outcomes
        .iter()
        .filter(|o| o.result.tripwire_triggered)
        .collect();

    let evaluated: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
    let report: Vec<Value> = outcomes
        .iter()
        .map(|o| {
            json!({
                "guardrail": o.name,
                "priority": o.priority,
                "tripwire_triggered": o.result.tripwire_triggered,
                "allow_execution": o.result.allow_execution,
                "violation_type": o.result.violation_type,
                "message": o.result.message,
                "details": o.result.details,
                "elapsed_ms": o.elapsed_ms,
            })
        })
        .collect();

    let mut result = match triggered.first() {
        None => GuardrailResult::pass(),
        Some(first) => {
            let message = if triggered.len() == 1 {
                first.result.message.clone()
            } else {
                let names: Vec<&str> = triggered.iter().map(|o| o.name.as_str()).collect();
                Some(format!(
                    "{} guardrails triggered: {}",
                    triggered.len(),
                    names.join(", ")
                ))
            };

            GuardrailResult {
                tripwire_triggered: true,
                violation_type: first.result.violation_type,
                message,
                details: Default::default(),
                allow_execution: false,
                recommendations: triggered
                    .iter()
                    .flat_map(|o| o.result.recommendations.iter().cloned())
                    .collect(),
            }
        }
    };

    result.allow_execution = allow_execution;
    result
        .with_detail("stage", stage.as_str())
        .with_detail("mode", mode.as_str())
        .with_detail("evaluated", json!(evaluated))
        .with_detail("skipped", json!(skipped))
        .with_detail("outcomes", Value::Array(report))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::{GuardrailError, ViolationType};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Barrier;
    use uuid::Uuid;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Pass,
        Trip(&'static str),
        Error,
        Panic,
        Hang,
    }

    struct Probe {
        name: &'static str,
        priority: i32,
        behaviour: Behaviour,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        fn new(
            name: &'static str,
            priority: i32,
            behaviour: Behaviour,
            log: &Arc<Mutex<Vec<String>>>,
        ) -> Self {
            Self {
                name,
                priority,
                behaviour,
                log: Arc::clone(log),
            }
        }
    }

    #[async_trait]
    impl Guardrail for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn validate(
            &self,
            _context: &GuardrailContext,
        ) -> Result<GuardrailResult, GuardrailError> {
            self.log.lock().unwrap().push(self.name.to_string());
            match self.behaviour {
                Behaviour::Pass => Ok(GuardrailResult::pass()),
                Behaviour::Trip(rec) => Ok(GuardrailResult::tripwire(
                    ViolationType::LowQuality,
                    format!("{} tripped", self.name),
                )
                .with_recommendation(rec)),
                Behaviour::Error => Err(GuardrailError::Internal("backend down".to_string())),
                Behaviour::Panic => panic!("validator exploded"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(GuardrailResult::pass())
                }
            }
        }
    }

    impl InputGuardrail for Probe {}
    impl OutputGuardrail for Probe {}

    fn ctx() -> GuardrailContext {
        GuardrailContext::new("tailor", Uuid::new_v4(), "some input")
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn calls(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_empty_registries_pass() {
        let service = GuardrailService::default();

        let input = service.execute_input_guardrails(&ctx()).await;
        let output = service.execute_output_guardrails(&ctx()).await;

        for r in [input, output] {
            assert!(!r.tripwire_triggered);
            assert!(r.allow_execution);
            assert!(r.recommendations.is_empty());
        }
    }

    #[tokio::test]
    async fn test_executes_in_ascending_priority_regardless_of_registration_order() {
        let log = log();
        let service = GuardrailService::default();
        service
            .register_input_guardrail(Probe::new("second", 2, Behaviour::Pass, &log))
            .await;
        service
            .register_input_guardrail(Probe::new("third", 3, Behaviour::Pass, &log))
            .await;
        service
            .register_input_guardrail(Probe::new("first", 1, Behaviour::Pass, &log))
            .await;

        let r = service.execute_input_guardrails(&ctx()).await;

        assert!(r.allow_execution);
        assert_eq!(calls(&log), vec!["first", "second", "third"]);
        assert_eq!(r.details["evaluated"], json!(["first", "second", "third"]));
    }

    #[tokio::test]
    async fn test_priority_one_then_two() {
        let log = log();
        let service = GuardrailService::default();
        service
            .register_output_guardrail(Probe::new("p2", 2, Behaviour::Pass, &log))
            .await;
        service
            .register_output_guardrail(Probe::new("p1", 1, Behaviour::Pass, &log))
            .await;

        service.execute_output_guardrails(&ctx()).await;

        assert_eq!(calls(&log), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_ties_keep_registration_order() {
        let service = GuardrailService::default();
        let log = log();
        service
            .register_input_guardrail(Probe::new("a", 5, Behaviour::Pass, &log))
            .await;
        service
            .register_input_guardrail(Probe::new("b", 5, Behaviour::Pass, &log))
            .await;
        service
            .register_input_guardrail(Probe::new("early", 1, Behaviour::Pass, &log))
            .await;

        let names: Vec<String> = service
            .input_guardrails()
            .await
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["early", "a", "b"]);
    }

    #[tokio::test]
    async fn test_stages_are_independent() {
        let log = log();
        let service = GuardrailService::default();
        service
            .register_input_guardrail(Probe::new("in", 1, Behaviour::Trip("fix input"), &log))
            .await;

        let output = service.execute_output_guardrails(&ctx()).await;

        assert!(output.allow_execution);
        assert!(calls(&log).is_empty());
        assert_eq!(service.output_guardrails().await.len(), 0);
    }

    #[tokio::test]
    async fn test_any_tripwire_denies() {
        let log = log();
        let service = GuardrailService::default();
        service
            .register_input_guardrail(Probe::new("ok", 1, Behaviour::Pass, &log))
            .await;
        service
            .register_input_guardrail(Probe::new("bad", 2, Behaviour::Trip("rewrite"), &log))
            .await;

        let r = service.execute_input_guardrails(&ctx()).await;

        assert!(r.tripwire_triggered);
        assert!(!r.allow_execution);
        assert_eq!(r.violation_type, Some(ViolationType::LowQuality));
        assert_eq!(r.message.as_deref(), Some("bad tripped"));
    }

    #[tokio::test]
    async fn test_recommendations_concatenate_in_execution_order_without_dedup() {
        let log = log();
        let service = GuardrailService::default();
        service
            .register_output_guardrail(Probe::new("late", 9, Behaviour::Trip("same advice"), &log))
            .await;
        service
            .register_output_guardrail(Probe::new("early", 1, Behaviour::Trip("same advice"), &log))
            .await;
        service
            .register_output_guardrail(Probe::new("mid", 5, Behaviour::Trip("other advice"), &log))
            .await;

        let r = service.execute_output_guardrails(&ctx()).await;

        assert_eq!(
            r.recommendations,
            vec!["same advice", "other advice", "same advice"]
        );
        assert_eq!(
            r.message.as_deref(),
            Some("3 guardrails triggered: early, mid, late")
        );
    }

    #[tokio::test]
    async fn test_error_fails_closed() {
        let log = log();
        let service = GuardrailService::default();
        service
            .register_input_guardrail(Probe::new("broken", 1, Behaviour::Error, &log))
            .await;
        service
            .register_input_guardrail(Probe::new("fine", 2, Behaviour::Pass, &log))
            .await;

        let r = service.execute_input_guardrails(&ctx()).await;

        assert!(!r.allow_execution);
        assert!(r.tripwire_triggered);
        assert_eq!(r.violation_type, Some(ViolationType::GuardrailFailure));
        assert!(r.message.unwrap().contains("backend down"));
        // collect-all keeps going after a failure
        assert_eq!(calls(&log), vec!["broken", "fine"]);
    }

    #[tokio::test]
    async fn test_panic_fails_closed_without_crashing() {
        let log = log();
        let service = GuardrailService::default();
        service
            .register_output_guardrail(Probe::new("explodes", 1, Behaviour::Panic, &log))
            .await;

        let r = service.execute_output_guardrails(&ctx()).await;

        assert!(!r.allow_execution);
        assert_eq!(r.violation_type, Some(ViolationType::GuardrailFailure));
        assert!(r.message.unwrap().contains("validator exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_closed() {
        let log = log();
        let service = GuardrailService::new(ServiceOptions {
            timeout: Duration::from_secs(2),
            ..ServiceOptions::default()
        });
        service
            .register_input_guardrail(Probe::new("slow", 1, Behaviour::Hang, &log))
            .await;

        let r = service.execute_input_guardrails(&ctx()).await;

        assert!(!r.allow_execution);
        assert!(r.is_failure());
        assert!(r.message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_later_priorities() {
        let log = log();
        let service = GuardrailService::new(ServiceOptions {
            fail_fast: true,
            ..ServiceOptions::default()
        });
        service
            .register_input_guardrail(Probe::new("gate", 1, Behaviour::Trip("stop"), &log))
            .await;
        service
            .register_input_guardrail(Probe::new("after", 2, Behaviour::Pass, &log))
            .await;

        let r = service.execute_input_guardrails(&ctx()).await;

        assert!(!r.allow_execution);
        assert_eq!(calls(&log), vec!["gate"]);
        assert_eq!(r.details["skipped"], json!(["after"]));
    }

    #[tokio::test]
    async fn test_fail_fast_finishes_the_tripping_priority_level() {
        let log = log();
        let service = GuardrailService::new(ServiceOptions {
            fail_fast: true,
            ..ServiceOptions::default()
        });
        service
            .register_input_guardrail(Probe::new("a", 1, Behaviour::Trip("a"), &log))
            .await;
        service
            .register_input_guardrail(Probe::new("b", 1, Behaviour::Trip("b"), &log))
            .await;
        service
            .register_input_guardrail(Probe::new("c", 2, Behaviour::Pass, &log))
            .await;

        let r = service.execute_input_guardrails(&ctx()).await;

        assert_eq!(r.recommendations, vec!["a", "b"]);
        assert!(!calls(&log).contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn test_monitor_mode_reports_tripwire_but_allows() {
        let log = log();
        let service = GuardrailService::new(ServiceOptions {
            mode: EnforcementMode::Monitor,
            ..ServiceOptions::default()
        });
        service
            .register_output_guardrail(Probe::new("advisory", 1, Behaviour::Trip("consider"), &log))
            .await;

        let r = service.execute_output_guardrails(&ctx()).await;

        assert!(r.tripwire_triggered);
        assert!(r.allow_execution);
        assert_eq!(r.recommendations, vec!["consider"]);
    }

    #[tokio::test]
    async fn test_monitor_mode_still_fails_closed_on_error() {
        let log = log();
        let service = GuardrailService::new(ServiceOptions {
            mode: EnforcementMode::Monitor,
            ..ServiceOptions::default()
        });
        service
            .register_output_guardrail(Probe::new("broken", 1, Behaviour::Error, &log))
            .await;

        let r = service.execute_output_guardrails(&ctx()).await;

        assert!(!r.allow_execution);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_kept() {
        let log = log();
        let service = GuardrailService::default();
        service
            .register_input_guardrail(Probe::new("dup", 1, Behaviour::Pass, &log))
            .await;
        service
            .register_input_guardrail(Probe::new("dup", 1, Behaviour::Pass, &log))
            .await;

        service.execute_input_guardrails(&ctx()).await;

        assert_eq!(service.input_guardrails().await.len(), 2);
        assert_eq!(calls(&log), vec!["dup", "dup"]);
    }

    struct Rendezvous {
        name: &'static str,
        barrier: Arc<Barrier>,
    }

    #[async_trait]
    impl Guardrail for Rendezvous {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            7
        }

        async fn validate(
            &self,
            _context: &GuardrailContext,
        ) -> Result<GuardrailResult, GuardrailError> {
            self.barrier.wait().await;
            Ok(GuardrailResult::pass())
        }
    }

    impl InputGuardrail for Rendezvous {}

    #[tokio::test(start_paused = true)]
    async fn test_same_priority_runs_concurrently() {
        // Each guardrail blocks until the other has started; sequential
        // execution would hit the timeout instead.
        let barrier = Arc::new(Barrier::new(2));
        let service = GuardrailService::new(ServiceOptions {
            timeout: Duration::from_secs(5),
            ..ServiceOptions::default()
        });
        for name in ["left", "right"] {
            service
                .register_input_guardrail(Rendezvous {
                    name,
                    barrier: Arc::clone(&barrier),
                })
                .await;
        }

        let r = service.execute_input_guardrails(&ctx()).await;

        assert!(r.allow_execution, "{:?}", r.message);
        assert_eq!(r.details["evaluated"], json!(["left", "right"]));
    }

    #[test]
    fn test_enforcement_mode_parses() {
        assert_eq!(
            "Monitor".parse::<EnforcementMode>().unwrap(),
            EnforcementMode::Monitor
        );
        assert_eq!(
            " enforce ".parse::<EnforcementMode>().unwrap(),
            EnforcementMode::Enforce
        );
        assert!("strict".parse::<EnforcementMode>().is_err());
    }
}
