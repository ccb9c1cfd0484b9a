//! Higher-order wrappers that turn plain callables into recorded steps.
//!
//! Each wrapper takes a callable plus configuration and returns a callable
//! with the same shape (`FnMut(A) -> Result<T>`). The returned callable
//! records one step per attempt and hands back the callable's own result or
//! error. Recording failures after the callable has run are logged and never
//! replace its outcome; only the up-front strict-mode check fails the call.
//!
//! - [`tool`]: phase `tool`, optional retries, result/error text written to
//!   the attempt's console artifacts.
//! - [`llm`]: phase `reason`, a single attempt.
//! - [`retry_block`]: phase `retry`, an explicit attempt budget.
//! - [`boundary`]: a scoped step storing the return value as `result`.

use std::thread;
use std::time::Instant;

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, error, instrument};

use crate::core::retry::{Attempt, FailureDecision, RetryPolicy};
use crate::core::types::{StepStatus, Stream};
use crate::recorder::{Recorder, StepSubmission, to_payload};

/// How the attempts of one call are recorded.
struct AttemptPlan<'a> {
    phase: &'a str,
    policy: RetryPolicy,
    input: Value,
    /// Output key for the success value.
    result_key: &'static str,
    /// Add `attempt`/`max_attempts` to each step's input.
    tag_attempts: bool,
    /// Write result/error text to the attempt's console artifacts and record
    /// the attempt's duration.
    capture_console: bool,
}

/// Run `attempt_fn` up to `plan.policy.max_attempts` times, recording each
/// attempt. The last fault is returned as-is once the budget is spent.
#[instrument(skip_all, fields(phase = plan.phase, max_attempts = plan.policy.max_attempts))]
fn run_attempts<T, F>(recorder: &Recorder, plan: &AttemptPlan<'_>, mut attempt_fn: F) -> Result<T>
where
    T: Serialize,
    F: FnMut() -> Result<T>,
{
    recorder.check_recording("invoke an instrumented call")?;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let handle = recorder.create_pending_handle();
        let input = attempt_input(plan, attempt);
        let started = Instant::now();

        match Attempt::from(attempt_fn()) {
            Attempt::Success(value) => {
                let result = to_payload(&value);
                let recorded = (|| -> Result<()> {
                    let mut output = Map::new();
                    if plan.capture_console {
                        recorder.append_io(&handle, Stream::Out, &console_text(&result))?;
                        output.insert(
                            "duration".to_string(),
                            json!(started.elapsed().as_secs_f64()),
                        );
                    }
                    output.insert(plan.result_key.to_string(), result);
                    let submission = StepSubmission::new(
                        plan.phase,
                        input,
                        Value::Object(output),
                        StepStatus::Ok,
                    )
                    .with_handle(handle);
                    recorder.record_step(submission)?;
                    Ok(())
                })();
                if let Err(record_err) = recorded {
                    error!(attempt, err = %record_err, "failed to record successful attempt");
                }
                return Ok(value);
            }
            Attempt::Fault(err) => {
                let decision = plan.policy.on_failure(attempt);
                let message = err.to_string();
                let recorded = (|| -> Result<()> {
                    if plan.capture_console {
                        recorder.append_io(&handle, Stream::Err, &message)?;
                    }
                    let submission = StepSubmission::new(
                        plan.phase,
                        input,
                        json!({"error": message}),
                        decision.step_status(),
                    )
                    .with_handle(handle);
                    recorder.record_step(submission)?;
                    Ok(())
                })();
                if let Err(record_err) = recorded {
                    error!(attempt, err = %record_err, "failed to record faulted attempt");
                }

                match decision {
                    FailureDecision::RetryAfter(delay) => {
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                        if !delay.is_zero() {
                            thread::sleep(delay);
                        }
                    }
                    FailureDecision::GiveUp => return Err(err),
                }
            }
        }
    }
}

fn attempt_input(plan: &AttemptPlan<'_>, attempt: u32) -> Value {
    let mut input = plan.input.clone();
    if plan.tag_attempts
        && let Value::Object(map) = &mut input
    {
        map.insert("attempt".to_string(), json!(attempt));
        map.insert("max_attempts".to_string(), json!(plan.policy.max_attempts));
    }
    input
}

/// Text written to a console artifact for a result value.
fn console_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wrap `f` as a tool invocation with `retries` extra attempts.
///
/// Backoff between attempts uses the recorder's `retry_backoff_ms`.
pub fn tool<'r, A, T, F>(
    recorder: &'r Recorder,
    name: impl Into<String>,
    retries: u32,
    mut f: F,
) -> impl FnMut(A) -> Result<T> + 'r
where
    A: Serialize + Clone + 'r,
    T: Serialize + 'r,
    F: FnMut(A) -> Result<T> + 'r,
{
    let name = name.into();
    let policy = RetryPolicy {
        max_attempts: retries.saturating_add(1),
        backoff_base: recorder.config().retry_backoff(),
    };
    move |args: A| {
        let plan = AttemptPlan {
            phase: "tool",
            policy,
            input: json!({"toolName": name, "args": to_payload(&args)}),
            result_key: "result",
            tag_attempts: true,
            capture_console: true,
        };
        run_attempts(recorder, &plan, || f(args.clone()))
    }
}

/// Wrap `f` as an LLM call, recorded as a single `reason` step.
pub fn llm<'r, A, T, F>(recorder: &'r Recorder, mut f: F) -> impl FnMut(A) -> Result<T> + 'r
where
    A: Serialize + 'r,
    T: Serialize + 'r,
    F: FnMut(A) -> Result<T> + 'r,
{
    move |args: A| {
        let plan = AttemptPlan {
            phase: "reason",
            policy: RetryPolicy::once(),
            input: json!({"args": to_payload(&args)}),
            result_key: "response",
            tag_attempts: false,
            capture_console: false,
        };
        let mut args = Some(args);
        run_attempts(recorder, &plan, || {
            let args = args.take().ok_or_else(|| anyhow!("llm call attempted twice"))?;
            f(args)
        })
    }
}

/// Wrap `f` in an explicit retry group of `max_attempts` attempts.
///
/// Every attempt is recorded with phase `retry`: failed attempts as `retry`
/// (or `error` for the last), the successful one as `ok`.
pub fn retry_block<'r, A, T, F>(
    recorder: &'r Recorder,
    max_attempts: u32,
    mut f: F,
) -> Result<impl FnMut(A) -> Result<T> + 'r>
where
    A: Serialize + Clone + 'r,
    T: Serialize + 'r,
    F: FnMut(A) -> Result<T> + 'r,
{
    let policy = RetryPolicy::new(max_attempts, recorder.config().retry_backoff())?;
    Ok(move |args: A| {
        let plan = AttemptPlan {
            phase: "retry",
            policy,
            input: json!({"args": to_payload(&args)}),
            result_key: "result",
            tag_attempts: true,
            capture_console: false,
        };
        run_attempts(recorder, &plan, || f(args.clone()))
    })
}

/// Wrap `f` as a step boundary with the given phase.
///
/// Input is recorded as `{"args": ..}` and the return value as output
/// `result`. A failing call is recorded as an error step.
pub fn boundary<'r, A, T, F>(
    recorder: &'r Recorder,
    phase: impl Into<String>,
    mut f: F,
) -> impl FnMut(A) -> Result<T> + 'r
where
    A: Serialize + 'r,
    T: Serialize + 'r,
    F: FnMut(A) -> Result<T> + 'r,
{
    let phase = phase.into();
    move |args: A| {
        let input = json!({"args": to_payload(&args)});
        let mut step = recorder.step(phase.as_str(), input)?;
        let outcome = f(args);
        match &outcome {
            Ok(value) => step.set_output("result", to_payload(value)),
            Err(err) => step.fail(err),
        }
        if let Err(record_err) = step.finish() {
            error!(phase = %phase, err = %record_err, "failed to record boundary");
        }
        outcome
    }
}
