//! End-to-end recorder scenarios driven through the public API.
//!
//! Each test owns a temp trace root (`TestTrace`) and inspects the run
//! directory the recorder leaves behind.

use std::cell::Cell;
use std::fs;
use std::thread;

use acp_recorder::StepSubmission;
use acp_recorder::core::redact::REDACTED;
use acp_recorder::core::stop_policy::StopReason;
use acp_recorder::core::types::{RunSpec, RunStatus, StepStatus, Stream};
use acp_recorder::instrument;
use acp_recorder::io::trace::load_trace;
use acp_recorder::test_support::TestTrace;
use anyhow::{Result, anyhow};
use serde_json::json;

fn spec() -> RunSpec {
    RunSpec::new("agent-v1", "mock-llm").tools(["search"])
}

#[test]
fn boundary_exits_get_dense_ids_in_exit_order() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    for i in 0..5 {
        rec.within("reason", json!({"i": i}), |step| {
            step.set_output("i", i);
            Ok(())
        })
        .expect("step");
    }
    rec.stop(StopReason::Success).expect("stop");

    let trace = load_trace(&run.dir).expect("trace");
    let ids: Vec<u64> = trace.steps.iter().map(|s| s.step_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    for (step, i) in trace.steps.iter().zip(0..) {
        assert_eq!(step.input, json!({"i": i}));
    }
    assert_eq!(trace.meta.step_count, 5);
    assert_eq!(trace.meta.status, RunStatus::Success);
}

#[test]
fn secrets_never_reach_disk() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    let openai = "sk-abcdefghijklmnopqrstuvwxyz012345";
    let github = "ghp_ABCDEFGHIJKLMNOPQRSTUVWX";
    rec.within(
        "tool",
        json!({"api_key": {"nested": "not-a-shape"}, "note": format!("use {openai}")}),
        |step| {
            step.set_output("body", format!("token is {github}"));
            step.write_stdout(&format!("leaked {openai}\n"))
        },
    )
    .expect("step");

    let raw_steps = fs::read_to_string(run.dir.join("steps.jsonl")).expect("steps");
    let raw_console = fx.console(&run, 1, Stream::Out).expect("console");
    for raw in [&raw_steps, &raw_console] {
        assert!(!raw.contains(openai));
        assert!(!raw.contains(github));
        assert!(raw.contains(REDACTED));
    }

    let steps = fx.steps(&run).expect("steps");
    assert_eq!(steps[0].input["api_key"], REDACTED);
    assert_eq!(steps[0].input["note"], format!("use {REDACTED}"));
    assert_eq!(steps[0].output["body"], format!("token is {REDACTED}"));
}

#[test]
fn clean_values_are_persisted_unchanged() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    let input = json!({
        "query": "weather in paris",
        "limit": 3,
        "filters": {"units": "metric", "days": [1, 2, null], "exact": false}
    });
    let output = json!({"summary": "sunny", "scores": [0.5, 1.25]});
    rec.record_step(StepSubmission::new(
        "tool",
        input.clone(),
        output.clone(),
        StepStatus::Ok,
    ))
    .expect("record");

    let steps = fx.steps(&run).expect("steps");
    assert_eq!(steps[0].input, input);
    assert_eq!(steps[0].output, output);
}

#[test]
fn pending_artifacts_move_to_step_id_once() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    let handle = rec.create_pending_handle();
    let handle_name = handle.to_string();
    rec.record_console(&handle, "out line\n", "err line\n")
        .expect("console");
    rec.append_io(&handle, Stream::Out, "more\n").expect("append");
    let step_id = rec
        .record_step(
            StepSubmission::new("tool", json!({}), json!({}), StepStatus::Ok).with_handle(handle),
        )
        .expect("record");
    assert_eq!(step_id, Some(1));

    assert_eq!(
        fx.tool_files(&run).expect("files"),
        vec!["step_1.stderr".to_string(), "step_1.stdout".to_string()]
    );
    assert!(
        !fx.tool_files(&run)
            .expect("files")
            .iter()
            .any(|name| name.starts_with(&handle_name))
    );
    assert_eq!(
        fx.console(&run, 1, Stream::Out).as_deref(),
        Some("out line\nmore\n")
    );
    assert_eq!(fx.console(&run, 1, Stream::Err).as_deref(), Some("err line\n"));
}

#[test]
fn nested_units_keep_their_own_console_output() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    let mut outer = rec.step("outer", json!({})).expect("outer");
    outer.write_stdout("Outer(").expect("write");
    rec.within("inner", json!({}), |inner| inner.write_stdout("Inner"))
        .expect("inner");
    outer.write_stdout(")").expect("write");
    outer.set_output("done", true);
    let outer_id = outer.finish().expect("finish");

    let steps = fx.steps(&run).expect("steps");
    assert_eq!(steps[0].phase, "inner");
    assert_eq!(steps[0].step_id, 1);
    assert_eq!(outer_id, Some(2));
    assert_eq!(fx.console(&run, 1, Stream::Out).as_deref(), Some("Inner"));
    assert_eq!(fx.console(&run, 2, Stream::Out).as_deref(), Some("Outer()"));
}

#[test]
fn retry_once_then_succeed_records_two_attempts() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    let calls = Cell::new(0);
    let mut fetch = instrument::retry_block(rec, 2, |n: u32| -> Result<u32> {
        calls.set(calls.get() + 1);
        if calls.get() == 1 {
            return Err(anyhow!("transient"));
        }
        Ok(n * 2)
    })
    .expect("policy");
    assert_eq!(fetch(21).expect("second attempt succeeds"), 42);

    let steps = fx.steps(&run).expect("steps");
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].status, StepStatus::Retry);
    assert_eq!(steps[0].input["attempt"], 1);
    assert_eq!(steps[0].output["error"], "transient");
    assert_eq!(steps[1].status, StepStatus::Ok);
    assert_eq!(steps[1].input["attempt"], 2);
    assert_eq!(steps[1].output["result"], 42);
}

#[test]
fn tool_retry_writes_console_per_attempt() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    let calls = Cell::new(0);
    let mut search = instrument::tool(rec, "search", 1, |query: String| {
        calls.set(calls.get() + 1);
        if calls.get() == 1 {
            return Err(anyhow!("timeout"));
        }
        Ok(format!("results for {query}"))
    });
    let found = search("rust".to_string()).expect("search");
    assert_eq!(found, "results for rust");

    let steps = fx.steps(&run).expect("steps");
    assert_eq!(steps[0].input["toolName"], "search");
    assert_eq!(steps[0].input["max_attempts"], 2);
    assert_eq!(fx.console(&run, 1, Stream::Err).as_deref(), Some("timeout"));
    assert_eq!(
        fx.console(&run, 2, Stream::Out).as_deref(),
        Some("results for rust")
    );
    assert!(steps[1].output["duration"].is_number());
}

#[test]
fn default_ceiling_truncates_after_1000_steps() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    let mut committed = 0;
    for i in 0..1001 {
        let submission = StepSubmission::new("tool", json!({"i": i}), json!({}), StepStatus::Ok);
        if rec.record_step(submission).expect("record").is_some() {
            committed += 1;
        }
    }
    assert_eq!(committed, 1000);
    assert!(!rec.is_active());
    assert!(
        rec.within("reason", json!({}), |_| Ok(()))
            .is_ok(),
        "truncated runs drop steps silently"
    );

    let trace = load_trace(&run.dir).expect("trace");
    assert!(trace.meta.truncated);
    assert_eq!(
        trace.meta.termination_reason.as_deref(),
        Some("limit_exceeded")
    );
    assert_eq!(trace.meta.step_count, 1000);
    assert_eq!(trace.steps.len(), 1000);
    assert!(trace.steps.iter().zip(1..).all(|(s, id)| s.step_id == id));
}

#[test]
fn misuse_is_strict_error_and_lenient_noop() {
    let strict = TestTrace::new().expect("fixture");
    let submission = || StepSubmission::new("reason", json!({}), json!({}), StepStatus::Ok);
    assert!(strict.recorder.record_step(submission()).is_err());

    let lenient = TestTrace::with_config(|c| c.strict = false).expect("fixture");
    assert_eq!(
        lenient.recorder.record_step(submission()).expect("dropped"),
        None
    );
    lenient.recorder.stop(StopReason::Stopped).expect("noop");
    assert!(lenient.run_dirs().expect("dirs").is_empty());
}

#[test]
fn concurrent_commits_get_unique_ordered_ids() {
    let fx = TestTrace::new().expect("fixture");
    let rec = &fx.recorder;
    let run = rec.start(&spec()).expect("start");

    thread::scope(|scope| {
        for worker in 0..4 {
            scope.spawn(move || {
                for i in 0..25 {
                    rec.within("tool", json!({"worker": worker, "i": i}), |step| {
                        step.write_stdout(&format!("{worker}:{i}"))
                    })
                    .expect("step");
                }
            });
        }
    });

    let steps = fx.steps(&run).expect("steps");
    let ids: Vec<u64> = steps.iter().map(|s| s.step_id).collect();
    assert_eq!(ids, (1..=100).collect::<Vec<u64>>());
    for step in &steps {
        let expected = format!("{}:{}", step.input["worker"], step.input["i"]);
        assert_eq!(
            fx.console(&run, step.step_id, Stream::Out),
            Some(expected)
        );
    }
}

#[test]
fn lenient_restart_stops_previous_run() {
    let fx = TestTrace::with_config(|c| c.strict = false).expect("fixture");
    let rec = &fx.recorder;
    let first = rec.start(&spec()).expect("first");
    rec.within("reason", json!({}), |_| Ok(())).expect("step");
    let second = rec.start(&spec()).expect("second");

    assert_eq!(fx.run_dirs().expect("dirs").len(), 2);
    let prev = fx.meta(&first).expect("meta");
    assert_eq!(prev.status, RunStatus::Stopped);
    assert_eq!(prev.step_count, 1);
    assert_eq!(rec.current_run(), Some(second));
}
