//! `script` steps.

use queue::{PoolError, SandboxPool};
use sandbox::Bindings;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::kind::ScriptProps;
use crate::{ExecutionContext, NodeError, StepResult};

/// Bindings every script step sees: `done`, `input`, each context entry
/// (`steps`, `triggers`) on its own, the whole `context`, and `trigger`
/// when the run has one.
pub fn script_bindings(input: &Value, ctx: &ExecutionContext, trigger: Option<&Value>) -> Bindings {
    let mut bindings = Bindings::with_done();
    bindings.insert("input", input.clone());
    let context = ctx.to_value();
    if let Value::Object(entries) = &context {
        for (name, value) in entries {
            bindings.insert(name.clone(), value.clone());
        }
    }
    bindings.insert("context", context);
    if let Some(trigger) = trigger {
        bindings.insert("trigger", trigger.clone());
    }
    bindings
}

/// Run one `script` step through the pool.
///
/// The sandbox's `ExecutionResult` becomes the step result as-is, so a
/// failing script is a failed step, not an error. Only a pool shutdown is
/// returned as `Err`.
#[instrument(skip_all, fields(code_len = props.body.len()))]
pub async fn run_script(
    pool: &SandboxPool,
    props: &ScriptProps,
    input: &Value,
    ctx: &ExecutionContext,
    trigger: Option<&Value>,
) -> Result<StepResult, NodeError> {
    let source = script_bindings(input, ctx, trigger)
        .wrap(&props.body)
        .map_err(|e| NodeError::Bindings(e.to_string()))?;

    let run = pool.submit(source).await.map_err(|e| match e {
        PoolError::Shutdown => NodeError::PoolShutdown,
    })?;
    debug!(
        success = run.success,
        execution_time_ms = run.execution_time_ms,
        "script step settled"
    );
    Ok(StepResult::from(run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue::mock::MockScriptRunner;
    use queue::PoolConfig;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn bindings_carry_input_context_and_trigger() {
        let mut ctx = ExecutionContext::new();
        ctx.record("a", StepResult::ok(None));
        let trigger = json!({ "name": "t" });

        let source = script_bindings(&json!({ "x": 1 }), &ctx, Some(&trigger))
            .wrap("done(input.x)")
            .unwrap();

        assert!(source.starts_with("const done = (result) => result;\n"));
        assert!(source.contains("const input = {\"x\":1};\n"));
        assert!(source.contains(
            "const context = {\"steps\":{\"a\":{\"success\":true}},\"triggers\":{}};\n"
        ));
        assert!(source.contains("const steps = {\"a\":{\"success\":true}};\n"));
        assert!(source.contains("const triggers = {};\n"));
        assert!(source.contains("const trigger = {\"name\":\"t\"};\n"));
        assert!(source.ends_with("done(input.x)"));
    }

    #[test]
    fn trigger_binding_is_optional() {
        let bindings = script_bindings(&Value::Null, &ExecutionContext::new(), None);
        assert!(bindings.get("trigger").is_none());
        assert!(bindings.get("steps").is_some());
        assert!(bindings.get("triggers").is_some());
        assert_eq!(bindings.len(), 5);
    }

    #[tokio::test]
    async fn failed_run_becomes_failed_step() {
        let pool = SandboxPool::new(
            PoolConfig::default(),
            Arc::new(MockScriptRunner::failing("Execution timed out")),
        );
        let result = run_script(
            &pool,
            &ScriptProps { body: "while(true){}".into() },
            &Value::Null,
            &ExecutionContext::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(result, StepResult::failed("Execution timed out"));
    }

    #[tokio::test]
    async fn shutdown_pool_is_an_error() {
        let pool = SandboxPool::new(PoolConfig::default(), Arc::new(MockScriptRunner::echoing()));
        pool.shutdown().await;

        let err = run_script(
            &pool,
            &ScriptProps { body: "1".into() },
            &Value::Null,
            &ExecutionContext::new(),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err, NodeError::PoolShutdown);
    }

    #[tokio::test]
    async fn real_isolate_sees_context() {
        let pool = SandboxPool::new(PoolConfig::default(), Arc::new(queue::IsolateRunner));
        let mut ctx = ExecutionContext::new();
        ctx.record("fetchUser", StepResult::ok(Some(json!({ "id": 5 }))));

        let result = run_script(
            &pool,
            &ScriptProps {
                body: "done(context.steps.fetchUser.result.id * input.factor)".into(),
            },
            &json!({ "factor": 3 }),
            &ctx,
            None,
        )
        .await
        .unwrap();

        assert!(result.success, "{result:?}");
        assert_eq!(result.result, Some(json!(15)));
    }

    #[tokio::test]
    async fn real_isolate_sees_steps_directly() {
        let pool = SandboxPool::new(PoolConfig::default(), Arc::new(queue::IsolateRunner));
        let mut ctx = ExecutionContext::new();
        ctx.record("fetchUser", StepResult::ok(Some(json!({ "id": 5 }))));

        let result = run_script(
            &pool,
            &ScriptProps {
                body: "done(steps.fetchUser.result.id + Object.keys(triggers).length)".into(),
            },
            &Value::Null,
            &ctx,
            None,
        )
        .await
        .unwrap();

        assert!(result.success, "{result:?}");
        assert_eq!(result.result, Some(json!(5)));
    }
}
