//! Workflows bundled with the CLI.

use anyhow::{Context as _, Result, bail};

use crate::registry::Registry;
use crate::runtime::context::Context;
use crate::runtime::sync::SettableFuture;

/// Register every bundled workflow.
pub fn register_demos(registry: &mut Registry) -> Result<()> {
    registry.register_fn("approval", approval)?;
    registry.register_fn("fan-out", fan_out)?;
    registry.register_fn("greet", greet)?;
    registry.register_fn("sum-events", sum_events)?;
    Ok(())
}

async fn greet(_ctx: Context, name: String) -> Result<String> {
    Ok(format!("Hello, {name}!"))
}

/// Waits for `count` integer events and returns their sum.
async fn sum_events(ctx: Context, count: u32) -> Result<i64> {
    let events = ctx.events().context("workflow has no event channel")?;
    let mut total = 0_i64;
    for received in 0..count {
        let event = events
            .receive()
            .await
            .with_context(|| format!("event channel closed after {received} of {count} events"))?;
        total += event.decode::<i64>()?;
    }
    Ok(total)
}

/// Waits for a single boolean decision.
async fn approval(ctx: Context, request: String) -> Result<String> {
    let events = ctx.events().context("workflow has no event channel")?;
    let decision = events
        .receive()
        .await
        .context("event channel closed before a decision")?;
    if !decision.decode::<bool>()? {
        bail!("request {request} rejected");
    }
    Ok(format!("request {request} approved"))
}

/// Spawns `width` child coroutines and sums their squares.
async fn fan_out(ctx: Context, width: u32) -> Result<u64> {
    let mut slots = Vec::with_capacity(width as usize);
    for index in 0..width {
        let slot = SettableFuture::new();
        let child = slot.clone();
        ctx.go(move |ctx| async move {
            ctx.yield_now().await;
            child.set(u64::from(index) * u64::from(index))?;
            anyhow::Ok(())
        })?;
        slots.push(slot);
    }
    let mut total = 0;
    for slot in &slots {
        total += slot.get().await;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::core::codec::JsonCodec;
    use crate::instance::WorkflowInstance;
    use crate::io::config::DriverConfig;
    use crate::test_support::{decode, payload};

    fn start(name: &str, inputs: Vec<crate::core::payload::Payload>) -> WorkflowInstance {
        let mut registry = Registry::new();
        register_demos(&mut registry).expect("register");
        let mut instance = registry
            .instantiate(name, Rc::new(JsonCodec::default()), &DriverConfig::default())
            .expect("instantiate");
        instance
            .execute(&Context::background(), inputs)
            .expect("execute");
        instance
    }

    #[test]
    fn greet_completes_in_one_pass() {
        let instance = start("greet", vec![payload(&"Ada")]);
        assert!(instance.completed());
        assert_eq!(decode::<String>(instance.result().expect("result")), "Hello, Ada!");
    }

    #[test]
    fn sum_events_suspends_between_events() {
        let ctx = Context::background();
        let mut instance = start("sum-events", vec![payload(&2)]);
        for value in [40, 2] {
            assert!(!instance.completed());
            instance.events().send(payload(&value)).expect("send");
            instance.continue_execution(&ctx).expect("continue");
        }
        assert!(instance.completed());
        assert_eq!(decode::<i64>(instance.result().expect("result")), 42);
    }

    #[test]
    fn rejected_approval_is_a_business_error() {
        let ctx = Context::background();
        let mut instance = start("approval", vec![payload(&"PR-7")]);
        instance.events().send(payload(&false)).expect("send");
        instance.continue_execution(&ctx).expect("continue");
        assert!(instance.completed());
        assert_eq!(
            instance.error().expect("error").to_string(),
            "request PR-7 rejected"
        );
    }

    #[test]
    fn fan_out_waits_for_every_child() {
        let instance = start("fan-out", vec![payload(&4)]);
        assert!(instance.completed());
        assert_eq!(decode::<u64>(instance.result().expect("result")), 14);
    }
}
