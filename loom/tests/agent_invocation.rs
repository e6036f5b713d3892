//! Integration coverage for the agent invocation protocol (§4.G, §8
//! scenarios), exercised end-to-end through the public API rather than via
//! module-private unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loom::{Agent, Context, CoreError, InteractionContext, Message};

#[derive(Clone, Default)]
struct NoConfig;

fn echo_agent() -> Agent<NoConfig> {
    Agent::new("echo", |ctx: InteractionContext, _cfg: NoConfig| async move {
        let mut pieces = ctx.input().iter();
        while let Some(piece) = pieces.next().await {
            let message = piece?.get().await?;
            ctx.reply(Message::text(format!("You said: {}", message.payload())));
        }
        Ok(())
    })
}

/// **Scenario 1 — Echo.**
#[tokio::test]
async fn echo_two_inputs_yields_two_replies_in_order() {
    let ctx = Context::new();
    let echo = echo_agent();
    ctx.run(|ctx| async move {
        let out = echo.trigger_in(&ctx, vec!["Hello", "World"], |c| c);
        let texts: Vec<_> = out
            .messages()
            .await
            .unwrap()
            .iter()
            .map(|m| m.payload().to_string())
            .collect();
        assert_eq!(texts, vec!["You said: Hello".to_string(), "You said: World".to_string()]);
    })
    .await
    .unwrap();
}

/// **Scenario 3 — Replay.** A producer with a side-effect counter runs
/// exactly once no matter how many times the output is iterated.
#[tokio::test]
async fn triggered_output_replays_without_rerunning_producer() {
    let ctx = Context::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let counting = Agent::new("counting", move |ctx: InteractionContext, _cfg: NoConfig| {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            ctx.reply(Message::text("a"));
            ctx.reply(Message::text("b"));
            ctx.reply(Message::text("c"));
            Ok(())
        }
    });

    ctx.run(|ctx| async move {
        let out = counting.trigger_in(&ctx, Vec::<&str>::new(), |c| c);
        let first: Vec<_> = out.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
        let second: Vec<_> = out.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
        assert_eq!(first, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(second, first);
    })
    .await
    .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

/// **Scenario 4 — AWAIT barrier**, exercised via `ctx.reply_await()`: a
/// slow sub-agent trigger declared before the barrier is always observed
/// before a marker declared after it, regardless of scheduling jitter.
#[tokio::test]
async fn await_barrier_orders_slow_trigger_before_marker() {
    let ctx = Context::new();
    let slow = Agent::new("slow", |ctx: InteractionContext, _cfg: NoConfig| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.reply(Message::text("A"));
        Ok(())
    });

    let barriered = Agent::new("barriered", move |ctx: InteractionContext, _cfg: NoConfig| {
        let slow = slow.clone();
        async move {
            ctx.reply(slow.trigger_in(ctx.context(), Vec::<&str>::new(), |c| c));
            ctx.reply_await();
            ctx.reply(Message::text("marker"));
            Ok(())
        }
    });

    ctx.run(|ctx| async move {
        let out = barriered.trigger_in(&ctx, Vec::<&str>::new(), |c| c);
        let texts: Vec<_> = out.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
        assert_eq!(texts, vec!["A".to_string(), "marker".to_string()]);
    })
    .await
    .unwrap();
}

/// **Scenario 5 — Out-of-order delivery**: a faster sub-agent's reply
/// overtakes a slower one declared earlier when both use
/// `reply_out_of_order`.
#[tokio::test]
async fn out_of_order_replies_flush_in_completion_order() {
    let ctx = Context::new();
    let a1 = Agent::new("a1", |ctx: InteractionContext, _cfg: NoConfig| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        ctx.reply(Message::text("from-a1"));
        Ok(())
    });
    let a2 = Agent::new("a2", |ctx: InteractionContext, _cfg: NoConfig| async move {
        ctx.reply(Message::text("from-a2"));
        Ok(())
    });

    let fan_out = Agent::new("fan_out", move |ctx: InteractionContext, _cfg: NoConfig| {
        let a1 = a1.clone();
        let a2 = a2.clone();
        async move {
            ctx.reply_out_of_order(a1.trigger_in(ctx.context(), Vec::<&str>::new(), |c| c));
            ctx.reply_out_of_order(a2.trigger_in(ctx.context(), Vec::<&str>::new(), |c| c));
            Ok(())
        }
    });

    ctx.run(|ctx| async move {
        let out = fan_out.trigger_in(&ctx, Vec::<&str>::new(), |c| c);
        let texts: Vec<_> = out.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
        assert_eq!(texts, vec!["from-a2".to_string(), "from-a1".to_string()]);
    })
    .await
    .unwrap();
}

/// **Scenario 6 — error-as-message.**
#[tokio::test]
async fn errors_as_messages_appends_error_message_without_raising() {
    let ctx = Context::builder().with_errors_as_messages(true).build();
    let flaky = Agent::new("flaky", |ctx: InteractionContext, _cfg: NoConfig| async move {
        ctx.reply(Message::text("ok"));
        Err(CoreError::ProducerError("boom".to_string()))
    });

    ctx.run(|ctx| async move {
        let out = flaky.trigger_in(&ctx, Vec::<&str>::new(), |c| c);
        let messages = out.messages().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload(), "ok");
        assert!(messages[1].payload().contains("ValueError") || messages[1].payload().contains("boom"));
    })
    .await
    .unwrap();
}

/// **Property 7**: after `Context::finalize`, no producer task remains
/// running — a long-sleeping agent is cancelled, not left dangling.
#[tokio::test]
async fn finalize_cancels_still_running_producers() {
    let ctx = Context::new();
    let done = Arc::new(AtomicUsize::new(0));
    let d = Arc::clone(&done);
    let forever = Agent::new("forever", move |_ctx: InteractionContext, _cfg: NoConfig| {
        let d = Arc::clone(&d);
        async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let _out = forever.trigger_in(&ctx, Vec::<&str>::new(), |c| c);
    tokio::task::yield_now().await;
    ctx.finalize().await.ok();

    assert_eq!(done.load(Ordering::SeqCst), 0, "producer must not complete after finalize");
}

/// `CLEAR` discards a partially-declared position group before it flushes.
#[tokio::test]
async fn clear_sentinel_discards_pending_positions_via_reply() {
    let ctx = Context::new();
    let resetting = Agent::new("resetting", |ctx: InteractionContext, _cfg: NoConfig| async move {
        ctx.reply(Message::text("kept"));
        ctx.reply_await();
        ctx.reply(Message::text("discarded"));
        ctx.reply_clear();
        ctx.reply(Message::text("replacement"));
        Ok(())
    });

    ctx.run(|ctx| async move {
        let out = resetting.trigger_in(&ctx, Vec::<&str>::new(), |c| c);
        let texts: Vec<_> = out.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
        assert_eq!(texts, vec!["kept".to_string(), "replacement".to_string()]);
    })
    .await
    .unwrap();
}
