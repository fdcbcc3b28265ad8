//! # Example: Timeout race
//!
//! A slow producer races a timeout channel in a one-of take. The runtime is built
//! with the `LogWriter` subscriber, so every lifecycle event is printed too.
//!
//! Run with: `cargo run --example timeout --features logging`

use std::sync::Arc;
use std::time::Duration;

use rine::{
    Chan, Config, Cx, Exit, LogWriter, RoutineError, RoutineFn, Runtime, Signal, Subscribe,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let rt = Runtime::builder(Config::default())
        .with_subscribers(subs)
        .build()?;

    let data: Chan<String> = rt.named_chan("data", rine::BufferPolicy::Fixed(0));

    let tx = data.clone();
    rt.go(RoutineFn::rc("producer", move |cx: Cx| {
        let tx = tx.clone();
        async move {
            cx.sleep(Duration::from_millis(500)).await;
            cx.put(&tx, "late answer".to_string())?.await;
            Ok::<_, RoutineError>(Exit::Done(()))
        }
    }));

    let rx = data.clone();
    rt.spawn(
        RoutineFn::rc("consumer", move |cx: Cx| {
            let rx = rx.clone();
            async move {
                let deadline = cx.runtime().ok_or(RoutineError::failed("runtime gone"))?;
                let timer = deadline.timeout::<String>(Duration::from_millis(200));
                let (signal, idx) = cx.take_one_of(&[rx, timer])?.await;
                Ok::<_, RoutineError>(Exit::Done(match (idx, signal) {
                    (0, Signal::Value(v)) => format!("got {v:?}"),
                    _ => "timed out".to_string(),
                }))
            }
        }),
        |res| match res {
            Ok(outcome) => println!("[consumer] {outcome}"),
            Err(e) => println!("[consumer] failed: {e}"),
        },
    );

    // The producer is left parked on a put nobody takes: `run` returns once the
    // timers are exhausted.
    rt.run().await?;

    // Let the log worker catch up before the process exits.
    drop(rt);
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
