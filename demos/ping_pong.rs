//! # Example: Ping Pong
//!
//! Two routines bounce a counter over a pair of rendezvous channels. The player
//! that sees the limit closes the table; the other one sees `Ended` and quits.
//!
//! ```text
//! ping ── put(n) ──► [table_a] ──► pong
//! ping ◄── take ──── [table_b] ◄── put(n + 1)
//! ```

use std::time::Duration;

use rine::{Chan, Config, Cx, Exit, RoutineArgs, RoutineError, RoutineRef, Runtime, Signal};

const LIMIT: u32 = 6;

fn player(name: &'static str, rx: Chan<u32>, tx: Chan<u32>) -> RoutineRef<u32> {
    RoutineArgs::rc(name, (rx, tx), move |cx: Cx, (rx, tx): (Chan<u32>, Chan<u32>)| async move {
        let mut hits = 0;
        loop {
            let Signal::Value(n) = cx.take(&rx)?.await else {
                println!("[{name}] table closed after {hits} hits");
                return Ok::<_, RoutineError>(Exit::Done(hits));
            };
            hits += 1;
            println!("[{name}] {n}");
            if n >= LIMIT {
                rx.close();
                tx.close();
                return Ok(Exit::Done(hits));
            }
            cx.sleep(Duration::from_millis(50)).await;
            cx.put(&tx, n + 1)?.await;
        }
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let rt = Runtime::new(Config::default());
    let a: Chan<u32> = rt.named_chan("table_a", rine::BufferPolicy::Fixed(0));
    let b: Chan<u32> = rt.named_chan("table_b", rine::BufferPolicy::Fixed(0));

    for (name, rx, tx) in [("ping", b.clone(), a.clone()), ("pong", a.clone(), b.clone())] {
        rt.spawn(player(name, rx, tx), move |res| match res {
            Ok(hits) => println!("[{name}] done, {hits} hits"),
            Err(e) => println!("[{name}] failed: {e}"),
        });
    }

    // Serve the first ball.
    b.put(1, |_| {});
    rt.run().await?;
    Ok(())
}
