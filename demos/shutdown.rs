//! # Example: shutdown
//!
//! Demonstrates a main loop driving a few fibers and tearing them down.
//!
//! Shows how to:
//! - Launch named fibers with [`Coros::launch`]
//! - Kill one of them with [`Coros::request_kill`]
//! - Bridge a plain queue with [`Coros::stop_listener`] so its consumer wakes on shutdown
//! - Surface fiber failures in the main loop with [`Coros::rethrow`]
//! - Tear everything down with [`Coros::shutdown`]
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► launch("ticker")     stop-aware sleep loop
//!   ├─► launch("consumer")   plain mpsc recv, bridged by a stop listener
//!   ├─► launch("fetch")      fails immediately
//!   │
//!   ├─► main loop: rethrow() each iteration, feed the queue
//!   ├─► request_kill("ticker1")
//!   └─► shutdown()
//!         ├─► Stopping: listener closes the queue, consumer exits
//!         └─► Shutdown
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example shutdown
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use coros::{current, Coros, CorosConfig, FiberError, Subscribe};
use tokio::sync::mpsc;

async fn ticker() -> Result<(), FiberError> {
    let mut n = 0u32;
    loop {
        n += 1;
        current::set_status(format!("tick #{n}"));
        println!("[{}] tick #{n}", current::name());
        current::sleep(Duration::from_millis(100)).await?;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    println!("=== shutdown example ===\n");

    // 1. Configure runtime
    let cfg = CorosConfig {
        grace: Duration::from_secs(2),
        ..CorosConfig::default()
    };

    // 2. Optional: add subscriber to see events (requires "logging" feature)
    #[cfg(feature = "logging")]
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(coros::LogWriter::new())];
    #[cfg(not(feature = "logging"))]
    let subs: Vec<Arc<dyn Subscribe>> = Vec::new();

    let coros = Coros::builder(cfg).with_subscribers(subs).build();

    coros
        .run_until(async {
            // 3. Fibers
            let ticker = coros.launch("ticker", ticker);

            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            coros.launch("consumer", move || async move {
                while let Some(msg) = rx.recv().await {
                    println!("[{}] got {msg}", current::name());
                }
                current::check_stop()?;
                Ok::<(), FiberError>(())
            });

            // 4. Close the queue's source end when the application stops
            let sender = Rc::new(RefCell::new(Some(tx)));
            let s = sender.clone();
            let _listener = coros.stop_listener("demo queue", move || {
                println!("[listener] closing queue");
                s.borrow_mut().take();
            });

            coros.launch("fetch", || async {
                Err::<(), _>(FiberError::failed("connection refused"))
            });

            // 5. Main loop
            for i in 0..5 {
                if let Err(e) = coros.rethrow() {
                    println!("[main] fiber failure: {e}");
                }
                if let Some(tx) = sender.borrow().as_ref() {
                    let _ = tx.send(format!("message {i}"));
                }
                tokio::time::sleep(Duration::from_millis(120)).await;
            }

            coros.print_active_coroutines("before kill");
            println!("[main] killing {ticker}: {}", coros.request_kill(&ticker));
            tokio::time::sleep(Duration::from_millis(10)).await;

            // 6. Teardown
            coros.shutdown().await?;
            println!("[main] live fibers after shutdown: {:?}", coros.names());
            Ok::<(), anyhow::Error>(())
        })
        .await
}
