//! SIGINT/SIGTERM handling
//!
//! The first signal sets the shared [`Interrupt`] so the running operation
//! finishes its current step and starts no other. A second signal exits
//! immediately.

use std::sync::mpsc;
use std::thread;

use sysguard_core::Interrupt;
use tracing::warn;

/// Exit status after a second interrupt
const FORCED_EXIT: i32 = 130;

/// Install the handlers on a helper thread; returns once they are active.
pub fn install(interrupt: Interrupt) -> std::io::Result<()> {
    let (ready_tx, ready_rx) = mpsc::channel::<std::io::Result<()>>();

    thread::Builder::new()
        .name("sysguard-signals".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            runtime.block_on(watch(interrupt, ready_tx));
        })?;

    ready_rx
        .recv()
        .unwrap_or_else(|_| Err(std::io::Error::other("signal thread exited early")))
}

#[cfg(unix)]
async fn watch(interrupt: Interrupt, ready: mpsc::Sender<std::io::Result<()>>) {
    use tokio::signal::unix::{SignalKind, signal};

    let streams = signal(SignalKind::interrupt())
        .and_then(|int| signal(SignalKind::terminate()).map(|term| (int, term)));
    let (mut int, mut term) = match streams {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    loop {
        let name = tokio::select! {
            _ = int.recv() => "SIGINT",
            _ = term.recv() => "SIGTERM",
        };
        on_signal(&interrupt, name);
    }
}

#[cfg(not(unix))]
async fn watch(interrupt: Interrupt, ready: mpsc::Sender<std::io::Result<()>>) {
    let _ = ready.send(Ok(()));
    while tokio::signal::ctrl_c().await.is_ok() {
        on_signal(&interrupt, "Ctrl-C");
    }
}

fn on_signal(interrupt: &Interrupt, name: &str) {
    if interrupt.is_set() {
        eprintln!("{name} received again, exiting");
        std::process::exit(FORCED_EXIT);
    }
    warn!(signal = name, "interrupt requested");
    eprintln!("{name} received: finishing the current step (repeat to exit now)");
    interrupt.trigger();
}
