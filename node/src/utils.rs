use actix::System;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

/// Time elapsed between `since` and `now`, zero if the clock went backwards
pub fn elapsed(since: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or_default()
}

/// Helper function to stop the actor system if the current thread is panicking.
/// This should be used in the `Drop` implementation of essential actors.
pub fn stop_system_if_panicking(actor_name: &str) {
    if std::thread::panicking() {
        // If no actix system is running, this method does nothing
        if let Some(system) = System::try_current() {
            log::error!("Panic in {}, shutting down system", actor_name);
            system.stop_with_code(1);
        }
    }
}

/// Helper function used to test actors.
/// This should use the same code that the node uses to start the actor system.
pub fn test_actix_system<F: FnOnce() -> Fut, Fut: Future>(test_function: F) {
    // Use this flag to ensure that the test has been run, because you can never trust
    // asynchronous code
    let done = Arc::new(AtomicBool::new(false));

    let system = System::new();

    system.block_on(async {
        test_function().await;
        done.store(true, Ordering::Relaxed);
        System::current().stop_with_code(0);
    });

    let res = system.run();
    res.expect("test system stop with error code");

    // Calling stop_with_code somewhere else will stop the test system, potentially skipping some
    // asserts in the test function.
    assert!(
        done.load(Ordering::Relaxed),
        "test system has stopped for an unknown reason"
    );
}
