use std::time::Duration;

// Gc times this long mean the page should never be collected, no timer is started.
const NEVER_GC: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Run `gc_cb` after `gc_time`, and again after every further `gc_time` until it returns `true`.
///
/// The callback returns `false` when the entry couldn't be collected yet, e.g. it was read since
/// or a resource is still watching it.
pub(crate) fn schedule_gc(gc_cb: impl Fn() -> bool + Send + 'static, gc_time: Duration) {
    if gc_time >= NEVER_GC {
        return;
    }

    // In tests, spawn_local hangs, a tokio task sleeps the same way:
    #[cfg(all(test, not(target_arch = "wasm32")))]
    {
        tokio::task::spawn(async move {
            tokio::time::sleep(gc_time).await;
            while !gc_cb() {
                tokio::time::sleep(gc_time).await;
            }
        });
    }

    #[cfg(not(all(test, not(target_arch = "wasm32"))))]
    {
        // No gc timers on the server:
        if cfg!(feature = "ssr") {
            return;
        }

        fn run(gc_cb: impl Fn() -> bool + Send + 'static, gc_time: Duration) {
            if !gc_cb() {
                leptos::prelude::set_timeout(move || run(gc_cb, gc_time), gc_time);
            }
        }
        leptos::prelude::set_timeout(move || run(gc_cb, gc_time), gc_time);
    }
}
