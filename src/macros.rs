#[macro_export]
macro_rules! wrapper {
    // Single expression (like a function name or closure)
    ($f:expr) => {{
        $f()
    }};
    ($f:expr, $( $args:expr $(,)? )* ) => {{
        $f( $($args,)* )
    }};
}

/// Calls a fallible function until it succeeds or `attempts` retries are used up.
/// The wait between calls starts at 5 seconds and doubles each time.
#[macro_export]
macro_rules! retry {
    ($attempts:expr; $( $args:expr$(,)? )+) => {{
        let attempts: u32 = $attempts;
        let mut wait: u64 = 5;
        let mut attempt: u32 = 0;
        loop {
            let res = $crate::wrapper!($( $args, )*);
            if res.is_ok() || attempt >= attempts {
                break res;
            }
            attempt += 1;
            if let Err(e) = &res {
                log::warn!("attempt {} of {} failed, retrying in {}s: {}", attempt, attempts + 1, wait, e);
            }
            std::thread::sleep(std::time::Duration::from_secs(wait));
            wait *= 2;
        }
    }};
}
