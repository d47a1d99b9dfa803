//! Stack growth for the recursive tree walks

/// Remaining stack below which a walk switches to a fresh segment
const RED_ZONE: usize = 128 * 1024;

/// Size of each segment allocated on demand
const SEGMENT: usize = 4 * 1024 * 1024;

/// Run `f`, growing the stack first if it is nearly exhausted
///
/// Wrapped around each recursive step of the parser, binder, flow analysis
/// and lowering, so a deeply nested tree never overflows the thread stack.
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(n: usize) -> usize {
        ensure_sufficient_stack(|| if n == 0 { 0 } else { 1 + depth(n - 1) })
    }

    #[test]
    fn test_deep_recursion_grows_the_stack() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| depth(100_000))
            .unwrap();
        assert_eq!(handle.join().unwrap(), 100_000);
    }
}
