//! Conditions deciding when enough data has arrived.

use crate::buffer::Buffer;

/// Pure predicate over a stream's currently buffered, unconsumed data.
///
/// A condition is checked once synchronously when a wait is requested and
/// again after every append of newly received bytes. It must be safe to
/// invoke any number of times and must not mutate the buffer.
pub trait Condition: Send {
    /// True once the buffered data is sufficient to resolve the wait.
    fn check(&self, data: &Buffer) -> bool;
}

impl<F> Condition for F
where
    F: Fn(&Buffer) -> bool + Send,
{
    fn check(&self, data: &Buffer) -> bool {
        self(data)
    }
}

/// Condition satisfied once at least `n` unconsumed bytes are buffered.
#[derive(Debug, Clone, Copy)]
pub struct MinAvailable(pub usize);

impl Condition for MinAvailable {
    fn check(&self, data: &Buffer) -> bool {
        data.remaining() >= self.0
    }
}

/// Shorthand for [`MinAvailable`], boxed for a `wait_for` call.
#[must_use]
pub fn min_available(n: usize) -> Box<dyn Condition> {
    Box::new(MinAvailable(n))
}
