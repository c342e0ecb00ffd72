use super::TaskScheduler;
use crate::continuation::ContinuationNode;

use std::pin::Pin;

/// Resumes scheduled computations immediately on the scheduling thread.
///
/// Useful where a [`ThreadPool`](super::ThreadPool) is unavailable or
/// unwanted, e.g. in tests or as an explicit fallback after a failed pool
/// construction.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl TaskScheduler for InlineScheduler {
    fn schedule_node(&self, node: Pin<&ContinuationNode<()>>) {
        node.mark_linked();

        // Safety: the node was linked right above and is owned by nobody
        // else.
        unsafe { ContinuationNode::resume(node.get_ref(), ()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, wait_for};

    #[test]
    fn schedule_completes_on_the_same_thread() {
        let caller = std::thread::current().id();

        let resumed_on = wait_for(Task::new(async {
            InlineScheduler.schedule().await;
            std::thread::current().id()
        }));

        assert_eq!(resumed_on, caller);
    }
}
