// src/engine/scheduler.rs
//
// Pure bookkeeping for the worker pool: which execution contexts are busy,
// which tasks are waiting, in what order. No threads, no channels; the
// pool's orchestrator thread is the only owner.

use crate::error::{ConvertError, Result};
use crate::formats::ConversionTask;
use std::collections::{HashSet, VecDeque};

/// State of one execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextState {
    Idle,
    /// Running the task with this id
    Busy(String),
}

/// A task leaving the queue for a context.
#[derive(Debug)]
pub struct Dispatch {
    pub context: usize,
    pub task: ConversionTask,
}

#[derive(Debug)]
pub struct Scheduler {
    contexts: Vec<ContextState>,
    queue: VecDeque<ConversionTask>,
    seen_ids: HashSet<String>,
    peak_busy: usize,
}

impl Scheduler {
    /// `capacity` contexts, all idle.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ConvertError::invalid_argument(
                "workers",
                "0",
                "pool needs at least one execution context",
            ));
        }
        Ok(Self {
            contexts: vec![ContextState::Idle; capacity],
            queue: VecDeque::new(),
            seen_ids: HashSet::new(),
            peak_busy: 0,
        })
    }

    /// Append to the tail of the queue.
    ///
    /// Ids are unique for the lifetime of the scheduler, including ids of
    /// tasks that already finished.
    pub fn enqueue(&mut self, task: ConversionTask) -> Result<()> {
        if !self.seen_ids.insert(task.id.clone()) {
            return Err(ConvertError::duplicate_task_id(task.id));
        }
        self.queue.push_back(task);
        Ok(())
    }

    /// Pair the lowest-index idle context with the head of the queue.
    pub fn dispatch(&mut self) -> Option<Dispatch> {
        if self.queue.is_empty() {
            return None;
        }
        let context = self
            .contexts
            .iter()
            .position(|state| *state == ContextState::Idle)?;
        let task = self.queue.pop_front()?;
        self.contexts[context] = ContextState::Busy(task.id.clone());
        self.peak_busy = self.peak_busy.max(self.busy_count());
        Some(Dispatch { context, task })
    }

    /// Mark `context` idle again, returning the id it was running.
    pub fn finish(&mut self, context: usize) -> Option<String> {
        let slot = self.contexts.get_mut(context)?;
        match std::mem::replace(slot, ContextState::Idle) {
            ContextState::Busy(id) => Some(id),
            ContextState::Idle => None,
        }
    }

    /// Drop everything still waiting. Returns the discarded ids.
    pub fn clear_queue(&mut self) -> Vec<String> {
        self.queue.drain(..).map(|task| task.id).collect()
    }

    /// Mark every context idle without waiting for it. Returns the ids that
    /// were still running.
    pub fn abandon_running(&mut self) -> Vec<String> {
        (0..self.contexts.len())
            .filter_map(|context| self.finish(context))
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.contexts.len()
    }

    pub fn busy_count(&self) -> usize {
        self.contexts
            .iter()
            .filter(|state| matches!(state, ContextState::Busy(_)))
            .count()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn peak_busy(&self) -> usize {
        self.peak_busy
    }

    /// Id running on `context`, if any.
    pub fn running(&self, context: usize) -> Option<&str> {
        match self.contexts.get(context)? {
            ContextState::Busy(id) => Some(id),
            ContextState::Idle => None,
        }
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen_ids.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{SourceFormat, TargetFormat, WorkingProfile};

    fn task(id: &str) -> ConversionTask {
        ConversionTask::new(
            id,
            SourceFormat::Png,
            TargetFormat::Tiff,
            WorkingProfile::Srgb,
            vec![0; 4],
        )
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(Scheduler::new(0).is_err());
    }

    #[test]
    fn dispatch_is_fifo_and_capacity_bound() {
        let mut s = Scheduler::new(2).unwrap();
        for id in ["a", "b", "c", "d"] {
            s.enqueue(task(id)).unwrap();
        }

        let first = s.dispatch().unwrap();
        let second = s.dispatch().unwrap();
        assert_eq!((first.context, first.task.id.as_str()), (0, "a"));
        assert_eq!((second.context, second.task.id.as_str()), (1, "b"));
        assert!(s.dispatch().is_none());
        assert_eq!(s.busy_count(), 2);
        assert_eq!(s.queued_len(), 2);

        assert_eq!(s.finish(1).as_deref(), Some("b"));
        let third = s.dispatch().unwrap();
        assert_eq!((third.context, third.task.id.as_str()), (1, "c"));
    }

    #[test]
    fn lowest_idle_context_wins() {
        let mut s = Scheduler::new(3).unwrap();
        for id in ["a", "b", "c", "d"] {
            s.enqueue(task(id)).unwrap();
        }
        while s.dispatch().is_some() {}
        s.finish(2);
        s.finish(0);
        assert_eq!(s.dispatch().unwrap().context, 0);
    }

    #[test]
    fn duplicate_ids_are_rejected_even_after_finish() {
        let mut s = Scheduler::new(1).unwrap();
        s.enqueue(task("a")).unwrap();
        assert!(matches!(
            s.enqueue(task("a")),
            Err(ConvertError::DuplicateTaskId { .. })
        ));
        s.dispatch().unwrap();
        s.finish(0);
        assert!(s.enqueue(task("a")).is_err());
        assert_eq!(s.queued_len(), 0);
    }

    #[test]
    fn finish_on_idle_or_unknown_context() {
        let mut s = Scheduler::new(1).unwrap();
        assert_eq!(s.finish(0), None);
        assert_eq!(s.finish(7), None);
    }

    #[test]
    fn running_and_peak() {
        let mut s = Scheduler::new(2).unwrap();
        s.enqueue(task("a")).unwrap();
        s.enqueue(task("b")).unwrap();
        s.dispatch();
        s.dispatch();
        assert_eq!(s.running(0), Some("a"));
        assert_eq!(s.running(1), Some("b"));
        s.finish(0);
        s.finish(1);
        assert_eq!(s.running(0), None);
        assert_eq!(s.peak_busy(), 2);
        assert_eq!(s.busy_count(), 0);
    }

    #[test]
    fn clear_queue_keeps_running_tasks() {
        let mut s = Scheduler::new(1).unwrap();
        for id in ["a", "b", "c"] {
            s.enqueue(task(id)).unwrap();
        }
        s.dispatch();
        assert_eq!(s.clear_queue(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(s.running(0), Some("a"));
        assert!(s.has_seen("c"));
    }

    #[test]
    fn abandon_running_idles_every_context() {
        let mut s = Scheduler::new(2).unwrap();
        for id in ["a", "b", "c"] {
            s.enqueue(task(id)).unwrap();
        }
        s.dispatch();
        s.dispatch();
        assert_eq!(s.busy_count(), 2);
        assert_eq!(s.abandon_running(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(s.busy_count(), 0);
        assert_eq!(s.queued_len(), 1);
        assert_eq!(s.peak_busy(), 2);
        assert!(s.abandon_running().is_empty());
    }
}
