/// One-shot tasks on the session clock.
///
/// At most one task per key: scheduling a key that is already pending
/// replaces it. Due tasks are only handed out by `take_due`, which the
/// session calls at the start of a step, so nothing scheduled during a
/// step can fire inside that same step.

use std::collections::BTreeMap;

use crate::domain::body::EntityId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum TaskKey {
    AnimationComplete(EntityId),
    RestartLevel,
}

#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    tasks: BTreeMap<TaskKey, u64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    pub fn schedule(&mut self, key: TaskKey, due_ms: u64) {
        self.tasks.insert(key, due_ms);
    }

    pub fn cancel(&mut self, key: TaskKey) {
        self.tasks.remove(&key);
    }

    #[cfg(test)]
    pub fn is_pending(&self, key: TaskKey) -> bool {
        self.tasks.contains_key(&key)
    }

    /// Remove and return every task due at `now_ms`, earliest first.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<TaskKey> {
        let mut due: Vec<(u64, TaskKey)> = self.tasks.iter()
            .filter(|(_, &at)| at <= now_ms)
            .map(|(&key, &at)| (at, key))
            .collect();
        due.sort();
        for (_, key) in &due {
            self.tasks.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_replaces() {
        let mut s = Scheduler::new();
        let key = TaskKey::AnimationComplete(EntityId(1));
        s.schedule(key, 100);
        s.schedule(key, 300);
        assert!(s.take_due(200).is_empty());
        assert_eq!(s.take_due(300), vec![key]);
        assert!(!s.is_pending(key));
    }

    #[test]
    fn due_tasks_come_out_in_time_order() {
        let mut s = Scheduler::new();
        s.schedule(TaskKey::RestartLevel, 50);
        s.schedule(TaskKey::AnimationComplete(EntityId(4)), 80);
        s.schedule(TaskKey::AnimationComplete(EntityId(2)), 20);
        assert_eq!(
            s.take_due(100),
            vec![
                TaskKey::AnimationComplete(EntityId(2)),
                TaskKey::RestartLevel,
                TaskKey::AnimationComplete(EntityId(4)),
            ]
        );
    }

    #[test]
    fn cancel_drops_task() {
        let mut s = Scheduler::new();
        s.schedule(TaskKey::RestartLevel, 10);
        s.cancel(TaskKey::RestartLevel);
        assert!(s.take_due(1000).is_empty());
    }
}
