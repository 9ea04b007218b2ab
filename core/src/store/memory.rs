//! In-memory goal store.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{CheckFn, DecideFn, GoalLookup, GoalStore, NodeStep};
use crate::error::{GoalTreeError, Result};
use crate::goal::{Completion, Goal, GoalId, GoalKind, NewGoal, OwnerId};

#[derive(Debug)]
struct Entry {
    /// Creation sequence, used for child ordering.
    seq: u64,
    goal: Goal,
}

#[derive(Debug, Default)]
struct Inner {
    goals: HashMap<GoalId, Entry>,
    next_seq: u64,
}

impl Inner {
    fn children_of(&self, parent_id: GoalId) -> Vec<Goal> {
        let mut children: Vec<&Entry> = self
            .goals
            .values()
            .filter(|e| e.goal.parent_id == Some(parent_id))
            .collect();
        children.sort_by_key(|e| e.seq);
        children.into_iter().map(|e| e.goal.clone()).collect()
    }

    fn entry_mut(&mut self, goal_id: GoalId) -> Result<&mut Entry> {
        self.goals
            .get_mut(&goal_id)
            .ok_or(GoalTreeError::NotFound { goal_id })
    }

    fn require_parent(&self, parent_id: Option<GoalId>) -> Result<()> {
        match parent_id {
            Some(parent_id) if !self.goals.contains_key(&parent_id) => {
                Err(GoalTreeError::not_found(parent_id))
            }
            _ => Ok(()),
        }
    }
}

impl GoalLookup for Inner {
    fn lookup_goal(&self, goal_id: GoalId) -> Result<Option<Goal>> {
        Ok(self.goals.get(&goal_id).map(|e| e.goal.clone()))
    }

    fn lookup_children(&self, parent_id: GoalId) -> Result<Vec<Goal>> {
        Ok(self.children_of(parent_id))
    }
}

/// Goal store backed by a single mutex-guarded map.
///
/// Every trait call takes the lock once, so a `transact_node` step is
/// atomic with respect to all other writers.
#[derive(Debug, Default)]
pub struct MemoryGoalStore {
    inner: Mutex<Inner>,
}

impl MemoryGoalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored goals.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.goals.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| GoalTreeError::store("memory store lock poisoned"))
    }
}

impl GoalStore for MemoryGoalStore {
    fn get(&self, goal_id: GoalId) -> Result<Option<Goal>> {
        let inner = self.lock()?;
        Ok(inner.goals.get(&goal_id).map(|e| e.goal.clone()))
    }

    fn get_children(&self, parent_id: GoalId) -> Result<Vec<Goal>> {
        let inner = self.lock()?;
        Ok(inner.children_of(parent_id))
    }

    fn create(&self, goal: NewGoal) -> Result<GoalId> {
        let mut inner = self.lock()?;
        inner.require_parent(goal.parent_id)?;

        let id = GoalId::new();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.goals.insert(
            id,
            Entry {
                seq,
                goal: goal.into_goal(id, Utc::now()),
            },
        );
        Ok(id)
    }

    fn update_completion(&self, goal_id: GoalId, completion: Completion) -> Result<()> {
        let mut inner = self.lock()?;
        let entry = inner.entry_mut(goal_id)?;
        entry.goal.completion = Some(completion.value);
        entry.goal.status = completion.status;
        entry.goal.updated_at = Utc::now();
        Ok(())
    }

    fn set_parent(&self, goal_id: GoalId, parent_id: Option<GoalId>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.require_parent(parent_id)?;
        let entry = inner.entry_mut(goal_id)?;
        entry.goal.parent_id = parent_id;
        entry.goal.updated_at = Utc::now();
        Ok(())
    }

    fn relink(
        &self,
        goal_id: GoalId,
        parent_id: Option<GoalId>,
        check: &mut CheckFn<'_>,
    ) -> Result<Goal> {
        let mut inner = self.lock()?;
        let previous = inner.entry_mut(goal_id)?.goal.clone();
        inner.require_parent(parent_id)?;
        check(&*inner)?;

        let entry = inner.entry_mut(goal_id)?;
        entry.goal.parent_id = parent_id;
        entry.goal.updated_at = Utc::now();
        Ok(previous)
    }

    fn delete_goals(&self, goal_ids: &[GoalId]) -> Result<()> {
        let mut inner = self.lock()?;

        let mut doomed = HashSet::with_capacity(goal_ids.len());
        for &goal_id in goal_ids {
            if !inner.goals.contains_key(&goal_id) || doomed.contains(&goal_id) {
                return Err(GoalTreeError::not_found(goal_id));
            }
            let has_survivors = inner
                .goals
                .values()
                .any(|e| e.goal.parent_id == Some(goal_id) && !doomed.contains(&e.goal.id));
            if has_survivors {
                return Err(GoalTreeError::store(format!(
                    "goal {goal_id} still has children"
                )));
            }
            doomed.insert(goal_id);
        }

        for goal_id in goal_ids {
            inner.goals.remove(goal_id);
        }
        Ok(())
    }

    fn list_goals(&self, owner: &OwnerId, kind: Option<GoalKind>) -> Result<Vec<Goal>> {
        let inner = self.lock()?;
        let mut entries: Vec<&Entry> = inner
            .goals
            .values()
            .filter(|e| &e.goal.owner == owner && kind.is_none_or(|k| e.goal.kind == k))
            .collect();
        entries.sort_by_key(|e| e.seq);
        Ok(entries.into_iter().map(|e| e.goal.clone()).collect())
    }

    fn transact_node(
        &self,
        goal_id: GoalId,
        decide: &mut DecideFn<'_>,
    ) -> Result<Option<NodeStep>> {
        let mut inner = self.lock()?;
        let Some(entry) = inner.goals.get(&goal_id) else {
            return Ok(None);
        };
        let current = entry.goal.clone();
        let children = inner.children_of(goal_id);

        let Some(completion) = decide(&current, &children) else {
            return Ok(Some(NodeStep {
                goal: current,
                child_count: children.len(),
                written: false,
            }));
        };

        let entry = inner.entry_mut(goal_id)?;
        entry.goal.completion = Some(completion.value);
        entry.goal.status = completion.status;
        entry.goal.updated_at = Utc::now();
        Ok(Some(NodeStep {
            goal: entry.goal.clone(),
            child_count: children.len(),
            written: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalStatus;

    fn new_goal(title: &str) -> NewGoal {
        NewGoal::new(OwnerId::new("u1"), GoalKind::Monthly, title)
    }

    #[test]
    fn children_come_back_in_creation_order() {
        let store = MemoryGoalStore::new();
        let parent = store.create(new_goal("parent")).unwrap();
        let a = store.create(new_goal("a").with_parent(parent)).unwrap();
        let b = store.create(new_goal("b").with_parent(parent)).unwrap();
        let c = store.create(new_goal("c").with_parent(parent)).unwrap();

        let ids: Vec<GoalId> = store
            .get_children(parent)
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn create_under_missing_parent_fails() {
        let store = MemoryGoalStore::new();
        let err = store
            .create(new_goal("orphan").with_parent(GoalId::new()))
            .unwrap_err();
        assert!(matches!(err, GoalTreeError::NotFound { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn update_completion_on_missing_goal_is_not_found() {
        let store = MemoryGoalStore::new();
        let err = store
            .update_completion(
                GoalId::new(),
                Completion {
                    value: 10.0,
                    status: GoalStatus::Active,
                },
            )
            .unwrap_err();
        assert!(matches!(err, GoalTreeError::NotFound { .. }));
    }

    #[test]
    fn delete_refuses_goal_with_children() {
        let store = MemoryGoalStore::new();
        let parent = store.create(new_goal("parent")).unwrap();
        store.create(new_goal("child").with_parent(parent)).unwrap();

        assert!(store.delete_goals(&[parent]).is_err());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn delete_goals_is_all_or_nothing() {
        let store = MemoryGoalStore::new();
        let parent = store.create(new_goal("parent")).unwrap();
        let a = store.create(new_goal("a").with_parent(parent)).unwrap();
        let b = store.create(new_goal("b").with_parent(parent)).unwrap();

        // `b` is left out, so `parent` still has a child when its turn comes.
        assert!(store.delete_goals(&[a, parent]).is_err());
        assert_eq!(store.len(), 3);
        assert!(store.get(a).unwrap().is_some());

        store.delete_goals(&[a, b, parent]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn relink_writes_only_after_check_passes() {
        let store = MemoryGoalStore::new();
        let parent = store.create(new_goal("parent")).unwrap();
        let child = store.create(new_goal("child")).unwrap();

        let err = store
            .relink(child, Some(parent), &mut |_| {
                Err(GoalTreeError::MaxDepthExceeded { limit: 1 })
            })
            .unwrap_err();
        assert!(matches!(err, GoalTreeError::MaxDepthExceeded { limit: 1 }));
        assert_eq!(store.get(child).unwrap().unwrap().parent_id, None);

        let previous = store
            .relink(child, Some(parent), &mut |view| {
                assert!(view.lookup_goal(parent)?.is_some());
                assert!(view.lookup_children(parent)?.is_empty());
                Ok(())
            })
            .unwrap();
        assert_eq!(previous.parent_id, None);
        assert_eq!(store.get(child).unwrap().unwrap().parent_id, Some(parent));
    }

    #[test]
    fn transact_node_skips_write_when_decide_declines() {
        let store = MemoryGoalStore::new();
        let id = store.create(new_goal("g").with_completion(30.0)).unwrap();

        let step = store
            .transact_node(id, &mut |_, _| None)
            .unwrap()
            .unwrap();
        assert!(!step.written);
        assert_eq!(step.goal.completion, Some(30.0));

        let step = store
            .transact_node(id, &mut |_, _| {
                Some(Completion {
                    value: 45.0,
                    status: GoalStatus::Active,
                })
            })
            .unwrap()
            .unwrap();
        assert!(step.written);
        assert_eq!(store.get(id).unwrap().unwrap().completion, Some(45.0));
    }

    #[test]
    fn transact_node_on_missing_goal_returns_none() {
        let store = MemoryGoalStore::new();
        let step = store
            .transact_node(GoalId::new(), &mut |_, _| None)
            .unwrap();
        assert!(step.is_none());
    }

    #[test]
    fn list_goals_filters_owner_and_kind() {
        let store = MemoryGoalStore::new();
        let owner = OwnerId::new("u1");
        store
            .create(NewGoal::new(owner.clone(), GoalKind::Yearly, "y"))
            .unwrap();
        store
            .create(NewGoal::new(owner.clone(), GoalKind::Weekly, "w"))
            .unwrap();
        store
            .create(NewGoal::new(OwnerId::new("u2"), GoalKind::Yearly, "other"))
            .unwrap();

        assert_eq!(store.list_goals(&owner, None).unwrap().len(), 2);
        let yearly = store.list_goals(&owner, Some(GoalKind::Yearly)).unwrap();
        assert_eq!(yearly.len(), 1);
        assert_eq!(yearly[0].title, "y");
    }
}
