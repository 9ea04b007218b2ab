//! Shared fixtures for goaltree-core integration tests.

#![allow(dead_code, unused_macros)]

use goaltree_core::{
    GoalId, GoalKind, GoalService, GoalStore, GoalTreeConfig, MemoryGoalStore, NewGoal, OwnerId,
    SqliteGoalStore,
};

pub fn owner() -> OwnerId {
    OwnerId::new("user-1")
}

pub fn memory_service() -> GoalService<MemoryGoalStore> {
    GoalService::new(MemoryGoalStore::new(), GoalTreeConfig::default())
}

pub fn sqlite_service() -> GoalService<SqliteGoalStore> {
    GoalService::new(
        SqliteGoalStore::open_in_memory().unwrap(),
        GoalTreeConfig::default(),
    )
}

/// Create a goal of `owner()` with an optional parent.
pub fn add<S: GoalStore>(svc: &GoalService<S>, kind: GoalKind, parent: Option<GoalId>) -> GoalId {
    let mut goal = NewGoal::new(owner(), kind, format!("{kind} goal"));
    if let Some(parent) = parent {
        goal = goal.with_parent(parent);
    }
    svc.create_goal(goal).unwrap()
}

pub fn completion<S: GoalStore>(svc: &GoalService<S>, id: GoalId) -> Option<f64> {
    svc.get_goal(id).unwrap().completion
}

/// Root -> Mid -> Leaf.
pub struct ThreeLevels {
    pub root: GoalId,
    pub mid: GoalId,
    pub leaf: GoalId,
}

pub fn three_levels<S: GoalStore>(svc: &GoalService<S>) -> ThreeLevels {
    let root = add(svc, GoalKind::Yearly, None);
    let mid = add(svc, GoalKind::Quarterly, Some(root));
    let leaf = add(svc, GoalKind::Monthly, Some(mid));
    ThreeLevels { root, mid, leaf }
}

/// Run each listed generic property against both stores.
macro_rules! for_each_store {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[test]
                fn $name() {
                    super::$name(super::common::memory_service());
                }
            )*
        }

        mod sqlite {
            $(
                #[test]
                fn $name() {
                    super::$name(super::common::sqlite_service());
                }
            )*
        }
    };
}
