use crate::{
    abstract_domain::{AbstractDomain, DomainMap, UnionMergeStrategy},
    intermediate_representation::*,
    prelude::*,
};
use std::collections::BTreeMap;

/// The lifecycle state of one tracked resource handle.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum ResourceState {
    /// The resource was acquired by the call with the given term ID
    /// and not released on any path to the current program point.
    Acquired(Tid),
    /// The resource was released.
    /// The associated term ID denotes the releasing call.
    Released(Tid),
    /// The resource was released on some but not all paths to the current program point.
    /// The associated term ID denotes the acquiring call.
    MaybeReleased(Tid),
    /// A double release was already reported for this handle.
    /// This state is used to prevent duplicate CWE warnings with the same root cause.
    Flagged,
}

impl AbstractDomain for ResourceState {
    /// Merge two lifecycle states of the same handle.
    /// If the states disagree on whether the resource was released
    /// the merged handle is only maybe released.
    fn merge(&self, other: &Self) -> Self {
        use ResourceState::*;
        match (self, other) {
            (Flagged, _) | (_, Flagged) => Flagged,
            (Acquired(tid), Acquired(other_tid)) => Acquired(std::cmp::min(tid, other_tid).clone()),
            (Released(tid), Released(other_tid)) => Released(std::cmp::min(tid, other_tid).clone()),
            (MaybeReleased(tid), MaybeReleased(other_tid)) => {
                MaybeReleased(std::cmp::min(tid, other_tid).clone())
            }
            (Acquired(acquisition), Released(_)) | (Released(_), Acquired(acquisition)) => {
                MaybeReleased(acquisition.clone())
            }
            (MaybeReleased(acquisition), Acquired(_) | Released(_))
            | (Acquired(_) | Released(_), MaybeReleased(acquisition)) => {
                MaybeReleased(acquisition.clone())
            }
        }
    }

    /// The domain has no maximal element.
    fn is_top(&self) -> bool {
        false
    }
}

/// The `State` keeps track of the resource handles of the current function
/// together with their lifecycle states.
///
/// Handles are tracked per variable.
/// A handle whose value escapes the variable level,
/// e.g. by being stored into memory,
/// is removed from the state and no longer checked.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct State {
    /// The term ID of the function the state belongs to.
    pub current_fn_tid: Tid,
    /// The tracked handles and their lifecycle states.
    tracked: DomainMap<Variable, ResourceState, UnionMergeStrategy>,
}

impl State {
    /// Create a new, empty state, i.e. a state without any tracked handles,
    /// for the function with the given term ID.
    pub fn new(current_fn_tid: Tid) -> State {
        State {
            current_fn_tid,
            tracked: BTreeMap::new().into(),
        }
    }

    /// Start tracking the handle bound to `var`
    /// as acquired by the call with the given term ID.
    pub fn acquire(&mut self, var: &Variable, acquisition_tid: &Tid) {
        self.tracked
            .insert(var.clone(), ResourceState::Acquired(acquisition_tid.clone()));
    }

    /// Mark the handle bound to `var` as released by the call with the given term ID.
    ///
    /// If the handle may have been released before, its previous state is returned
    /// so that the caller can generate a CWE warning
    /// and the handle is flagged to suppress further warnings with the same root cause.
    /// An untracked handle (e.g. a parameter whose resource the caller acquired)
    /// starts its tracked life with the release,
    /// so that a second release of it is still caught.
    pub fn release(&mut self, var: &Variable, release_tid: &Tid) -> Option<ResourceState> {
        use ResourceState::*;
        match self.tracked.get(var).cloned() {
            None | Some(Acquired(_)) => {
                self.tracked
                    .insert(var.clone(), Released(release_tid.clone()));
                None
            }
            Some(previous @ (Released(_) | MaybeReleased(_))) => {
                self.tracked.insert(var.clone(), Flagged);
                Some(previous)
            }
            Some(Flagged) => None,
        }
    }

    /// Stop tracking the handle bound to `var`.
    ///
    /// Used when the handle value leaves the variable level of the current function,
    /// e.g. by being stored into memory or passed to a function that may take ownership.
    pub fn escape(&mut self, var: &Variable) {
        self.tracked.remove(var);
    }

    /// Process an assignment of `value` to `var`.
    ///
    /// Assigning a tracked handle to another variable moves the tracking,
    /// i.e. the handle is afterwards tracked under its new name only.
    /// Any other assignment ends the tracking of `var`,
    /// since its previous value is overwritten.
    pub fn handle_assign(&mut self, var: &Variable, value: &Expression) {
        if let Expression::Var(source) = value {
            if let Some(resource_state) = self.tracked.remove(source) {
                self.tracked.insert(var.clone(), resource_state);
                return;
            }
        }
        self.tracked.remove(var);
    }

    /// Return all handles that may hold an unreleased resource at a return site.
    ///
    /// A handle that is returned to the caller transfers ownership
    /// and is not counted as leaked.
    pub fn leaked_resources(&self, returned: Option<&Variable>) -> Vec<(Variable, ResourceState)> {
        let mut leaked = Vec::new();
        for (var, resource_state) in self.tracked.iter() {
            if returned == Some(var) {
                continue;
            }
            if matches!(
                resource_state,
                ResourceState::Acquired(_) | ResourceState::MaybeReleased(_)
            ) {
                leaked.push((var.clone(), resource_state.clone()));
            }
        }
        leaked
    }
}

impl AbstractDomain for State {
    /// Merge two states at a control flow join.
    fn merge(&self, other: &Self) -> State {
        State {
            current_fn_tid: self.current_fn_tid.clone(),
            tracked: self.tracked.merge(&other.tracked),
        }
    }

    /// The state has no maximal element.
    fn is_top(&self) -> bool {
        false
    }
}
