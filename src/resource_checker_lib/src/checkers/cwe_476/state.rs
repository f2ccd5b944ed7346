use crate::abstract_domain::{AbstractDomain, DomainMap, IntersectMergeStrategy};
use crate::intermediate_representation::*;
use crate::prelude::*;
use std::collections::BTreeMap;

/// A witness that a place was proven non-NULL.
/// The associated TID denotes the term that established the proof,
/// i.e. a NULL check or a store of a definite function address.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
struct NonNullWitness(Tid);

impl AbstractDomain for NonNullWitness {
    /// Merge two witnesses for the same place by keeping the smaller TID.
    fn merge(&self, other: &Self) -> Self {
        NonNullWitness(std::cmp::min(&self.0, &other.0).clone())
    }

    /// Always returns false. A witness has no `Top` element.
    fn is_top(&self) -> bool {
        false
    }
}

/// The state tracks the set of places that are proven non-NULL
/// on every path leading to the current program point.
/// Merging two states keeps only the proofs that hold in both.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct State {
    /// The function the state belongs to.
    pub current_fn_tid: Tid,
    proven_non_null: DomainMap<Place, NonNullWitness, IntersectMergeStrategy>,
}

impl State {
    /// Create a new state without any known proofs.
    pub fn new(current_fn_tid: Tid) -> State {
        State {
            current_fn_tid,
            proven_non_null: BTreeMap::new().into(),
        }
    }

    /// Record that the given place is proven non-NULL from the given term onward.
    pub fn add_proof(&mut self, place: &Place, witness: &Tid) {
        self.proven_non_null
            .insert(place.clone(), NonNullWitness(witness.clone()));
    }

    /// Drop the proof for the given place,
    /// e.g. because the place was overwritten with an unknown value.
    pub fn remove_proof(&mut self, place: &Place) {
        self.proven_non_null.remove(place);
    }

    /// Drop all proofs for places rooted in the given variable.
    /// Used when the variable itself is reassigned,
    /// since all access paths through it may then point elsewhere.
    pub fn remove_proofs_based_on(&mut self, var: &Variable) {
        let stale: Vec<Place> = self
            .proven_non_null
            .keys()
            .filter(|place| place.base == *var)
            .cloned()
            .collect();
        for place in stale {
            self.proven_non_null.remove(&place);
        }
    }

    /// Check whether the place is proven non-NULL on every path to the current program point.
    pub fn is_proven_non_null(&self, place: &Place) -> bool {
        self.proven_non_null.contains_key(place)
    }
}

impl AbstractDomain for State {
    /// Merge two states by intersecting their proofs.
    fn merge(&self, other: &Self) -> Self {
        State {
            current_fn_tid: self.current_fn_tid.clone(),
            proven_non_null: self.proven_non_null.merge(&other.proven_non_null),
        }
    }

    /// Always returns false. The state has no logical `Top` element.
    fn is_top(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::intermediate_representation::POINTER_SIZE;

    fn dispatch_place() -> Place {
        Place {
            base: Variable::new("a", POINTER_SIZE),
            accessors: vec![
                Accessor::Deref,
                Accessor::Field {
                    struct_name: "archive_read".into(),
                    field: "format".into(),
                },
                Accessor::Deref,
                Accessor::Field {
                    struct_name: "archive_format_descriptor".into(),
                    field: "read_data".into(),
                },
            ],
        }
    }

    #[test]
    fn proofs_are_recorded_and_dropped() {
        let mut state = State::new(Tid::new("func"));
        let place = dispatch_place();
        assert!(!state.is_proven_non_null(&place));

        state.add_proof(&place, &Tid::new("null_check"));
        assert!(state.is_proven_non_null(&place));

        state.remove_proof(&place);
        assert!(!state.is_proven_non_null(&place));
    }

    #[test]
    fn reassigning_the_base_variable_invalidates_proofs() {
        let mut state = State::new(Tid::new("func"));
        let place = dispatch_place();
        let unrelated = Place::var(Variable::new("fp", POINTER_SIZE));
        state.add_proof(&place, &Tid::new("null_check"));
        state.add_proof(&unrelated, &Tid::new("other_check"));

        state.remove_proofs_based_on(&Variable::new("a", POINTER_SIZE));
        assert!(!state.is_proven_non_null(&place));
        assert!(state.is_proven_non_null(&unrelated));
    }

    #[test]
    fn merging_intersects_the_proofs() {
        let place = dispatch_place();
        let other_place = Place::var(Variable::new("fp", POINTER_SIZE));
        let mut state_left = State::new(Tid::new("func"));
        state_left.add_proof(&place, &Tid::new("check_1"));
        state_left.add_proof(&other_place, &Tid::new("check_2"));
        let mut state_right = State::new(Tid::new("func"));
        state_right.add_proof(&place, &Tid::new("check_3"));

        let merged = state_left.merge(&state_right);
        assert!(merged.is_proven_non_null(&place));
        assert!(!merged.is_proven_non_null(&other_place));
    }
}
