//! Dependency invalidation for property changes.

use std::collections::BTreeSet;

use crate::core::property::{DerivedState, PropertyKey, PropertyValue, Registry};
use crate::core::state::ConfigurationState;

/// What a single property change cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// Dependent properties that were unset, in visit order.
    pub cleared: Vec<PropertyKey>,
    /// Derived state that was reset.
    pub derived: BTreeSet<DerivedState>,
}

impl Invalidation {
    pub fn is_empty(&self) -> bool {
        self.cleared.is_empty() && self.derived.is_empty()
    }

    pub fn workflow_reset(&self) -> bool {
        self.derived.contains(&DerivedState::Workflow)
    }
}

/// Apply the invalidation closure for `key` changing from `old` to `new`.
///
/// Equal values are a no-op. Otherwise every transitive dependent is unset,
/// each visited at most once, and the derived state of `key` and of every
/// cleared dependent is reset. The value of `key` itself is left to the caller.
pub fn on_property_changed(
    registry: &Registry,
    state: &mut ConfigurationState,
    key: PropertyKey,
    old: Option<&PropertyValue>,
    new: Option<&PropertyValue>,
) -> Invalidation {
    let mut invalidation = Invalidation::default();
    if old == new {
        return invalidation;
    }

    let mut visited = BTreeSet::from([key]);
    let mut pending = vec![key];
    while let Some(current) = pending.pop() {
        let Some(descriptor) = registry.get(current) else {
            continue;
        };
        invalidation.derived.extend(descriptor.clears.iter().copied());
        for dependent in &descriptor.dependents {
            if visited.insert(*dependent) {
                state.properties.remove(dependent);
                invalidation.cleared.push(*dependent);
                pending.push(*dependent);
            }
        }
    }

    for derived in &invalidation.derived {
        reset_derived(state, *derived);
    }
    invalidation
}

fn reset_derived(state: &mut ConfigurationState, derived: DerivedState) {
    match derived {
        DerivedState::AccountIdentity => state.aws_account_id = None,
        DerivedState::Network => state.network = None,
        DerivedState::StackTarget => state.stack_id_to_update = None,
        DerivedState::Workflow => {
            if state.workflow.is_some() {
                state.workflow = Some(Default::default());
            }
        }
        DerivedState::RemoteResource => state.remote_resource = None,
        DerivedState::ApiKeyValidation => state.api_key_validated = false,
    }
}
