use super::provisioner::ResourceRefs;
use uuid::Uuid;

/// Shared read-mostly context for one orchestration run.
///
/// Carries the run identifier and the resource reference store. References
/// are written once by their producing node (via the coordinator) and read
/// immutably by dependents, so no locking is needed between sibling nodes.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub refs: ResourceRefs,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            refs: ResourceRefs::new(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
