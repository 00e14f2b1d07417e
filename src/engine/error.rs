use crate::model::ResourceId;

#[derive(Debug, PartialEq, Eq)]
pub enum EngineError {
    NoResources,
    NoSlots,
    DuplicateResource(ResourceId),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NoResources => write!(f, "at least one resource is required"),
            EngineError::NoSlots => write!(f, "admission table needs at least one slot"),
            EngineError::DuplicateResource(id) => write!(f, "duplicate resource: {id}"),
        }
    }
}

impl std::error::Error for EngineError {}
