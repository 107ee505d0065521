use lodestar_events::ModuleId;

fn join_ids(ids: &[ModuleId]) -> String {
    ids.iter()
        .map(ModuleId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("module {0} is already registered")]
    DuplicateName(ModuleId),
    #[error("no module named '{0}'")]
    UnknownModule(String),
    #[error("'{name}' matches several modules: {}", join_ids(.candidates))]
    AmbiguousName {
        name: String,
        candidates: Vec<ModuleId>,
    },
    #[error("cannot activate {module}: requires {}", join_ids(.missing))]
    DependencyUnsatisfied {
        module: ModuleId,
        missing: Vec<ModuleId>,
    },
    #[error("cannot activate {module}: conflicts with {}", join_ids(.conflicting))]
    Conflict {
        module: ModuleId,
        conflicting: Vec<ModuleId>,
    },
    #[error("invalid declaration for {module}: {reason}")]
    InvalidDeclaration { module: ModuleId, reason: String },
    #[error("{module} failed to activate: {reason}")]
    ActivationFailed { module: ModuleId, reason: String },
}
