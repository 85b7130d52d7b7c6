//! Model selection

use crate::registry::{ModelId, ModelRegistry, UseCase, FALLBACK_MODEL};
use tracing::debug;

/// Resolve the model for one call.
///
/// Precedence: a registered per-call override, then a registered pipeline
/// default, then the first registered candidate on the use-case ladder,
/// then the fixed fallback.
pub fn select_model(
    registry: &ModelRegistry,
    requested: Option<&str>,
    default_model: Option<ModelId>,
    use_case: UseCase,
) -> ModelId {
    if let Some(id) = requested.and_then(|r| r.parse::<ModelId>().ok()) {
        if registry.contains(id) {
            return id;
        }
    }
    if let Some(id) = requested {
        debug!("Ignoring unregistered model override {}", id);
    }

    if let Some(id) = default_model.filter(|id| registry.contains(*id)) {
        return id;
    }

    registry
        .candidates(use_case)
        .iter()
        .copied()
        .find(|id| registry.contains(*id))
        .unwrap_or(FALLBACK_MODEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::catalog_profile;
    use pretty_assertions::assert_eq;

    fn registry_with(models: &[ModelId]) -> ModelRegistry {
        ModelRegistry::builtin().with_models(models.iter().filter_map(|m| catalog_profile(*m)))
    }

    #[test]
    fn test_first_registered_candidate_wins() {
        let registry = registry_with(&[ModelId::Qwq32b, ModelId::Llama32_1b]).with_ladder(
            UseCase::ComplexReasoning,
            vec![ModelId::Llama4Scout, ModelId::Qwq32b, ModelId::Llama32_1b],
        );
        assert_eq!(
            select_model(&registry, None, None, UseCase::ComplexReasoning),
            ModelId::Qwq32b
        );
    }

    #[test]
    fn test_override_beats_default_and_ladder() {
        let registry = ModelRegistry::builtin();
        assert_eq!(
            select_model(
                &registry,
                Some("llama-3.2-1b-instruct"),
                Some(ModelId::Llama4Scout),
                UseCase::RealTimeChat
            ),
            ModelId::Llama32_1b
        );
    }

    #[test]
    fn test_unknown_override_falls_through_to_default() {
        let registry = ModelRegistry::builtin();
        assert_eq!(
            select_model(&registry, Some("gpt-9"), Some(ModelId::Llama4Scout), UseCase::RealTimeChat),
            ModelId::Llama4Scout
        );
    }

    #[test]
    fn test_unregistered_default_is_skipped() {
        let registry = registry_with(&[ModelId::Llama4Scout]);
        assert_eq!(
            select_model(&registry, None, Some(ModelId::Qwq32b), UseCase::RealTimeChat),
            ModelId::Llama4Scout
        );
    }

    #[test]
    fn test_missing_ladder_uses_real_time_chat() {
        let registry = ModelRegistry::builtin().with_ladder(UseCase::Reranking, vec![]);
        assert_eq!(
            select_model(&registry, None, None, UseCase::Reranking),
            ModelId::Llama33_70bFast
        );
    }

    #[test]
    fn test_nothing_registered_uses_fallback() {
        let registry = registry_with(&[]);
        assert_eq!(
            select_model(&registry, None, None, UseCase::ComplexReasoning),
            FALLBACK_MODEL
        );
    }
}
