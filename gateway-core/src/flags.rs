//! Feature flags with deterministic per-user rollout percentages.

use gateway_config::GatewaySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    AdvancedMemory,
    RealtimeDedup,
    EnhancedPrompts,
    BatchProcessing,
    CircuitBreakers,
}

pub struct FeatureFlags {
    advanced_memory: u8,
    realtime_dedup: u8,
    enhanced_prompts: u8,
    batch_processing: u8,
    circuit_breakers: u8,
}

impl FeatureFlags {
    pub fn new(settings: &GatewaySettings) -> Self {
        Self {
            advanced_memory: settings.rollout_advanced_memory,
            realtime_dedup: settings.rollout_realtime_dedup,
            enhanced_prompts: settings.rollout_enhanced_prompts,
            batch_processing: settings.rollout_batch_processing,
            circuit_breakers: settings.rollout_circuit_breakers,
        }
    }

    fn included(user_id: i64, percentage: u8) -> bool {
        let bucket = user_id.rem_euclid(100);
        bucket < percentage as i64
    }

    pub fn is_enabled(&self, flag: Flag, user_id: i64) -> bool {
        let percentage = match flag {
            Flag::AdvancedMemory => self.advanced_memory,
            Flag::RealtimeDedup => self.realtime_dedup,
            Flag::EnhancedPrompts => self.enhanced_prompts,
            Flag::BatchProcessing => self.batch_processing,
            Flag::CircuitBreakers => self.circuit_breakers,
        };
        Self::included(user_id, percentage)
    }

    /// Requires advanced memory + enhanced prompts + real-time dedup all enabled.
    pub fn full_enhancement(&self, user_id: i64) -> bool {
        self.is_enabled(Flag::AdvancedMemory, user_id)
            && self.is_enabled(Flag::EnhancedPrompts, user_id)
            && self.is_enabled(Flag::RealtimeDedup, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_percent_excludes_everyone() {
        assert!(!FeatureFlags::included(0, 0));
        assert!(!FeatureFlags::included(99, 0));
    }

    #[test]
    fn hundred_percent_includes_everyone() {
        assert!(FeatureFlags::included(0, 100));
        assert!(FeatureFlags::included(99, 100));
    }

    #[test]
    fn decision_is_deterministic_for_same_user() {
        assert_eq!(FeatureFlags::included(42, 50), FeatureFlags::included(42, 50));
    }

    #[test]
    fn bucket_boundary_is_exclusive() {
        // user_id mod 100 == 50 is excluded at 50%, included at 51%.
        assert!(!FeatureFlags::included(150, 50));
        assert!(FeatureFlags::included(150, 51));
    }

    #[test]
    fn full_enhancement_requires_all_three_flags() {
        let flags = FeatureFlags {
            advanced_memory: 100,
            realtime_dedup: 100,
            enhanced_prompts: 0,
            batch_processing: 100,
            circuit_breakers: 100,
        };
        assert!(!flags.full_enhancement(1));
        assert!(flags.is_enabled(Flag::AdvancedMemory, 1));
        assert!(!flags.is_enabled(Flag::EnhancedPrompts, 1));
    }
}
