//! 保存周期阶段转换规则: `Idle -> Externalizing -> Saving -> Idle`

use super::types::CyclePhase;
use crate::error::StorageError;
use thiserror::Error;

/// 阶段转换错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid cycle transition from {from:?} to {to:?}")]
    InvalidTransition { from: CyclePhase, to: CyclePhase },
}

impl From<TransitionError> for StorageError {
    fn from(err: TransitionError) -> Self {
        StorageError::ProtocolMisuse(err.to_string())
    }
}

/// 阶段转换验证器
pub struct PhaseTransition;

impl PhaseTransition {
    pub fn validate(from: CyclePhase, to: CyclePhase) -> Result<(), TransitionError> {
        let is_valid = match (from, to) {
            (CyclePhase::Idle, CyclePhase::Externalizing) => true,
            (CyclePhase::Externalizing, CyclePhase::Saving) => true,
            (CyclePhase::Saving, CyclePhase::Idle) => true,

            // start_save 之前丢弃外部化会话
            (CyclePhase::Externalizing, CyclePhase::Idle) => true,

            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    pub fn phase_description(phase: CyclePhase) -> &'static str {
        match phase {
            CyclePhase::Idle => "idle",
            CyclePhase::Externalizing => "collecting component state",
            CyclePhase::Saving => "writing storage units",
        }
    }
}
