//! Construction-time configuration of a discrete space.

use serde::{Deserialize, Serialize};

use crate::dof_error::DofError;

/// Whether DOFs on partition boundaries are shared between processes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Continuity {
    /// Shared sub-entities carry shared DOFs; ownership is voted across ranks.
    #[default]
    Continuous,
    /// DOFs live on elements only; ownership follows the local partition type.
    Discontinuous,
}

/// Parameters of a discrete space: block size, continuity and the tag used
/// when persisting DOF vectors of this space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Human-readable space name.
    pub name: String,
    /// Scalars per DOF block (e.g. vector components per Lagrange point).
    pub block_size: usize,
    /// Ownership rule used by the slave registry.
    pub continuity: Continuity,
    /// Identifier written into persisted DOF vectors.
    pub space_tag: u32,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            name: String::from("space"),
            block_size: 1,
            continuity: Continuity::Continuous,
            space_tag: 0,
        }
    }
}

impl SpaceConfig {
    /// Reject configurations no mapper can be built from.
    pub fn validate(&self) -> Result<(), DofError> {
        if self.block_size == 0 {
            return Err(DofError::InvalidBlockSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_block_size_is_rejected() {
        let cfg = SpaceConfig {
            block_size: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(DofError::InvalidBlockSize));
        assert!(SpaceConfig::default().validate().is_ok());
    }

    #[test]
    fn json_round_trip_fills_defaults() {
        let cfg: SpaceConfig =
            serde_json::from_str(r#"{"name":"velocity","block_size":2,"continuity":"Discontinuous"}"#)
                .unwrap();
        assert_eq!(cfg.block_size, 2);
        assert_eq!(cfg.continuity, Continuity::Discontinuous);
        assert_eq!(cfg.space_tag, 0);
        let back: SpaceConfig = serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(back, cfg);
    }
}
