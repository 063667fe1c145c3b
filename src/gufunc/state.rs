use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{Identity, TargetOptions};
use crate::errors::{GufuncError, Result};
use crate::runtime::jit::CallSignature;

/// Everything needed to reconstruct a gufunc in another process. The
/// kernel body is referenced by its name in a kernel library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GufuncState {
    pub kernel: String,
    pub signature: String,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub cache: bool,
    pub is_dynamic: bool,
    #[serde(default)]
    pub target_options: TargetOptions,
    #[serde(default)]
    pub writable_args: Vec<usize>,
    #[serde(default)]
    pub typesigs: Vec<CallSignature>,
    #[serde(default)]
    pub frozen: bool,
}

impl GufuncState {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = self.to_yaml()?;
        fs::write(path, text)
            .map_err(|err| GufuncError::Serialization(format!("{}: {err}", path.display())))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| GufuncError::Serialization(format!("{}: {err}", path.display())))?;
        Self::from_yaml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gufunc_types::{ScalarType, Type};

    fn state() -> GufuncState {
        GufuncState {
            kernel: "matvec".into(),
            signature: "(n,m),(m)->(n)".into(),
            identity: Identity::Zero,
            cache: false,
            is_dynamic: true,
            target_options: TargetOptions::default().parallel(true),
            writable_args: vec![],
            typesigs: vec![CallSignature::void(vec![
                Type::array(ScalarType::Float64, 2),
                Type::array(ScalarType::Float64, 1),
                Type::array(ScalarType::Float64, 1),
            ])],
            frozen: true,
        }
    }

    #[test]
    fn yaml_and_json_agree() {
        let state = state();
        let from_yaml = GufuncState::from_yaml(&state.to_yaml().unwrap()).unwrap();
        let from_json = GufuncState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(from_yaml, state);
        assert_eq!(from_json, state);
    }

    #[test]
    fn missing_optional_fields_default() {
        let text = "kernel: dot\nsignature: (n),(n)->()\nis_dynamic: true\n";
        let state = GufuncState::from_yaml(text).unwrap();
        assert_eq!(state.identity, Identity::None);
        assert!(state.typesigs.is_empty());
        assert!(!state.frozen);
    }

    #[test]
    fn malformed_state_is_a_serialization_error() {
        assert!(matches!(
            GufuncState::from_json("{\"kernel\": 3}"),
            Err(GufuncError::Serialization(_))
        ));
    }
}
