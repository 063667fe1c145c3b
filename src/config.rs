use serde::{Deserialize, Serialize};

/// Options forwarded to the kernel compiler and the broadcasting loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetOptions {
    /// Refuse object-mode kernels.
    pub nopython: bool,
    /// Compile every kernel under the object calling convention.
    pub forceobj: bool,
    /// Check operand core shapes before each kernel invocation.
    pub boundscheck: bool,
    /// Run outer loop iterations on the rayon pool.
    pub parallel: bool,
}

impl TargetOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(val) = std::env::var("DYNGUFUNC_FORCEOBJ") {
            options.forceobj = parse_flag(&val).unwrap_or(false);
        }
        if let Ok(val) = std::env::var("DYNGUFUNC_PARALLEL") {
            options.parallel = parse_flag(&val).unwrap_or(false);
        }
        if let Ok(val) = std::env::var("DYNGUFUNC_BOUNDSCHECK") {
            options.boundscheck = parse_flag(&val).unwrap_or(false);
        }
        options
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn nopython(mut self, enabled: bool) -> Self {
        self.nopython = enabled;
        self
    }

    pub fn forceobj(mut self, enabled: bool) -> Self {
        self.forceobj = enabled;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn boundscheck(mut self, enabled: bool) -> Self {
        self.boundscheck = enabled;
        self
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Identity element reported by the aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Zero,
    One,
    MinusOne,
    ReorderableNone,
    #[default]
    None,
}
