use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gufunc_types::Type;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;

use crate::errors::{GufuncError, Result};
use crate::runtime::jit::CallSignature;

/// Identity of a callable symbol known to the typing and target contexts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    name: String,
    id: u64,
}

impl FunctionKey {
    /// Allocate a fresh key; two functions with the same name never share one.
    pub fn new(name: impl Into<String>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            name: name.into(),
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Typing rule of a user function: maps argument types at a call site to
/// the call's signature.
pub trait CallTemplate: Send + Sync {
    fn generic(&self, argtys: &[Type], kws: &[(String, Type)]) -> Result<CallSignature>;
}

#[derive(Clone, Default)]
pub struct TypingContext {
    inner: Arc<Mutex<HashMap<FunctionKey, Arc<dyn CallTemplate>>>>,
}

impl TypingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Self {
        static GLOBAL: Lazy<TypingContext> = Lazy::new(TypingContext::new);
        &GLOBAL
    }

    pub fn insert_user_function(&self, key: FunctionKey, template: Arc<dyn CallTemplate>) {
        trace!(function = %key, "installed typing template");
        self.inner.lock().insert(key, template);
    }

    pub fn remove(&self, key: &FunctionKey) {
        self.inner.lock().remove(key);
    }

    pub fn contains(&self, key: &FunctionKey) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Type a call to `key`. The template runs without the context lock held.
    pub fn resolve_function_type(
        &self,
        key: &FunctionKey,
        argtys: &[Type],
        kws: &[(String, Type)],
    ) -> Result<CallSignature> {
        let template = self
            .inner
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| GufuncError::Typing(format!("no typing template for {key}")))?;
        template.generic(argtys, kws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gufunc_types::ScalarType;

    struct Identity;

    impl CallTemplate for Identity {
        fn generic(&self, argtys: &[Type], _kws: &[(String, Type)]) -> Result<CallSignature> {
            Ok(CallSignature::void(argtys.to_vec()))
        }
    }

    #[test]
    fn keys_are_unique_per_function() {
        let a = FunctionKey::new("f");
        let b = FunctionKey::new("f");
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn resolves_installed_template() {
        let ctx = TypingContext::new();
        let key = FunctionKey::new("f");
        ctx.insert_user_function(key.clone(), Arc::new(Identity));

        let argtys = [Type::scalar(ScalarType::Int64)];
        let sig = ctx.resolve_function_type(&key, &argtys, &[]).unwrap();
        assert_eq!(sig.args, argtys.to_vec());

        ctx.remove(&key);
        assert!(matches!(
            ctx.resolve_function_type(&key, &argtys, &[]),
            Err(GufuncError::Typing(_))
        ));
    }
}
