use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gufunc_types::{Object, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use thiserror::Error;

use crate::errors::{GufuncError, Result};

/// Failure raised by a kernel body while processing one element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("kernel error: {0}")]
pub struct KernelError(pub String);

impl KernelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Native kernel body: reads its inputs and writes the output operand in place.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<(), KernelError> + Send + Sync>;

/// Object-mode kernel body operating on boxed host values.
pub type ObjectFn = Arc<dyn Fn(&[Object]) -> Result<Object, KernelError> + Send + Sync>;

#[derive(Clone)]
pub enum KernelImpl {
    Native(NativeFn),
    Object(ObjectFn),
}

/// User-supplied element-wise kernel.
#[derive(Clone)]
pub struct KernelBody {
    name: String,
    doc: Option<String>,
    imp: KernelImpl,
}

impl KernelBody {
    pub fn native<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), KernelError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: None,
            imp: KernelImpl::Native(Arc::new(body)),
        }
    }

    pub fn object<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Object]) -> Result<Object, KernelError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: None,
            imp: KernelImpl::Object(Arc::new(body)),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn implementation(&self) -> &KernelImpl {
        &self.imp
    }

    pub fn is_object_mode(&self) -> bool {
        matches!(self.imp, KernelImpl::Object(_))
    }

    /// True when both bodies are clones of the same closure.
    pub fn same_body(&self, other: &KernelBody) -> bool {
        match (&self.imp, &other.imp) {
            (KernelImpl::Native(a), KernelImpl::Native(b)) => Arc::ptr_eq(a, b),
            (KernelImpl::Object(a), KernelImpl::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for KernelBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelBody")
            .field("name", &self.name)
            .field("object_mode", &self.is_object_mode())
            .finish()
    }
}

/// Name-keyed kernel bodies, used to rebuild gufuncs from persisted state.
#[derive(Clone, Default)]
pub struct KernelLibrary {
    inner: Arc<Mutex<HashMap<String, KernelBody>>>,
}

impl KernelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Self {
        static GLOBAL: Lazy<KernelLibrary> = Lazy::new(KernelLibrary::new);
        &GLOBAL
    }

    /// Register `body` under its name.
    ///
    /// Registering a clone of the stored body again is a no-op. A different
    /// body under a taken name is rejected, so persisted state always
    /// rebuilds against the kernel it was saved from.
    pub fn register(&self, body: KernelBody) -> Result<()> {
        let mut kernels = self.inner.lock();
        match kernels.get(body.name()) {
            Some(existing) if existing.same_body(&body) => Ok(()),
            Some(_) => Err(GufuncError::KernelConflict(body.name().to_string())),
            None => {
                kernels.insert(body.name().to_string(), body);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<KernelBody> {
        self.inner.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().contains_key(name)
    }
}
