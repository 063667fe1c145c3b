//! Typing and lowering entry points installed for every gufunc.

use std::sync::{Arc, Weak};

use gufunc_types::{Type, Value};

use super::{Gufunc, GufuncInner};
use crate::codegen::{ArgPattern, CallShape, CallTemplate, FuncDefn, Lowerer};
use crate::errors::{GufuncError, Result};
use crate::runtime::jit::CallSignature;

fn upgrade(inner: &Weak<GufuncInner>) -> Result<Gufunc> {
    inner
        .upgrade()
        .map(|inner| Gufunc { inner })
        .ok_or_else(|| GufuncError::Typing("gufunc has been dropped".into()))
}

pub(super) struct GufuncTemplate {
    pub(super) inner: Weak<GufuncInner>,
}

impl CallTemplate for GufuncTemplate {
    fn generic(&self, argtys: &[Type], kws: &[(String, Type)]) -> Result<CallSignature> {
        upgrade(&self.inner)?.type_call(argtys, kws)
    }
}

pub(super) struct GufuncLowerer {
    pub(super) inner: Weak<GufuncInner>,
}

impl Lowerer for GufuncLowerer {
    fn lower(&self, args: &[Value]) -> Result<Value> {
        upgrade(&self.inner)?.lower_call(args)
    }
}

/// Entry points for both calling forms: every output explicit, or none.
pub(super) fn lowering_defns(gufunc: &Gufunc) -> Vec<FuncDefn> {
    let nin = gufunc.nin();
    let nout = gufunc.nout();
    let lowerer: Arc<dyn Lowerer> = Arc::new(GufuncLowerer {
        inner: Arc::downgrade(&gufunc.inner),
    });

    let mut explicit = vec![ArgPattern::Any; nin];
    explicit.extend(std::iter::repeat_n(ArgPattern::Array, nout));
    let implicit = vec![ArgPattern::Any; nin];

    [explicit, implicit]
        .into_iter()
        .map(|shape| FuncDefn {
            key: gufunc.key().clone(),
            shape: CallShape(shape),
            lowerer: Arc::clone(&lowerer),
        })
        .collect()
}
