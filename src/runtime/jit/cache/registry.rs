use std::collections::HashMap;
use std::sync::Arc;

use gufunc_sig::DimensionSignature;
use gufunc_types::ScalarType;
use tracing::{debug, trace};

use crate::config::TargetOptions;
use crate::errors::Result;
use crate::runtime::jit::artifact::CompiledArtifact;
use crate::runtime::jit::engine::{CompileRequest, KernelCompiler};
use crate::runtime::jit::kernel::KernelBody;
use crate::runtime::jit::specialization::{CallSignature, ElementwiseKey};
use crate::ufunc::loops::{LoopSpec, find_matching_loop};

/// One compiled specialization.
#[derive(Debug, Clone)]
pub struct SpecializationEntry {
    pub signature: CallSignature,
    pub key: ElementwiseKey,
    pub artifact: Arc<CompiledArtifact>,
    nin: usize,
}

impl LoopSpec for SpecializationEntry {
    fn inputs(&self) -> &[ScalarType] {
        &self.key.types()[..self.nin]
    }

    fn outputs(&self) -> &[ScalarType] {
        &self.key.types()[self.nin..]
    }
}

/// Append-only set of compiled specializations for one gufunc, together
/// with the kernel body and configuration new entries are compiled from.
pub struct SpecializationRegistry {
    kernel: KernelBody,
    dims: Arc<DimensionSignature>,
    options: TargetOptions,
    compiler: Arc<dyn KernelCompiler>,
    entries: Vec<SpecializationEntry>,
    by_signature: HashMap<CallSignature, usize>,
    by_key: HashMap<ElementwiseKey, usize>,
    by_inputs: HashMap<ElementwiseKey, usize>,
}

impl SpecializationRegistry {
    pub fn new(
        kernel: KernelBody,
        dims: Arc<DimensionSignature>,
        options: TargetOptions,
        compiler: Arc<dyn KernelCompiler>,
    ) -> Self {
        Self {
            kernel,
            dims,
            options,
            compiler,
            entries: Vec::new(),
            by_signature: HashMap::new(),
            by_key: HashMap::new(),
            by_inputs: HashMap::new(),
        }
    }

    pub fn kernel(&self) -> &KernelBody {
        &self.kernel
    }

    pub fn dims(&self) -> &Arc<DimensionSignature> {
        &self.dims
    }

    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    pub fn compiler(&self) -> &Arc<dyn KernelCompiler> {
        &self.compiler
    }

    pub fn nin(&self) -> usize {
        self.dims.nin()
    }

    /// Exact lookup by element-wise types. The query holds either every
    /// operand or only the inputs.
    pub fn find(&self, ewise: &[ScalarType]) -> Option<&SpecializationEntry> {
        let key = ElementwiseKey::from(ewise);
        let index = if ewise.len() == self.nin() {
            self.by_inputs.get(&key)
        } else {
            self.by_key.get(&key)
        };
        let entry = index.map(|&i| &self.entries[i]);
        if let Some(entry) = entry {
            trace!(kernel = self.kernel.name(), signature = %entry.signature, "registry hit");
        }
        entry
    }

    /// Lookup used once compilation is disabled: select a loop the host
    /// casting rules accept and widen `ewise` to its operand types.
    pub fn find_compatible(
        &self,
        ewise: &[ScalarType],
    ) -> Option<(Vec<ScalarType>, &SpecializationEntry)> {
        let matched = find_matching_loop(&self.entries, self.nin(), ewise)?;
        let mut widened = matched.operand_types();
        widened.truncate(ewise.len());
        let entry = self.find(&widened)?;
        Some((widened, entry))
    }

    pub fn contains(&self, signature: &CallSignature) -> bool {
        self.by_signature.contains_key(signature)
    }

    /// Compile `signature` and store the result.
    ///
    /// A signature that is already present is returned without recompiling.
    /// Compilation errors propagate and leave the registry unchanged.
    pub fn insert(&mut self, signature: CallSignature) -> Result<&SpecializationEntry> {
        if let Some(&index) = self.by_signature.get(&signature) {
            trace!(signature = %signature, "signature already registered");
            return Ok(&self.entries[index]);
        }

        let key = ElementwiseKey::new(signature.elementwise_types()?);
        let artifact = self.compiler.compile(CompileRequest {
            signature: &signature,
            kernel: &self.kernel,
            dims: &self.dims,
            options: &self.options,
        })?;

        let index = self.entries.len();
        let entry = SpecializationEntry {
            artifact: Arc::new(artifact),
            key: key.clone(),
            signature: signature.clone(),
            nin: self.nin(),
        };
        debug!(
            kernel = self.kernel.name(),
            signature = %signature,
            loop_code = %key.loop_code(self.nin()),
            "registered specialization"
        );

        // first registration wins for a given key
        self.by_inputs.entry(key.prefix(self.nin())).or_insert(index);
        self.by_key.entry(key).or_insert(index);
        self.by_signature.insert(signature, index);
        self.entries.push(entry);
        Ok(&self.entries[index])
    }

    pub fn entries(&self) -> &[SpecializationEntry] {
        &self.entries
    }

    pub fn signatures(&self) -> Vec<CallSignature> {
        self.entries.iter().map(|e| e.signature.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
