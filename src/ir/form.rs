//! Lambda forms: numbered sequences of parameters and applications.
//!
//! A form holds `arity` parameters followed by its temporaries. Every
//! temporary refers only to names at strictly smaller positions, and every
//! name's index equals its position. Construction normalizes the incoming
//! sequence until both hold:
//!
//! 1. each name claims its position, or is cloned at that position if it
//!    already belongs to another form;
//! 2. references to cloned names are rewritten downstream;
//! 3. the leading unconstrained parameters are swapped for the shared
//!    interned ones, and that substitution cascades through the body.
//!
//! Forms never change after construction apart from their transform cache,
//! their invocation counter and their compiled entry point, each of which is
//! internally synchronized.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock, Mutex, OnceLock};

use rustc_hash::FxHashMap;

use crate::cache::TransformCache;
use crate::codegen::invokers::{self, InterpreterEntry};
use crate::codegen::{self, EntryPoint};
use crate::config;
use crate::error::LowerError;
use crate::ir::name::{Constraint, Name, INTERNED_ARGUMENT_LIMIT};
use crate::ir::types::{BasicType, MethodType};
use crate::ir::verify;

/// What a form returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormResult {
    /// Nothing.
    Void,
    /// The last name.
    Last,
    /// The name at this position.
    At(usize),
}

impl From<Option<usize>> for FormResult {
    fn from(index: Option<usize>) -> Self {
        match index {
            Some(i) => FormResult::At(i),
            None => FormResult::Void,
        }
    }
}

/// The value a customized form is specialised for.
pub type CustomizationTarget = Arc<dyn Any + Send + Sync>;

static LABEL_COUNTERS: LazyLock<Mutex<FxHashMap<String, u32>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// Numbers labels per stem when debug labels are enabled: `bind_int`
/// becomes `bind_000_int`, then `bind_001_int`. A label that already
/// carries a number has it replaced, so re-edited forms keep one.
fn fix_label(label: &str) -> String {
    if !config::get().debug_labels {
        return label.to_owned();
    }
    let under = label.find('_').unwrap_or(label.len());
    let stem = &label[..under];
    let ctr = {
        let mut counters = LABEL_COUNTERS.lock().unwrap_or_else(|e| e.into_inner());
        let ctr = counters.entry(stem.to_owned()).or_insert(0);
        let current = *ctr;
        *ctr += 1;
        current
    };
    let mut fixed = format!("{}_{:03}", stem, ctr);
    if under < label.len() {
        let rest = label[under + 1..].trim_start_matches(|c: char| c.is_ascii_digit());
        let rest = rest.strip_prefix('_').unwrap_or(rest);
        if !rest.is_empty() {
            fixed.push('_');
            fixed.push_str(rest);
        }
    }
    fixed
}

pub struct LambdaForm {
    arity: usize,
    result: Option<usize>,
    names: Box<[Name]>,
    label: String,
    force_inline: bool,
    customized: Option<CustomizationTarget>,
    /// The shared form this one was customized from.
    uncustomized: Option<Arc<LambdaForm>>,
    pub(crate) transforms: TransformCache,
    compiled: OnceLock<EntryPoint>,
    compile_lock: Mutex<()>,
    pub(crate) invocation_counter: AtomicU32,
    interpreter_entry: OnceLock<InterpreterEntry>,
}

impl LambdaForm {
    /// Builds and normalizes a form. Panics if the sequence is malformed:
    /// parameters and temporaries interleave, a temporary refers to a name
    /// that is not strictly earlier in the sequence, or the result index is
    /// out of bounds.
    pub fn new(label: &str, arity: usize, names: Vec<Name>, result: FormResult) -> Arc<LambdaForm> {
        Self::with_options(label, arity, names, result, true, None)
    }

    pub fn with_options(
        label: &str,
        arity: usize,
        names: Vec<Name>,
        result: FormResult,
        force_inline: bool,
        customized: Option<CustomizationTarget>,
    ) -> Arc<LambdaForm> {
        Arc::new(Self::assemble(
            fix_label(label),
            arity,
            names,
            result,
            force_inline,
            customized,
            None,
        ))
    }

    /// Builds a form from its parameters and temporaries separately.
    pub fn from_parts(label: &str, params: Vec<Name>, temps: Vec<Name>, result: FormResult) -> Arc<LambdaForm> {
        let arity = params.len();
        let mut names = params;
        names.extend(temps);
        Self::new(label, arity, names, result)
    }

    fn assemble(
        label: String,
        arity: usize,
        mut names: Vec<Name>,
        result: FormResult,
        force_inline: bool,
        customized: Option<CustomizationTarget>,
        uncustomized: Option<Arc<LambdaForm>>,
    ) -> LambdaForm {
        if let Err(e) = verify::check_names_ok(arity, &names) {
            panic!("malformed lambda form '{}': {}", label, e);
        }
        let result = fix_result(result, &names);
        if let Err(e) = verify::check_result(result, &names) {
            panic!("malformed lambda form '{}': {}", label, e);
        }
        let max_out_arity = normalize(arity, &mut names);
        if let Err(e) = verify::check_name_refs(arity, &names) {
            panic!("malformed lambda form '{}': {}", label, e);
        }

        let form = LambdaForm {
            arity,
            result,
            names: names.into_boxed_slice(),
            label,
            force_inline,
            customized,
            uncustomized,
            transforms: TransformCache::new(),
            compiled: OnceLock::new(),
            compile_lock: Mutex::new(()),
            invocation_counter: AtomicU32::new(0),
            interpreter_entry: OnceLock::new(),
        };

        if max_out_arity > config::get().interpreter_arity_limit {
            tracing::debug!(
                form = %form.label,
                max_out_arity,
                "arity above interpreter limit, lowering eagerly"
            );
            form.compile_or_abort();
        }
        form
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn names(&self) -> &[Name] {
        &self.names
    }

    pub fn name(&self, i: usize) -> &Name {
        &self.names[i]
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn force_inline(&self) -> bool {
        self.force_inline
    }

    /// Position of the result name, `None` for void forms.
    pub fn result_index(&self) -> Option<usize> {
        self.result
    }

    pub fn result_name(&self) -> Option<&Name> {
        self.result.map(|r| &self.names[r])
    }

    pub fn return_type(&self) -> BasicType {
        match self.result {
            Some(r) => self.names[r].ty(),
            None => BasicType::Void,
        }
    }

    /// Panics if `n` is not a parameter position.
    pub fn parameter(&self, n: usize) -> &Name {
        assert!(n < self.arity, "parameter {} out of range for arity {}", n, self.arity);
        &self.names[n]
    }

    pub fn parameter_type(&self, n: usize) -> BasicType {
        self.parameter(n).ty()
    }

    pub fn parameter_constraint(&self, n: usize) -> Option<&Constraint> {
        self.parameter(n).constraint()
    }

    pub fn parameter_types(&self) -> Vec<BasicType> {
        self.names[..self.arity].iter().map(Name::ty).collect()
    }

    pub fn expression_count(&self) -> usize {
        self.names.len() - self.arity
    }

    /// True when the form has no temporaries.
    pub fn is_empty_form(&self) -> bool {
        self.names.len() == self.arity
    }

    pub fn method_type(&self) -> MethodType {
        MethodType::new(self.return_type(), self.parameter_types())
    }

    pub fn basic_type_signature(&self) -> String {
        let mut sig = String::with_capacity(self.arity + 2);
        sig.extend(self.names[..self.arity].iter().map(|n| n.ty().char()));
        sig.push('_');
        sig.push(self.return_type().char());
        sig
    }

    /// Whether `n` is one of this form's names (by identity).
    pub fn contains(&self, n: &Name) -> bool {
        match n.index() {
            Some(i) => i < self.names.len() && Name::same(&self.names[i], n),
            None => false,
        }
    }

    /// Position of the last temporary that uses `n`, or `names.len()` if `n`
    /// is the result. `None` when `n` is never used.
    pub fn last_use_index(&self, n: &Name) -> Option<usize> {
        let start = n.index()?;
        if self.result == Some(start) {
            return Some(self.names.len());
        }
        (start + 1..self.names.len())
            .rev()
            .find(|&i| self.names[i].refers_to(n))
    }

    /// How many argument slots, plus the result, refer to `n`.
    pub fn use_count(&self, n: &Name) -> usize {
        let Some(start) = n.index() else {
            return 0;
        };
        let mut count = if self.result == Some(start) { 1 } else { 0 };
        for i in self.arity.max(start + 1)..self.names.len() {
            count += self.names[i].use_count(n);
        }
        count
    }

    // -----------------------------------------------------------------------
    // Customization
    // -----------------------------------------------------------------------

    pub fn customized(&self) -> Option<&CustomizationTarget> {
        self.customized.as_ref()
    }

    pub fn is_customized(&self) -> bool {
        self.customized.is_some()
    }

    /// A copy of this form bound to `target`. The copy keeps this form as its
    /// uncustomized original and inherits its compiled status.
    pub fn customize(self: &Arc<Self>, target: CustomizationTarget) -> Arc<LambdaForm> {
        let original = self.uncustomize();
        let custom = LambdaForm::assemble(
            original.label.clone(),
            original.arity,
            original.names.to_vec(),
            FormResult::from(original.result),
            original.force_inline,
            Some(target),
            Some(original.clone()),
        );
        if original.is_compiled() && config::get().compile_threshold.is_some() {
            custom.compile_or_abort();
        }
        tracing::debug!(form = %original.label, "customized form");
        Arc::new(custom)
    }

    /// The shared original of a customized form, or this form itself.
    pub fn uncustomize(self: &Arc<Self>) -> Arc<LambdaForm> {
        match &self.uncustomized {
            None => self.clone(),
            Some(original) => {
                if self.is_compiled() && config::get().compile_threshold.is_some() {
                    original.compile_or_abort();
                }
                original.clone()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Compilation
    // -----------------------------------------------------------------------

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    pub fn compiled_entry(&self) -> Option<&EntryPoint> {
        self.compiled.get()
    }

    pub fn invocation_count(&self) -> u32 {
        self.invocation_counter.load(Ordering::Relaxed)
    }

    /// Lowers this form with the installed backend, at most once.
    pub fn compile_to_entry_point(&self) -> Result<EntryPoint, LowerError> {
        if let Some(entry) = self.compiled.get() {
            return Ok(entry.clone());
        }
        let _guard = self.compile_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = self.compiled.get() {
            return Ok(entry.clone());
        }
        let signature = self.method_type();
        tracing::debug!(form = %self.label, signature = %signature, "lowering form");
        let entry = codegen::lower(self, &signature)?;
        tracing::debug!(form = %self.label, backend = entry.backend(), "form lowered");
        let _ = self.compiled.set(entry.clone());
        Ok(entry)
    }

    /// Lowering on paths that have no interpreter fallback.
    fn compile_or_abort(&self) {
        if let Err(e) = self.compile_to_entry_point() {
            panic!("cannot lower lambda form '{}': {}", self.label, e);
        }
    }

    /// The registered interpreter entry for this form's signature.
    pub fn interpreter_entry(&self) -> &InterpreterEntry {
        self.interpreter_entry
            .get_or_init(|| invokers::interpreter_entry(&self.basic_type_signature()))
    }

    /// Drops cached transforms whose results have been freed. Returns how
    /// many were dropped.
    pub fn release_unused_transforms(&self) -> usize {
        self.transforms.release_unused()
    }

    pub fn transform_cache(&self) -> &TransformCache {
        &self.transforms
    }

    // -----------------------------------------------------------------------
    // Structural transforms
    // -----------------------------------------------------------------------

    /// A copy with fresh parameters of `types` inserted before parameter
    /// `pos`. The new parameters are unused.
    pub fn add_arguments(&self, pos: usize, types: &[BasicType]) -> Arc<LambdaForm> {
        assert!(pos <= self.arity, "insertion point {} past arity {}", pos, self.arity);
        let inserted = types.len();
        if inserted == 0 {
            return Self::new(&self.label, self.arity, self.names.to_vec(), self.result.into());
        }
        let mut names = Vec::with_capacity(self.names.len() + inserted);
        names.extend_from_slice(&self.names[..pos]);
        names.extend(types.iter().map(|&ty| Name::new_parameter(ty, None)));
        names.extend_from_slice(&self.names[pos..]);
        let result = self.result.map(|r| if r >= pos { r + inserted } else { r });
        Self::new(&self.label, self.arity + inserted, names, result.into())
    }

    /// A copy whose parameters after `skip` are permuted: outgoing parameter
    /// `j` reads incoming parameter `reorder[j]`, and the incoming parameters
    /// have `types`. Incoming parameters no outgoing one reads are
    /// synthesized fresh. An identity permutation returns `self`.
    pub fn permute_arguments(
        self: &Arc<Self>,
        skip: usize,
        reorder: &[usize],
        types: &[BasicType],
    ) -> Arc<LambdaForm> {
        let length = self.names.len();
        let out_args = reorder.len();
        let in_types = types.len();
        assert_eq!(skip + out_args, self.arity, "reorder does not cover the parameters");
        for (j, &i) in reorder.iter().enumerate() {
            assert!(i < in_types, "reorder[{}] = {} out of range", j, i);
            assert_eq!(
                self.names[skip + j].ty(),
                types[i],
                "parameter {} cannot read incoming {} of type {}",
                skip + j,
                i,
                types[i]
            );
        }
        if out_args == in_types && reorder.iter().enumerate().all(|(j, &i)| i == j) {
            return self.clone();
        }

        let pos = reorder
            .iter()
            .enumerate()
            .position(|(j, &i)| i != j)
            .unwrap_or(out_args);
        let body_length = length - self.arity;
        let mut names2: Vec<Option<Name>> = vec![None; length - out_args + in_types];
        for (slot, n) in names2.iter_mut().zip(&self.names[..skip + pos]) {
            *slot = Some(n.clone());
        }
        let len2 = names2.len();
        for (slot, n) in names2[len2 - body_length..]
            .iter_mut()
            .zip(&self.names[self.arity..])
        {
            *slot = Some(n.clone());
        }
        let arity2 = len2 - body_length;
        let result2 = self.result.map(|r| {
            if r < skip {
                r
            } else if r < self.arity {
                reorder[r - skip] + skip
            } else {
                r - self.arity + arity2
            }
        });

        for j in pos..out_args {
            let n = self.names[skip + j].clone();
            let i = reorder[j];
            let n2 = names2[skip + i]
                .get_or_insert_with(|| Name::new_parameter(types[i], None))
                .clone();
            for slot in &mut names2[arity2..] {
                if let Some(m) = slot {
                    *slot = Some(m.replace_argument_occurrences(&n, &n2));
                }
            }
        }
        for (i, slot) in names2.iter_mut().enumerate().take(arity2).skip(skip + pos) {
            if slot.is_none() {
                *slot = Some(Name::argument(i, types[i - skip]));
            }
        }
        for j in self.arity..length {
            let i = j - self.arity + arity2;
            let n = &self.names[j];
            let Some(n2) = names2[i].clone() else { continue };
            if Name::same(n, &n2) {
                continue;
            }
            for slot in &mut names2[i + 1..] {
                if let Some(m) = slot {
                    *slot = Some(m.replace_argument_occurrences(n, &n2));
                }
            }
        }

        let names2: Vec<Name> = names2.into_iter().flatten().collect();
        debug_assert_eq!(names2.len(), len2);
        Self::new(&self.label, arity2, names2, result2.into())
    }
}

/// Resolves `Last` and demotes a void-typed result to no result.
fn fix_result(result: FormResult, names: &[Name]) -> Option<usize> {
    let index = match result {
        FormResult::Void => return None,
        FormResult::Last => names.len().checked_sub(1)?,
        FormResult::At(i) => i,
    };
    match names.get(index) {
        Some(n) if n.ty() == BasicType::Void => None,
        _ => Some(index),
    }
}

/// Gives every name its positional index, cloning names that already sit
/// elsewhere, and interns leading parameters. Returns the largest arity of
/// any applied function.
fn normalize(arity: usize, names: &mut [Name]) -> usize {
    let mut old_names: Option<Vec<Name>> = None;
    let mut changes_start = 0;
    let mut max_out_arity = 0;

    for i in 0..names.len() {
        let n = names[i].clone();
        if !n.init_index(i) {
            if old_names.is_none() {
                old_names = Some(names.to_vec());
                changes_start = i;
            }
            names[i] = n.clone_with_index(i);
        }
        if let Some(f) = n.function() {
            max_out_arity = max_out_arity.max(f.arity());
        }
    }

    if let Some(old) = &old_names {
        let start_fixing = arity.max(changes_start + 1);
        for i in start_fixing..names.len() {
            let fixed = names[i].replace_names(old, names, changes_start, i);
            names[i] = fixed.with_index(i);
        }
    }

    let max_interned = arity.min(INTERNED_ARGUMENT_LIMIT);
    let mut before_intern: Option<Vec<Name>> = None;
    for i in 0..max_interned {
        let n2 = names[i].intern();
        if !Name::same(&names[i], &n2) {
            before_intern.get_or_insert_with(|| names.to_vec());
            names[i] = n2;
        }
    }
    if let Some(old) = &before_intern {
        for j in arity..names.len() {
            let fixed = names[j].replace_names(old, names, 0, j);
            names[j] = fixed.with_index(j);
        }
    }

    max_out_arity
}

/// Structural: the same result slot over equal names. Labels, customization
/// and compiled state are ignored.
impl PartialEq for LambdaForm {
    fn eq(&self, other: &Self) -> bool {
        self.result == other.result && self.names == other.names
    }
}

impl Eq for LambdaForm {}

impl Hash for LambdaForm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.result.hash(state);
        self.names.hash(state);
    }
}

impl fmt::Debug for LambdaForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LambdaForm({}, {})", self.label, self.basic_type_signature())
    }
}

impl fmt::Display for LambdaForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codegen::printer::emit_form_text(self))
    }
}
