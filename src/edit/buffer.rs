//! Mutable working copy of a form's names.
//!
//! Every structural edit happens here. The buffer starts as a copy of a
//! base form, is rewritten in place, and is closed into a fresh form by
//! [`FormBuffer::end_edit`]; the base form is never touched.
//!
//! Replacing a parameter leaves its slot in the parameter region until the
//! edit ends, so positions handed out earlier in a recipe stay valid. At
//! `end_edit` the parameter region is compacted: slots replaced by a copy of
//! another name disappear, and slots replaced by a new expression move to
//! the front of the body.

use std::sync::Arc;

use crate::ir::form::{FormResult, LambdaForm};
use crate::ir::function::NamedFunction;
use crate::ir::name::{Argument, Name};

pub struct FormBuffer {
    label: String,
    force_inline: bool,
    arity: usize,
    names: Vec<Name>,
    /// Parallel to `names`: slot was replaced by a copy and goes away.
    dropped: Vec<bool>,
    result: Option<Name>,
}

impl FormBuffer {
    pub fn new(form: &LambdaForm) -> Self {
        let names = form.names().to_vec();
        FormBuffer {
            label: form.label().to_owned(),
            force_inline: form.force_inline(),
            arity: form.arity(),
            dropped: vec![false; names.len()],
            result: form.result_name().cloned(),
            names,
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, i: usize) -> &Name {
        &self.names[i]
    }

    pub fn names(&self) -> &[Name] {
        &self.names
    }

    pub fn result(&self) -> Option<&Name> {
        self.result.as_ref()
    }

    /// Last position holding `n` (by identity).
    pub fn last_index_of(&self, n: &Name) -> Option<usize> {
        self.names.iter().rposition(|m| Name::same(m, n))
    }

    pub fn insert_parameter(&mut self, pos: usize, param: Name) {
        assert!(param.is_param(), "not a parameter: {:?}", param);
        assert!(pos <= self.arity, "parameter position {} past arity {}", pos, self.arity);
        self.names.insert(pos, param);
        self.dropped.insert(pos, false);
        self.arity += 1;
    }

    pub fn insert_expression(&mut self, pos: usize, expr: Name) {
        assert!(!expr.is_param(), "not an expression: {:?}", expr);
        assert!(pos >= self.arity, "expression position {} inside the parameters", pos);
        self.names.insert(pos, expr);
        self.dropped.insert(pos, false);
    }

    /// Replaces parameter `pos` by `expr`, which must not already be in the
    /// buffer. Uses of the parameter now use `expr`.
    pub fn replace_parameter_by_new_expression(&mut self, pos: usize, expr: Name) {
        self.check_parameter_slot(pos);
        assert!(!expr.is_param(), "not an expression: {:?}", expr);
        assert!(
            self.last_index_of(&expr).is_none(),
            "{:?} is already in the buffer",
            expr
        );
        let old = std::mem::replace(&mut self.names[pos], expr.clone());
        self.substitute(vec![(old, expr)]);
    }

    /// Drops parameter `pos`; its uses read the name at `value_pos` instead.
    pub fn replace_parameter_by_copy(&mut self, pos: usize, value_pos: usize) {
        self.check_parameter_slot(pos);
        assert_ne!(pos, value_pos, "parameter cannot be a copy of itself");
        let value = self.names[value_pos].clone();
        let old = std::mem::replace(&mut self.names[pos], value.clone());
        self.dropped[pos] = true;
        self.substitute(vec![(old, value)]);
    }

    /// Puts `param` in place of parameter `pos`, rewriting its uses.
    pub fn rename_parameter(&mut self, pos: usize, param: Name) {
        self.check_parameter_slot(pos);
        assert!(param.is_param(), "not a parameter: {:?}", param);
        let old = self.names[pos].clone();
        if Name::same(&old, &param) {
            return;
        }
        self.substitute(vec![(old, param)]);
    }

    /// Rewrites every application of `old[j]` to exactly `for_args` into an
    /// application of `new[j]` to the same arguments.
    pub fn replace_functions(&mut self, old: &[NamedFunction], new: &[NamedFunction], for_args: &[Name]) {
        assert_eq!(old.len(), new.len(), "function lists differ in length");
        let mut subs = Vec::new();
        for n in &self.names[self.arity..] {
            let Some(function) = n.function() else {
                continue;
            };
            let Some(j) = old.iter().position(|f| f == function) else {
                continue;
            };
            let same_args = n.arguments().len() == for_args.len()
                && n.arguments()
                    .iter()
                    .zip(for_args)
                    .all(|(a, b)| matches!(a, Argument::Name(m) if Name::same(m, b)));
            if !same_args {
                continue;
            }
            let replacement = Name::new_application(
                new[j].clone(),
                for_args.iter().map(|a| Argument::Name(a.clone())),
            );
            subs.push((n.clone(), replacement));
        }
        if !subs.is_empty() {
            self.substitute(subs);
        }
    }

    pub fn set_result(&mut self, result: Option<Name>) {
        if let Some(n) = &result {
            assert!(
                self.last_index_of(n).is_some(),
                "result {:?} is not in the buffer",
                n
            );
        }
        self.result = result;
    }

    /// Closes the buffer into a new normalized form.
    pub fn end_edit(self) -> Arc<LambdaForm> {
        let mut params = Vec::with_capacity(self.arity);
        let mut moved = Vec::new();
        for (n, &dropped) in self.names[..self.arity].iter().zip(&self.dropped) {
            if dropped {
                continue;
            }
            if n.is_param() {
                params.push(n.clone());
            } else {
                moved.push(n.clone());
            }
        }
        let arity = params.len();
        let mut names = params;
        names.extend(moved);
        names.extend_from_slice(&self.names[self.arity..]);

        let result = match &self.result {
            Some(r) => match names.iter().position(|n| Name::same(n, r)) {
                Some(i) => FormResult::At(i),
                None => panic!("result {:?} fell out of the edited form", r),
            },
            None => FormResult::Void,
        };
        LambdaForm::with_options(&self.label, arity, names, result, self.force_inline, None)
    }

    fn check_parameter_slot(&self, pos: usize) {
        assert!(pos < self.arity, "position {} is not a parameter slot", pos);
        assert!(
            self.names[pos].is_param() && !self.dropped[pos],
            "slot {} was already replaced",
            pos
        );
    }

    /// Applies `subs` (old, new) to every slot in order. A slot whose name
    /// changes adds its own substitution, so rewrites cascade to later uses.
    fn substitute(&mut self, mut subs: Vec<(Name, Name)>) {
        for m in 0..self.names.len() {
            let current = self.names[m].clone();
            if let Some((_, new)) = subs.iter().find(|(old, _)| Name::same(old, &current)) {
                self.names[m] = new.clone();
                continue;
            }
            let mut updated = current.clone();
            for (old, new) in &subs {
                updated = updated.replace_argument_occurrences(old, new);
            }
            if !Name::same(&updated, &current) {
                self.names[m] = updated.clone();
                subs.push((current, updated));
            }
        }
        if let Some(r) = &self.result {
            if let Some((_, new)) = subs.iter().find(|(old, _)| Name::same(old, r)) {
                self.result = Some(new.clone());
            }
        }
    }
}
