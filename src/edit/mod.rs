//! Cached structural edits of lambda forms.
//!
//! Every recipe follows the same steps: encode the edit as a
//! [`TransformKey`], return the cached result on a hit, otherwise rebuild
//! the names in a [`FormBuffer`] and store the new form. Concurrent callers
//! may build the same form twice, but only one result is ever installed.
//!
//! Positions passed to a recipe are form positions, so parameter 0 is the
//! carrier and the first handle argument is at 1.

pub mod buffer;

use std::sync::Arc;

use crate::cache::{TransformKey, TransformKind};
use crate::carrier::{CarrierLayout, Species};
use crate::ir::builtins;
use crate::ir::form::LambdaForm;
use crate::ir::name::{Argument, Constraint, Name};
use crate::ir::types::{BasicType, MethodType, RichType};

use self::buffer::FormBuffer;

/// Derives new forms from one uncustomized base form.
pub struct LambdaFormEditor {
    form: Arc<LambdaForm>,
}

impl LambdaForm {
    /// An editor over the uncustomized original of this form.
    pub fn editor(self: &Arc<Self>) -> LambdaFormEditor {
        LambdaFormEditor::new(self)
    }
}

impl LambdaFormEditor {
    pub fn new(form: &Arc<LambdaForm>) -> Self {
        LambdaFormEditor {
            form: form.uncustomize(),
        }
    }

    pub fn form(&self) -> &Arc<LambdaForm> {
        &self.form
    }

    // -----------------------------------------------------------------------
    // Cache access
    // -----------------------------------------------------------------------

    fn get_in_cache(&self, key: &TransformKey) -> Option<Arc<LambdaForm>> {
        let hit = self.form.transforms.lookup(key);
        match &hit {
            Some(form) => tracing::trace!(base = %self.form.label(), key = ?key, result = ?form, "transform cache hit"),
            None => tracing::trace!(base = %self.form.label(), key = ?key, "transform cache miss"),
        }
        hit
    }

    fn put_in_cache(&self, key: TransformKey, form: Arc<LambdaForm>) -> Arc<LambdaForm> {
        self.form.transforms.store(key, form)
    }

    /// A cached form must have the shape the edit produces.
    fn check_shape(&self, key: &TransformKey, form: &LambdaForm, arity: usize) {
        if form.arity() != arity {
            panic!(
                "transform cache of {:?} returned {:?} for {:?}: expected arity {}, found {}",
                self.form,
                form,
                key,
                arity,
                form.arity()
            );
        }
    }

    fn old_species(&self) -> Arc<dyn CarrierLayout> {
        match self.form.parameter_constraint(0).and_then(Constraint::carrier_layout) {
            Some(layout) => layout.clone(),
            None => Species::empty(),
        }
    }

    /// Moves the buffer onto a carrier with one more field of type `ty`:
    /// existing field reads switch to the new layout and parameter 0 is
    /// renamed. Returns the new carrier parameter and a read of the new
    /// field.
    fn extend_carrier(&self, buf: &mut FormBuffer, ty: BasicType) -> (Name, Name) {
        let old_data = self.old_species();
        let new_data = old_data.extend_with(ty);
        let old_base = self.form.parameter(0).clone();
        let old_count = old_data.field_count();
        let new_getters = new_data.getter_functions();
        buf.replace_functions(
            &old_data.getter_functions(),
            &new_getters[..old_count],
            std::slice::from_ref(&old_base),
        );
        let new_base = old_base.with_constraint(Some(Constraint::Carrier(new_data.clone())));
        buf.rename_parameter(0, new_base.clone());
        let get_field = Name::new_application(
            new_data.getter_function(old_count),
            [Argument::Name(new_base.clone())],
        );
        (new_base, get_field)
    }

    // -----------------------------------------------------------------------
    // Recipes
    // -----------------------------------------------------------------------

    /// Replaces parameter `pos` by a read of a new last carrier field.
    ///
    /// Binding parameter 0 itself wraps it in a fresh carrier, which is only
    /// possible while the current carrier has no fields.
    pub fn bind_argument_form(&self, pos: usize) -> Arc<LambdaForm> {
        let key = TransformKey::of(TransformKind::BindArg, &[pos]);
        let arity = if pos == 0 {
            self.form.arity()
        } else {
            self.form.arity() - 1
        };
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, arity);
            return form;
        }
        let mut buf = FormBuffer::new(&self.form);
        let bound_type = self.form.parameter_type(pos);

        if pos != 0 {
            let (_, get_field) = self.extend_carrier(&mut buf, bound_type);
            buf.replace_parameter_by_new_expression(pos, get_field);
        } else {
            let old_data = self.old_species();
            assert_eq!(
                old_data.field_count(),
                0,
                "cannot bind the carrier of {:?} into a non-empty carrier",
                self.form
            );
            let new_data = old_data.extend_with(bound_type);
            let new_base = Name::new_parameter(BasicType::Ref, Some(Constraint::Carrier(new_data.clone())));
            let get_field = Name::new_application(
                new_data.getter_function(0),
                [Argument::Name(new_base.clone())],
            );
            buf.replace_parameter_by_new_expression(0, get_field);
            buf.insert_parameter(0, new_base);
        }

        self.put_in_cache(key, buf.end_edit())
    }

    /// Inserts an unused parameter of type `ty` at `pos`.
    pub fn add_argument_form(&self, pos: usize, ty: BasicType) -> Arc<LambdaForm> {
        let key = TransformKey::of(TransformKind::AddArg, &[pos, ty.ordinal()]);
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, self.form.arity() + 1);
            assert_eq!(form.parameter_type(pos), ty, "cached {:?} for {:?}", form, key);
            return form;
        }
        let mut buf = FormBuffer::new(&self.form);
        buf.insert_parameter(pos, Name::new_parameter(ty, None));
        self.put_in_cache(key, buf.end_edit())
    }

    /// Drops parameter `dst`; its uses read parameter `src` instead.
    pub fn dup_argument_form(&self, src: usize, dst: usize) -> Arc<LambdaForm> {
        let key = TransformKey::of(TransformKind::DupArg, &[src, dst]);
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, self.form.arity() - 1);
            return form;
        }
        assert!(
            self.form.parameter_constraint(src).is_none() && self.form.parameter_constraint(dst).is_none(),
            "cannot duplicate a constrained parameter of {:?}",
            self.form
        );
        assert_eq!(
            self.form.parameter_type(src),
            self.form.parameter_type(dst),
            "duplicated parameters of {:?} differ in type",
            self.form
        );
        let mut buf = FormBuffer::new(&self.form);
        buf.replace_parameter_by_copy(dst, src);
        self.put_in_cache(key, buf.end_edit())
    }

    /// Replaces parameters `pos..pos + length` by one array parameter whose
    /// elements are checked for count and loaded in order.
    pub fn spread_arguments_form(&self, pos: usize, element: &RichType, length: usize) -> Arc<LambdaForm> {
        let element_type = element.erase();
        let mut element_key = element_type.ordinal();
        if element_type.basic_class() != *element {
            if let Some(w) = element.wrapper_ordinal().filter(|_| element.is_primitive()) {
                element_key = BasicType::TYPE_LIMIT + w;
            }
        }
        let key = TransformKey::of(TransformKind::SpreadArgs, &[pos, element_key, length]);
        let arity = self.form.arity() - length + 1;
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, arity);
            return form;
        }
        assert!(pos > 0, "cannot spread the carrier");
        assert!(
            pos + length <= self.form.arity(),
            "spread of {} at {} past the parameters of {:?}",
            length,
            pos,
            self.form
        );

        let mut buf = FormBuffer::new(&self.form);
        let spread_param = Name::new_parameter(BasicType::Ref, None);
        let check_spread = Name::new_application(
            builtins::check_spread_argument(),
            [Argument::Name(spread_param.clone()), Argument::from(length as i32)],
        );
        let mut expr_pos = self.form.arity();
        buf.insert_expression(expr_pos, check_spread);
        expr_pos += 1;
        let load = builtins::array_element_getter(element_type);
        for i in 0..length {
            let load_argument = Name::new_application(
                load.clone(),
                [Argument::Name(spread_param.clone()), Argument::from(i as i32)],
            );
            buf.insert_expression(expr_pos + i, load_argument);
            buf.replace_parameter_by_copy(pos + i, expr_pos + i);
        }
        buf.insert_parameter(pos, spread_param);

        self.put_in_cache(key, buf.end_edit())
    }

    /// Feeds new parameters through a collector held in a new carrier
    /// field. The collector's result replaces parameter `pos` unless it is
    /// void. A one-argument collector with a result is a filter.
    pub fn collect_arguments_form(&self, pos: usize, collector_type: &MethodType) -> Arc<LambdaForm> {
        let collector_arity = collector_type.parameter_count();
        let drop_result = collector_type.return_type() == BasicType::Void;
        if collector_arity == 1 && !drop_result {
            return self.filter_argument_form(pos, collector_type.parameter_type(0));
        }
        let kind = if drop_result {
            TransformKind::CollectArgsToVoid
        } else {
            TransformKind::CollectArgs
        };
        let pos = if drop_result && collector_arity == 0 { 1 } else { pos };
        let key = TransformKey::with_bytes(
            kind,
            &[pos, collector_arity],
            &BasicType::ordinals(collector_type.params()),
        );
        if let Some(form) = self.get_in_cache(&key) {
            let arity = self.form.arity() - usize::from(!drop_result) + collector_arity;
            self.check_shape(&key, &form, arity);
            return form;
        }
        let form = self.make_argument_combination_form(pos, collector_type, false, drop_result);
        self.put_in_cache(key, form)
    }

    /// Collects `count` new parameters of `element` into an array that
    /// replaces parameter `pos`. `None` when the element type is not fully
    /// described by its basic type.
    pub fn collect_argument_array_form(
        &self,
        pos: usize,
        element: &RichType,
        count: usize,
    ) -> Option<Arc<LambdaForm>> {
        let arg_type = element.erase();
        let mut arg_key = arg_type.ordinal();
        if arg_type.basic_class() != *element {
            if !element.is_primitive() {
                return None;
            }
            arg_key = BasicType::TYPE_LIMIT + element.wrapper_ordinal()?;
        }
        let key = TransformKey::of(TransformKind::CollectArgsToArray, &[pos, count, arg_key]);
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, self.form.arity() - 1 + count);
            return Some(form);
        }
        assert!(pos > 0, "cannot collect into the carrier");
        assert!(pos < self.form.arity(), "no parameter {} in {:?}", pos, self.form);
        assert_eq!(
            self.form.parameter_type(pos),
            BasicType::Ref,
            "array collected into a non-reference parameter of {:?}",
            self.form
        );

        let mut buf = FormBuffer::new(&self.form);
        let new_params: Vec<Name> = (0..count).map(|i| Name::parameter_at(pos + i, arg_type)).collect();
        let call_combiner = Name::new_application(
            builtins::array_constructor(element, count),
            new_params.iter().map(Argument::from),
        );
        let expr_pos = self.form.arity();
        buf.insert_expression(expr_pos, call_combiner.clone());
        for (i, param) in new_params.into_iter().enumerate() {
            buf.insert_parameter(pos + 1 + i, param);
        }
        debug_assert_eq!(buf.last_index_of(&call_combiner), Some(expr_pos + count));
        buf.replace_parameter_by_copy(pos, expr_pos + count);

        Some(self.put_in_cache(key, buf.end_edit()))
    }

    /// Parameter `pos` becomes type `new_type` and is passed through a
    /// filter held in a new carrier field.
    pub fn filter_argument_form(&self, pos: usize, new_type: BasicType) -> Arc<LambdaForm> {
        let key = TransformKey::of(TransformKind::FilterArg, &[pos, new_type.ordinal()]);
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, self.form.arity());
            assert_eq!(form.parameter_type(pos), new_type, "cached {:?} for {:?}", form, key);
            return form;
        }
        let old_type = self.form.parameter_type(pos);
        let filter_type = MethodType::new(old_type, vec![new_type]);
        let form = self.make_argument_combination_form(pos, &filter_type, false, false);
        self.put_in_cache(key, form)
    }

    /// Calls a combiner held in a new carrier field. Its arguments are
    /// either new parameters inserted at `pos` or, with `keep_arguments`,
    /// the existing parameters after `pos`. Its result replaces parameter
    /// `pos` unless `drop_result`.
    fn make_argument_combination_form(
        &self,
        pos: usize,
        combiner_type: &MethodType,
        keep_arguments: bool,
        drop_result: bool,
    ) -> Arc<LambdaForm> {
        let combiner_arity = combiner_type.parameter_count();
        let result_arity = usize::from(!drop_result);
        assert!(pos > 0, "cannot filter the carrier");
        assert!(
            pos + result_arity + if keep_arguments { combiner_arity } else { 0 } <= self.form.arity(),
            "combiner at {} does not fit the parameters of {:?}",
            pos,
            self.form
        );
        assert!(
            combiner_type.return_type() != BasicType::Void || drop_result,
            "void combiner must drop its result"
        );
        if !drop_result {
            assert_eq!(
                combiner_type.return_type(),
                self.form.parameter_type(pos),
                "combiner result does not match parameter {} of {:?}",
                pos,
                self.form
            );
        }

        let mut buf = FormBuffer::new(&self.form);
        let (_, get_combiner) = self.extend_carrier(&mut buf, BasicType::Ref);

        let new_params: Vec<Name>;
        let combiner_args: Vec<Name>;
        if keep_arguments {
            new_params = Vec::new();
            let start = pos + result_arity;
            combiner_args = buf.names()[start..start + combiner_arity].to_vec();
            for (i, arg) in combiner_args.iter().enumerate() {
                assert_eq!(
                    arg.ty(),
                    combiner_type.parameter_type(i),
                    "kept argument {} does not match the combiner",
                    start + i
                );
            }
        } else {
            new_params = combiner_type
                .params()
                .iter()
                .enumerate()
                .map(|(i, &ty)| Name::parameter_at(pos + i, ty))
                .collect();
            combiner_args = new_params.clone();
        }
        let call_combiner = Name::new_application(
            builtins::invoker(combiner_type),
            std::iter::once(Argument::Name(get_combiner.clone()))
                .chain(combiner_args.iter().map(Argument::from)),
        );

        let expr_pos = self.form.arity();
        buf.insert_expression(expr_pos, get_combiner);
        buf.insert_expression(expr_pos + 1, call_combiner.clone());

        let arg_pos = pos + result_arity;
        let inserted = new_params.len();
        for (i, param) in new_params.into_iter().enumerate() {
            buf.insert_parameter(arg_pos + i, param);
        }
        debug_assert_eq!(buf.last_index_of(&call_combiner), Some(expr_pos + 1 + inserted));
        if !drop_result {
            buf.replace_parameter_by_copy(pos, expr_pos + 1 + inserted);
        }

        buf.end_edit()
    }

    /// Passes the result through a filter held in a new carrier field, or
    /// with `constant_zero` replaces it by the zero of `new_type`.
    pub fn filter_return_form(&self, new_type: BasicType, constant_zero: bool) -> Arc<LambdaForm> {
        let kind = if constant_zero {
            TransformKind::FilterReturnToZero
        } else {
            TransformKind::FilterReturn
        };
        let key = TransformKey::of(kind, &[new_type.ordinal()]);
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, self.form.arity());
            assert_eq!(form.return_type(), new_type, "cached {:?} for {:?}", form, key);
            return form;
        }
        let mut buf = FormBuffer::new(&self.form);
        let mut ins_pos = buf.len();

        let call_filter = if constant_zero {
            (new_type != BasicType::Void).then(|| Name::new_application(builtins::constant_zero(new_type), []))
        } else {
            let (_, get_filter) = self.extend_carrier(&mut buf, BasicType::Ref);
            buf.insert_expression(ins_pos, get_filter.clone());
            ins_pos += 1;
            let old_type = self.form.return_type();
            let call = match buf.result().cloned() {
                Some(result) if old_type != BasicType::Void => Name::new_application(
                    builtins::invoker(&MethodType::new(new_type, vec![old_type])),
                    [Argument::Name(get_filter), Argument::Name(result)],
                ),
                _ => Name::new_application(
                    builtins::invoker(&MethodType::new(new_type, vec![])),
                    [Argument::Name(get_filter)],
                ),
            };
            Some(call)
        };

        if let Some(call) = &call_filter {
            buf.insert_expression(ins_pos, call.clone());
        }
        buf.set_result(call_filter);

        self.put_in_cache(key, buf.end_edit())
    }

    /// Calls a combiner held in a new carrier field on the parameters after
    /// `pos`. Its result fills parameter `pos` unless `drop_result`.
    pub fn fold_arguments_form(&self, pos: usize, drop_result: bool, combiner_type: &MethodType) -> Arc<LambdaForm> {
        let combiner_arity = combiner_type.parameter_count();
        let kind = if drop_result {
            TransformKind::FoldArgsToVoid
        } else {
            TransformKind::FoldArgs
        };
        let key = TransformKey::of(kind, &[pos, combiner_arity]);
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, self.form.arity() - usize::from(!drop_result));
            return form;
        }
        let form = self.make_argument_combination_form(pos, combiner_type, true, drop_result);
        self.put_in_cache(key, form)
    }

    /// Reorders the parameters after `skip`: outgoing parameter `j` reads
    /// incoming parameter `reorder[j]`. Every incoming parameter up to the
    /// largest index in `reorder` must be read. An identity permutation
    /// returns the base form without touching the cache.
    pub fn permute_arguments_form(&self, skip: usize, reorder: &[usize]) -> Arc<LambdaForm> {
        assert_eq!(
            skip + reorder.len(),
            self.form.arity(),
            "reorder does not cover the parameters of {:?}",
            self.form
        );
        let in_count = reorder.iter().map(|&i| i + 1).max().unwrap_or(0);
        if in_count == reorder.len() && reorder.iter().enumerate().all(|(j, &i)| i == j) {
            return self.form.clone();
        }
        let key = TransformKey::of(TransformKind::PermuteArgs, reorder);
        if let Some(form) = self.get_in_cache(&key) {
            self.check_shape(&key, &form, skip + in_count);
            return form;
        }

        let mut types: Vec<Option<BasicType>> = vec![None; in_count];
        for (j, &i) in reorder.iter().enumerate() {
            let ty = self.form.parameter_type(skip + j);
            match types[i] {
                Some(seen) => assert_eq!(seen, ty, "incoming parameter {} read at two types", i),
                None => types[i] = Some(ty),
            }
        }
        let types: Vec<BasicType> = types
            .into_iter()
            .enumerate()
            .map(|(i, ty)| match ty {
                Some(ty) => ty,
                None => panic!("incoming parameter {} is never read", i),
            })
            .collect();

        let form = self.form.permute_arguments(skip, reorder, &types);
        self.put_in_cache(key, form)
    }
}
