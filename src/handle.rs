//! Bound handles: a carrier of bound values paired with the form that
//! reads them.
//!
//! A handle built from a callable holds the callable as its only carrier
//! field and runs a form shared by every callable of the same type. Each
//! combinator asks the form's editor for the derived form and extends the
//! carrier to match, so handles derived the same way share one form.

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use rustc_hash::FxHashMap;

use crate::carrier::{Carrier, CarrierLayout, Species};
use crate::edit::LambdaFormEditor;
use crate::error::InvokeError;
use crate::ir::builtins;
use crate::ir::form::{CustomizationTarget, FormResult, LambdaForm};
use crate::ir::function::{Callable, NamedFunction};
use crate::ir::name::{Argument, Constraint, Name};
use crate::ir::types::{BasicType, MethodType, RichType};
use crate::ir::value::Value;

static DIRECT_FORMS: LazyLock<Mutex<FxHashMap<MethodType, Arc<LambdaForm>>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// `(carrier, args..) -> carrier.field0(args..)` for callables of type `ty`.
fn direct_form(ty: &MethodType) -> Arc<LambdaForm> {
    let mut forms = DIRECT_FORMS.lock().unwrap_or_else(|e| e.into_inner());
    forms
        .entry(ty.clone())
        .or_insert_with(|| {
            let species = Species::of(&[BasicType::Ref]);
            let base = Name::new_parameter(BasicType::Ref, Some(Constraint::Carrier(species.clone())));
            let mut params = vec![base.clone()];
            params.extend(ty.params().iter().map(|&t| Name::new_parameter(t, None)));
            let target = Name::new_application(
                species.getter_function(0),
                [Argument::Name(base)],
            );
            let call = Name::new_application(
                builtins::invoker(ty),
                std::iter::once(Argument::Name(target.clone()))
                    .chain(params[1..].iter().map(Argument::from)),
            );
            let label = format!("invoke_{}", ty.basic_type_signature());
            LambdaForm::from_parts(&label, params, vec![target, call], FormResult::Last)
        })
        .clone()
}

#[derive(Clone)]
pub struct BoundHandle(Arc<HandleInner>);

struct HandleInner {
    ty: MethodType,
    form: Arc<LambdaForm>,
    carrier: Arc<Carrier>,
}

impl BoundHandle {
    /// A handle that calls `target`.
    pub fn new(target: Arc<dyn Callable>) -> BoundHandle {
        let ty = target.method_type().clone();
        let form = direct_form(&ty);
        let carrier = Carrier::new(Species::of(&[BasicType::Ref]), vec![Value::function(target)]);
        Self::from_parts(ty, form, carrier)
    }

    pub fn of_function(function: &NamedFunction) -> BoundHandle {
        Self::new(function.resolve().clone())
    }

    fn from_parts(ty: MethodType, form: Arc<LambdaForm>, carrier: Arc<Carrier>) -> BoundHandle {
        debug_assert_eq!(form.arity(), ty.parameter_count() + 1);
        BoundHandle(Arc::new(HandleInner { ty, form, carrier }))
    }

    pub fn method_type(&self) -> &MethodType {
        &self.0.ty
    }

    pub fn form(&self) -> &Arc<LambdaForm> {
        &self.0.form
    }

    pub fn carrier(&self) -> &Arc<Carrier> {
        &self.0.carrier
    }

    pub fn editor(&self) -> LambdaFormEditor {
        self.0.form.editor()
    }

    /// Calls the handle with `args`, not counting the carrier.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        if args.len() != self.0.ty.parameter_count() {
            return Err(InvokeError::ArityMismatch {
                expected: self.0.ty.parameter_count(),
                found: args.len(),
            });
        }
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(self.0.carrier.to_value());
        full.extend_from_slice(args);
        self.0.form.invoke(&full)
    }

    /// The same handle running a form customized for its carrier.
    pub fn customize(&self) -> BoundHandle {
        let target: CustomizationTarget = self.0.carrier.clone();
        let form = self.0.form.customize(target);
        Self::from_parts(self.0.ty.clone(), form, self.0.carrier.clone())
    }

    fn derive(&self, ty: MethodType, form: Arc<LambdaForm>, carrier: Arc<Carrier>) -> BoundHandle {
        tracing::trace!(from = %self.0.ty, to = %ty, form = %form.label(), "derived handle");
        Self::from_parts(ty, form, carrier)
    }

    fn check_position(&self, pos: usize, count: usize) -> Result<(), InvokeError> {
        if pos < count {
            Ok(())
        } else {
            Err(InvokeError::BadPosition { pos, count })
        }
    }

    fn check_type(&self, index: usize, expected: BasicType, found: BasicType) -> Result<(), InvokeError> {
        if expected == found {
            Ok(())
        } else {
            Err(InvokeError::ArgumentType {
                index,
                expected,
                found,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Combinators
    // -----------------------------------------------------------------------

    /// Fixes argument `pos` to `value`.
    pub fn bind_argument(&self, pos: usize, value: impl Into<Value>) -> Result<BoundHandle, InvokeError> {
        let value = value.into();
        let ty = &self.0.ty;
        self.check_position(pos, ty.parameter_count())?;
        self.check_type(pos, ty.parameter_type(pos), value.basic_type())?;
        let form = self.editor().bind_argument_form(pos + 1);
        let carrier = self.0.carrier.extend(value);
        Ok(self.derive(ty.drop_parameter(pos), form, carrier))
    }

    /// Accepts and ignores an extra argument of type `ty` at `pos`.
    pub fn drop_argument(&self, pos: usize, ty: BasicType) -> Result<BoundHandle, InvokeError> {
        self.check_position(pos, self.0.ty.parameter_count() + 1)?;
        if ty == BasicType::Void {
            return Err(InvokeError::IncompatibleType("cannot drop a void argument".into()));
        }
        let form = self.editor().add_argument_form(pos + 1, ty);
        Ok(self.derive(
            self.0.ty.insert_parameters(pos, &[ty]),
            form,
            self.0.carrier.clone(),
        ))
    }

    /// A handle taking `new_params`; argument `j` of this handle is
    /// incoming argument `reorder[j]`. Incoming arguments that nothing reads
    /// are accepted and ignored.
    pub fn permute_arguments(&self, new_params: &[BasicType], reorder: &[usize]) -> Result<BoundHandle, InvokeError> {
        let ty = &self.0.ty;
        if reorder.len() != ty.parameter_count() {
            return Err(InvokeError::ArityMismatch {
                expected: ty.parameter_count(),
                found: reorder.len(),
            });
        }
        for (j, &i) in reorder.iter().enumerate() {
            self.check_position(i, new_params.len())?;
            self.check_type(j, ty.parameter_type(j), new_params[i])?;
        }
        let mut handle = self.clone();
        let mut reorder = reorder.to_vec();
        for (i, &param) in new_params.iter().enumerate() {
            if !reorder.contains(&i) {
                handle = handle.drop_argument(reorder.len(), param)?;
                reorder.push(i);
            }
        }
        let form = handle.editor().permute_arguments_form(1, &reorder);
        let new_ty = MethodType::new(ty.return_type(), new_params.to_vec());
        Ok(handle.derive(new_ty, form, handle.0.carrier.clone()))
    }

    /// Passes argument `pos` through `filter` first.
    pub fn filter_argument(&self, pos: usize, filter: Arc<dyn Callable>) -> Result<BoundHandle, InvokeError> {
        let ty = &self.0.ty;
        self.check_position(pos, ty.parameter_count())?;
        let ft = filter.method_type().clone();
        if ft.parameter_count() != 1 || ft.return_type() != ty.parameter_type(pos) {
            return Err(InvokeError::IncompatibleType(format!(
                "filter {} cannot feed argument {} of {}",
                ft, pos, ty
            )));
        }
        let form = self.editor().filter_argument_form(pos + 1, ft.parameter_type(0));
        let carrier = self.0.carrier.extend(Value::function(filter));
        Ok(self.derive(ty.change_parameter(pos, ft.parameter_type(0)), form, carrier))
    }

    /// Passes the result through `filter`.
    pub fn filter_return(&self, filter: Arc<dyn Callable>) -> Result<BoundHandle, InvokeError> {
        let ty = &self.0.ty;
        let ft = filter.method_type().clone();
        let expected = match ty.return_type() {
            BasicType::Void => vec![],
            ret => vec![ret],
        };
        if ft.params() != expected.as_slice() {
            return Err(InvokeError::IncompatibleType(format!(
                "filter {} cannot take the result of {}",
                ft, ty
            )));
        }
        let form = self.editor().filter_return_form(ft.return_type(), false);
        let carrier = self.0.carrier.extend(Value::function(filter));
        Ok(self.derive(ty.change_return(ft.return_type()), form, carrier))
    }

    /// Returns the zero of `ret` instead of the result.
    pub fn return_zero(&self, ret: BasicType) -> BoundHandle {
        let form = self.editor().filter_return_form(ret, true);
        self.derive(self.0.ty.change_return(ret), form, self.0.carrier.clone())
    }

    /// Replaces argument `pos` by `collector` applied to new arguments. A
    /// void collector runs for effect and replaces nothing.
    pub fn collect_arguments(&self, pos: usize, collector: Arc<dyn Callable>) -> Result<BoundHandle, InvokeError> {
        let ty = &self.0.ty;
        let ct = collector.method_type().clone();
        let drop_result = ct.return_type() == BasicType::Void;
        let mut new_ty = ty.clone();
        if drop_result {
            self.check_position(pos, ty.parameter_count() + 1)?;
        } else {
            self.check_position(pos, ty.parameter_count())?;
            self.check_type(pos, ty.parameter_type(pos), ct.return_type())?;
            new_ty = new_ty.drop_parameter(pos);
        }
        let form = self.editor().collect_arguments_form(pos + 1, &ct);
        let carrier = self.0.carrier.extend(Value::function(collector));
        Ok(self.derive(new_ty.insert_parameters(pos, ct.params()), form, carrier))
    }

    /// Replaces reference argument `pos` by an array of `count` new
    /// arguments of type `element`.
    pub fn collect_into_array(&self, pos: usize, element: &RichType, count: usize) -> Result<BoundHandle, InvokeError> {
        let ty = &self.0.ty;
        self.check_position(pos, ty.parameter_count())?;
        self.check_type(pos, ty.parameter_type(pos), BasicType::Ref)?;
        match self.editor().collect_argument_array_form(pos + 1, element, count) {
            Some(form) => {
                let elements = vec![element.erase(); count];
                let new_ty = ty.drop_parameter(pos).insert_parameters(pos, &elements);
                Ok(self.derive(new_ty, form, self.0.carrier.clone()))
            }
            None => {
                let constructor = builtins::array_constructor(element, count);
                self.collect_arguments(pos, constructor.resolve().clone())
            }
        }
    }

    /// Calls `combiner` on the arguments after `pos` and, unless it is
    /// void, passes its result as argument `pos`.
    pub fn fold_arguments(&self, pos: usize, combiner: Arc<dyn Callable>) -> Result<BoundHandle, InvokeError> {
        let ty = &self.0.ty;
        let ct = combiner.method_type().clone();
        let drop_result = ct.return_type() == BasicType::Void;
        let first = pos + usize::from(!drop_result);
        if first + ct.parameter_count() > ty.parameter_count() {
            return Err(InvokeError::BadPosition {
                pos,
                count: ty.parameter_count(),
            });
        }
        if !drop_result {
            self.check_type(pos, ty.parameter_type(pos), ct.return_type())?;
        }
        for (i, &param) in ct.params().iter().enumerate() {
            self.check_type(first + i, ty.parameter_type(first + i), param)?;
        }
        let form = self.editor().fold_arguments_form(pos + 1, drop_result, &ct);
        let carrier = self.0.carrier.extend(Value::function(combiner));
        let new_ty = if drop_result { ty.clone() } else { ty.drop_parameter(pos) };
        Ok(self.derive(new_ty, form, carrier))
    }

    /// Replaces arguments `pos..pos + length` of type `element` by one
    /// array argument holding them.
    pub fn spread_arguments(&self, pos: usize, element: &RichType, length: usize) -> Result<BoundHandle, InvokeError> {
        let ty = &self.0.ty;
        if pos + length > ty.parameter_count() {
            return Err(InvokeError::BadPosition {
                pos: pos + length,
                count: ty.parameter_count(),
            });
        }
        for i in pos..pos + length {
            self.check_type(i, ty.parameter_type(i), element.erase())?;
        }
        let form = self.editor().spread_arguments_form(pos + 1, element, length);
        let mut new_ty = ty.clone();
        for _ in 0..length {
            new_ty = new_ty.drop_parameter(pos);
        }
        let new_ty = new_ty.insert_parameters(pos, &[BasicType::Ref]);
        Ok(self.derive(new_ty, form, self.0.carrier.clone()))
    }
}

impl Callable for BoundHandle {
    fn method_type(&self) -> &MethodType {
        &self.0.ty
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        BoundHandle::invoke(self, args)
    }
}

impl fmt::Debug for BoundHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundHandle({}, {:?}, {:?})", self.0.ty, self.0.form, self.0.carrier)
    }
}
