//! Growable-field carriers for bound values.
//!
//! A [`Carrier`] stores the values a handle has bound so far. Its layout is
//! a [`Species`]: the ordered basic types of its fields, plus one getter
//! function per field. Forms read bound values by applying a getter to the
//! carrier parameter, and reach the layout only through [`CarrierLayout`].

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use rustc_hash::FxHashMap;

use crate::error::InvokeError;
use crate::ir::function::{Intrinsic, MemberName, NamedFunction};
use crate::ir::types::{BasicType, MethodType};
use crate::ir::value::{Ref, Value};

/// The view of a carrier layout the editor works with.
pub trait CarrierLayout: Send + Sync + fmt::Debug {
    fn field_count(&self) -> usize;

    fn field_types(&self) -> &[BasicType];

    /// `(carrier) -> field` for field `index`.
    fn getter_function(&self, index: usize) -> NamedFunction;

    fn getter_functions(&self) -> Vec<NamedFunction> {
        (0..self.field_count()).map(|i| self.getter_function(i)).collect()
    }

    /// The layout with one more field of type `ty` at the end.
    fn extend_with(&self, ty: BasicType) -> Arc<dyn CarrierLayout>;
}

static SPECIES: LazyLock<Mutex<FxHashMap<String, Arc<Species>>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// An interned carrier layout, one per field-type string.
pub struct Species {
    key: String,
    types: Vec<BasicType>,
    getters: Vec<NamedFunction>,
}

impl Species {
    /// The layout for `types`. Equal type lists give the same object.
    pub fn of(types: &[BasicType]) -> Arc<Species> {
        assert!(
            !types.contains(&BasicType::Void),
            "carrier fields cannot be void"
        );
        let key: String = types.iter().map(|t| t.char()).collect();
        let mut table = SPECIES.lock().unwrap_or_else(|e| e.into_inner());
        table
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(species = %key, "new carrier species");
                Arc::new(Species::build(key, types.to_vec()))
            })
            .clone()
    }

    pub fn empty() -> Arc<Species> {
        Self::of(&[])
    }

    fn build(key: String, types: Vec<BasicType>) -> Species {
        let owner = format!("Species_{}", key);
        let getters = types
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                let member = MemberName::new(
                    owner.as_str(),
                    format!("arg{}{}", ty, i),
                    MethodType::new(ty, vec![BasicType::Ref]),
                );
                NamedFunction::intrinsic_fn(member, Intrinsic::FieldGetter, move |args: &[Value]| {
                    read_field(args, i, ty)
                })
            })
            .collect();
        Species {
            key,
            types,
            getters,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn extend(&self, ty: BasicType) -> Arc<Species> {
        let mut types = self.types.clone();
        types.push(ty);
        Species::of(&types)
    }
}

impl CarrierLayout for Species {
    fn field_count(&self) -> usize {
        self.types.len()
    }

    fn field_types(&self) -> &[BasicType] {
        &self.types
    }

    fn getter_function(&self, index: usize) -> NamedFunction {
        self.getters[index].clone()
    }

    fn extend_with(&self, ty: BasicType) -> Arc<dyn CarrierLayout> {
        self.extend(ty)
    }
}

impl fmt::Debug for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Species<{}>", self.key)
    }
}

fn read_field(args: &[Value], index: usize, ty: BasicType) -> Result<Value, InvokeError> {
    let carrier = match args.first() {
        Some(Value::Ref(Ref::Carrier(c))) => c,
        other => {
            return Err(InvokeError::BadCarrier {
                index,
                found: other.map(|v| v.to_string()).unwrap_or_else(|| "nothing".into()),
            })
        }
    };
    match carrier.fields.get(index) {
        Some(v) if v.basic_type() == ty => Ok(v.clone()),
        _ => Err(InvokeError::BadCarrier {
            index,
            found: format!("{:?}", carrier),
        }),
    }
}

// ---------------------------------------------------------------------------
// Carrier
// ---------------------------------------------------------------------------

/// Bound field values laid out by a species.
pub struct Carrier {
    species: Arc<Species>,
    fields: Box<[Value]>,
}

impl Carrier {
    /// Panics if `fields` does not match the species' field types.
    pub fn new(species: Arc<Species>, fields: Vec<Value>) -> Arc<Carrier> {
        let types: Vec<BasicType> = fields.iter().map(Value::basic_type).collect();
        assert_eq!(
            types, species.types,
            "field values do not match {:?}",
            species
        );
        Arc::new(Carrier {
            species,
            fields: fields.into_boxed_slice(),
        })
    }

    pub fn empty() -> Arc<Carrier> {
        Carrier::new(Species::empty(), vec![])
    }

    pub fn species(&self) -> &Arc<Species> {
        &self.species
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    /// A copy with `value` appended as a new last field.
    pub fn extend(&self, value: Value) -> Arc<Carrier> {
        let species = self.species.extend(value.basic_type());
        let mut fields = self.fields.to_vec();
        fields.push(value);
        Carrier::new(species, fields)
    }

    pub fn to_value(self: &Arc<Self>) -> Value {
        Value::Ref(Ref::Carrier(self.clone()))
    }
}

impl fmt::Debug for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.species)?;
        f.debug_list().entries(self.fields.iter()).finish()
    }
}
