//! Structural checks for lambda forms.
//!
//! These run on every form the engine builds. A form that fails them is a
//! bug in whatever produced it, so callers turn a [`VerifyError`] into a
//! panic rather than propagating it.

use thiserror::Error;

use crate::ir::name::{Argument, Name};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("arity {arity} exceeds the {len} names of the form")]
    ArityTooLarge { arity: usize, len: usize },

    #[error("slot {index} is {found} but the parameter prefix ends at {arity}")]
    MisplacedName {
        index: usize,
        arity: usize,
        found: String,
    },

    #[error("slot {index} holds {found}, whose index says otherwise")]
    WrongIndex { index: usize, found: String },

    #[error("{user} refers to {target}, which is not an earlier name of this form")]
    IllegalReference { user: String, target: String },

    #[error("result index {result} is out of bounds for {len} names")]
    ResultOutOfBounds { result: usize, len: usize },
}

/// Parameters must form a prefix: every slot below `arity` is a parameter,
/// every slot from `arity` on is an application.
pub fn check_names_ok(arity: usize, names: &[Name]) -> Result<(), VerifyError> {
    if arity > names.len() {
        return Err(VerifyError::ArityTooLarge {
            arity,
            len: names.len(),
        });
    }
    for (i, n) in names.iter().enumerate() {
        if n.is_param() != (i < arity) {
            return Err(VerifyError::MisplacedName {
                index: i,
                arity,
                found: format!("{:?}", n),
            });
        }
    }
    Ok(())
}

/// Every name sits at its own index and refers only to strictly earlier
/// names of the same form.
pub fn check_name_refs(arity: usize, names: &[Name]) -> Result<(), VerifyError> {
    for (i, n) in names.iter().enumerate() {
        if n.index() != Some(i) {
            return Err(VerifyError::WrongIndex {
                index: i,
                found: format!("{:?}", n),
            });
        }
        if i < arity {
            continue;
        }
        for arg in n.arguments() {
            let Argument::Name(target) = arg else {
                continue;
            };
            let legal = match target.index() {
                Some(j) => j < i && Name::same(&names[j], target),
                None => false,
            };
            if !legal {
                return Err(VerifyError::IllegalReference {
                    user: format!("{:?}", n),
                    target: target.to_string(),
                });
            }
        }
    }
    Ok(())
}

pub fn check_result(result: Option<usize>, names: &[Name]) -> Result<(), VerifyError> {
    match result {
        Some(r) if r >= names.len() => Err(VerifyError::ResultOutOfBounds {
            result: r,
            len: names.len(),
        }),
        _ => Ok(()),
    }
}
