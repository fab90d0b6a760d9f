//! Lambda form pretty-printer.
//!
//! Output is deterministic: parameters in order, then one line per
//! temporary, then the result.
//!
//! ```text
//! add=Lambda(a0:L,a1:I,a2:I)=>{
//!     t3:I=Math.add(a1:I,a2:I);
//!     t3:I}
//! ```

use std::fmt::{self, Write};

use crate::ir::form::LambdaForm;

/// Emits a text dump of `form`.
pub fn emit_form_text(form: &LambdaForm) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_form(&mut out, form);
    out
}

fn write_form(out: &mut String, form: &LambdaForm) -> fmt::Result {
    write!(out, "{}=Lambda(", form.label())?;
    for (i, param) in form.names()[..form.arity()].iter().enumerate() {
        if i > 0 {
            write!(out, ",")?;
        }
        write!(out, "{:?}", param)?;
    }
    write!(out, ")=>{{")?;
    for name in &form.names()[form.arity()..] {
        write!(out, "\n    {:?};", name)?;
    }
    if form.arity() == form.names().len() {
        write!(out, " ")?;
    } else {
        write!(out, "\n    ")?;
    }
    match form.result_name() {
        Some(n) => write!(out, "{}", n)?,
        None => write!(out, "void")?,
    }
    write!(out, "}}")?;
    if form.is_customized() {
        write!(out, "&")?;
    }
    if form.is_compiled() {
        write!(out, " [compiled]")?;
    }
    Ok(())
}
