//! Value conversions shared by the metre and note bindings.
//!
//! Scripts pass metres as strings or nested arrays, notes as names or MIDI
//! numbers and options as object maps. This module turns those into the
//! scheduler's types and registers the `ratio` value type.

use super::script_error;
use crate::error::Error;
use crate::performer::SoundOptions;
use crate::rational::RationalDuration;
use crate::tree::{MetreNode, MetreSpec};
use rhai::{Dynamic, Engine, EvalAltResult, Map};

/// Register helper functions with the Rhai engine.
pub fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<RationalDuration>("Ratio")
        .register_fn("ratio", ratio)
        .register_fn("to_string", |r: &mut RationalDuration| r.to_string())
        .register_fn("to_debug", |r: &mut RationalDuration| r.to_string())
        .register_fn("to_float", |r: &mut RationalDuration| r.to_f64())
        .register_fn("+", |a: RationalDuration, b: RationalDuration| a + b)
        .register_fn("-", |a: RationalDuration, b: RationalDuration| a - b)
        .register_fn("*", |a: RationalDuration, b: i64| &a * b)
        .register_fn("==", |a: RationalDuration, b: RationalDuration| a == b)
        .register_fn("!=", |a: RationalDuration, b: RationalDuration| a != b)
        .register_fn("<", |a: RationalDuration, b: RationalDuration| a < b)
        .register_fn(">", |a: RationalDuration, b: RationalDuration| a > b);
}

/// Exact fraction `numer/denom`.
///
/// # Example
/// ```rhai
/// use_metre([[ratio(1, 2), ratio(1, 2)], [ratio(1, 2), ratio(1, 2)]]);
/// ```
pub fn ratio(numer: i64, denom: i64) -> Result<RationalDuration, Box<EvalAltResult>> {
    RationalDuration::new(numer, denom)
        .ok_or_else(|| script_error(format!("ratio {}/{} has a zero denominator", numer, denom)))
}

/// Interpret a script value as a metre: a preset or bracket string, or a
/// nested array of weights.
pub fn metre_spec(value: &Dynamic) -> Result<MetreSpec, Error> {
    if value.is_string() {
        let text = value.clone().into_string().unwrap_or_default();
        return text.parse();
    }
    if value.is_array() {
        let entries = value
            .clone()
            .into_array()
            .map_err(|t| Error::MalformedMetre(format!("expected an array, got {}", t)))?;
        return entries
            .iter()
            .map(metre_node)
            .collect::<Result<Vec<_>, _>>()
            .map(MetreSpec::Nested);
    }
    Err(Error::MalformedMetre(format!(
        "a metre must be a string or an array, got {}",
        value.type_name()
    )))
}

fn metre_node(value: &Dynamic) -> Result<MetreNode, Error> {
    if value.is_array() {
        let children = value
            .clone()
            .into_array()
            .map_err(|t| Error::MalformedMetre(format!("expected an array, got {}", t)))?;
        return children
            .iter()
            .map(metre_node)
            .collect::<Result<Vec<_>, _>>()
            .map(MetreNode::Group);
    }
    if let Some(ratio) = value.clone().try_cast::<RationalDuration>() {
        return Ok(MetreNode::Leaf(ratio));
    }
    if let Ok(int) = value.as_int() {
        return Ok(MetreNode::Leaf(RationalDuration::from_integer(int)));
    }
    if let Ok(float) = value.as_float() {
        return RationalDuration::from_f64(float)
            .map(MetreNode::Leaf)
            .ok_or_else(|| Error::MalformedMetre(format!("weight {} is not a usable number", float)));
    }
    if value.is_string() {
        let text = value.clone().into_string().unwrap_or_default();
        return text
            .parse::<RationalDuration>()
            .map(MetreNode::Leaf)
            .map_err(|e| Error::MalformedMetre(e.to_string()));
    }
    Err(Error::MalformedMetre(format!(
        "unsupported weight of type {}",
        value.type_name()
    )))
}

/// A note given as a name (`"C4"`, `":C4"`) or a MIDI number.
pub fn note_name(value: &Dynamic) -> Result<String, Box<EvalAltResult>> {
    if value.is_string() {
        let text = value.clone().into_string().unwrap_or_default();
        return Ok(text.trim_start_matches(':').to_string());
    }
    if let Ok(midi) = value.as_int() {
        return Ok(midi.to_string());
    }
    if let Ok(midi) = value.as_float() {
        return Ok(midi.to_string());
    }
    Err(script_error(format!(
        "a note must be a string or a number, got {}",
        value.type_name()
    )))
}

/// Numeric options from an object map.
pub fn sound_options(map: &Map) -> Result<SoundOptions, Box<EvalAltResult>> {
    map.iter()
        .map(|(key, value)| {
            let number = value
                .as_float()
                .or_else(|_| value.as_int().map(|i| i as f64))
                .map_err(|t| script_error(format!("option '{}' must be a number, got {}", key, t)))?;
            Ok((key.to_string(), number))
        })
        .collect()
}
