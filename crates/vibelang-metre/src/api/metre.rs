//! Metre and bar functions for Rhai scripts.
//!
//! Scoped forms take a closure as their block:
//!
//! ```rhai
//! use_metre("4/4", "triplet_swing");
//! bar(|| {
//!     add_note("C4", 1, 1);
//!     add_note("D4", 0, 3);
//! });
//! ```

use super::helpers::metre_spec;
use super::require_performer;
use crate::error::Error;
use crate::schedule;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, NativeCallContext};

const USE_METRE_BLOCK: &str = "use_metre does not work with a block. Perhaps you meant with_metre";
const WITH_METRE_NO_BLOCK: &str =
    "with_metre must be called with a do/end block. Perhaps you meant use_metre";
const BAR_NO_BLOCK: &str = "bar must be called with a block";

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Register metre functions with the Rhai engine.
pub fn register(engine: &mut Engine) {
    engine.register_fn("use_metre", use_metre);
    engine.register_fn("use_metre", use_metre_styled);
    engine.register_fn("use_metre", |_: Dynamic, _: FnPtr| -> ScriptResult<()> {
        Err(Error::BlockMisuse(USE_METRE_BLOCK.to_string()).into())
    });
    engine.register_fn(
        "use_metre",
        |_: Dynamic, _: ImmutableString, _: FnPtr| -> ScriptResult<()> {
            Err(Error::BlockMisuse(USE_METRE_BLOCK.to_string()).into())
        },
    );

    engine.register_fn("with_metre", with_metre);
    engine.register_fn("with_metre", with_metre_styled);
    engine.register_fn("with_metre", |_: Dynamic| -> ScriptResult<()> {
        Err(Error::BlockMisuse(WITH_METRE_NO_BLOCK.to_string()).into())
    });
    engine.register_fn(
        "with_metre",
        |_: Dynamic, _: ImmutableString| -> ScriptResult<()> {
            Err(Error::BlockMisuse(WITH_METRE_NO_BLOCK.to_string()).into())
        },
    );

    engine.register_fn("bar", bar);
    engine.register_fn("bar", || -> ScriptResult<()> {
        Err(Error::BlockMisuse(BAR_NO_BLOCK.to_string()).into())
    });

    engine.register_fn("wait_for_downbeat", wait_for_downbeat);
    engine.register_fn("current_metre", current_metre);
    engine.register_fn("bar_offset", bar_offset);
}

/// Set the metre for the rest of this thread.
///
/// # Example
/// ```rhai
/// use_metre("3/4");
/// use_metre([[0.5, 0.5], [0.5, 0.5, 0.5]]);
/// ```
pub fn use_metre(spec: Dynamic) -> ScriptResult<()> {
    let performer = require_performer()?;
    schedule::use_metre(performer.as_ref(), &metre_spec(&spec)?, None)?;
    Ok(())
}

/// Set the metre with a micro-timing style.
///
/// # Example
/// ```rhai
/// use_metre("3/4", "viennese_waltz");
/// ```
pub fn use_metre_styled(spec: Dynamic, style: ImmutableString) -> ScriptResult<()> {
    let performer = require_performer()?;
    schedule::use_metre(performer.as_ref(), &metre_spec(&spec)?, Some(style.as_str()))?;
    Ok(())
}

/// Run `block` under a metre; the previous metre comes back afterwards.
pub fn with_metre(ctx: NativeCallContext, spec: Dynamic, block: FnPtr) -> ScriptResult<Dynamic> {
    let performer = require_performer()?;
    let spec = metre_spec(&spec)?;
    schedule::with_metre(performer.as_ref(), &spec, None, || {
        block.call_within_context::<Dynamic>(&ctx, ())
    })
}

pub fn with_metre_styled(
    ctx: NativeCallContext,
    spec: Dynamic,
    style: ImmutableString,
    block: FnPtr,
) -> ScriptResult<Dynamic> {
    let performer = require_performer()?;
    let spec = metre_spec(&spec)?;
    schedule::with_metre(performer.as_ref(), &spec, Some(style.as_str()), || {
        block.call_within_context::<Dynamic>(&ctx, ())
    })
}

/// Fill one bar; unused time at the end is slept through.
pub fn bar(ctx: NativeCallContext, block: FnPtr) -> ScriptResult<Dynamic> {
    let performer = require_performer()?;
    schedule::bar(performer.as_ref(), || {
        block.call_within_context::<Dynamic>(&ctx, ())
    })
}

/// Sleep until the next shared downbeat. Returns the beats waited.
pub fn wait_for_downbeat() -> ScriptResult<f64> {
    let performer = require_performer()?;
    Ok(schedule::wait_for_downbeat(performer.as_ref())?)
}

/// The current metre as text, or `()` if none is set.
pub fn current_metre() -> Dynamic {
    schedule::current_metre()
        .map(|metre| Dynamic::from(metre.to_string()))
        .unwrap_or(Dynamic::UNIT)
}

/// Position in the open bar as a ratio, or `()` outside a bar.
pub fn bar_offset() -> Dynamic {
    schedule::bar_offset()
        .map(Dynamic::from)
        .unwrap_or(Dynamic::UNIT)
}
