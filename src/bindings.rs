//! Lua bindings of the time primitives, counters and event builders scripts are evaluated with.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use mlua::prelude::*;

use self::{
    event::EventBuilderUserData,
    unwrap::{
        bad_argument_error, integer_arg, number_array_from_table, positive_number_arg,
        string_from_value, tag_from_value, value_array_from_table,
    },
};

use crate::{
    counter::CounterState,
    event::EventPayload,
    number::NumberExt,
    primitives::{quant, TimePrimitives, MAX_RHYTHM_STEPS},
    universe::{SlotId, LOCAL_SLOT_COUNT},
};

// ---------------------------------------------------------------------------------------------

// private binding impls
mod event;
mod timeout;
mod unwrap;


// internal re-exports
pub(crate) use timeout::LuaTimeoutHook;

// ---------------------------------------------------------------------------------------------

/// Global shared Lua data, unique to each new Lua instance.
#[derive(Debug, Clone)]
pub(crate) struct LuaAppData {
    /// Random number generator, used by `toss`, `rand`, `pick` and our `math.random` impl.
    pub(crate) rand_gen: Xoshiro256PlusPlus,
}

impl LuaAppData {
    fn new(seed: u64) -> Self {
        let rand_gen = Xoshiro256PlusPlus::seed_from_u64(seed);
        Self { rand_gen }
    }
}

// ---------------------------------------------------------------------------------------------

/// Requests a script makes to the scheduler. Applied only when the script succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptRequests {
    /// Local script indices to run after the requesting script, in request order.
    pub scripts: Vec<u8>,
    /// Tempo change to apply at the next tick boundary.
    pub tempo: Option<f64>,
}

/// State of a single, running script evaluation. Installed as Lua app data while a script runs,
/// so the bound functions can only access the evaluated slot's staged state.
#[derive(Debug)]
pub(crate) struct EvaluationState {
    pub(crate) slot: SlotId,
    pub(crate) primitives: TimePrimitives,
    pub(crate) counters: CounterState,
    pub(crate) emissions: Vec<EventPayload>,
    pub(crate) requests: ScriptRequests,
}

impl EvaluationState {
    pub(crate) fn new(slot: SlotId, primitives: TimePrimitives, counters: CounterState) -> Self {
        Self {
            slot,
            primitives,
            counters,
            emissions: Vec::new(),
            requests: ScriptRequests::default(),
        }
    }
}

// Access the state of the running evaluation.
pub(crate) fn with_evaluation_state<R, F: FnOnce(&mut EvaluationState) -> R>(
    lua: &Lua,
    f: F,
) -> LuaResult<R> {
    let mut state = lua.app_data_mut::<EvaluationState>().ok_or_else(|| {
        LuaError::RuntimeError(
            "time functions can only be used while a script is evaluated".to_string(),
        )
    })?;
    Ok(f(&mut state))
}

// Access the primitives of the running evaluation.
fn with_primitives<R, F: FnOnce(&TimePrimitives) -> R>(lua: &Lua, f: F) -> LuaResult<R> {
    with_evaluation_state(lua, |state| f(&state.primitives))
}

// Access the engine's random number generator.
fn with_rand_gen<R, F: FnOnce(&mut Xoshiro256PlusPlus) -> R>(lua: &Lua, f: F) -> LuaResult<R> {
    let mut app_data = lua
        .app_data_mut::<LuaAppData>()
        .ok_or_else(|| LuaError::RuntimeError("Failed to access Lua app data".to_string()))?;
    Ok(f(&mut app_data.rand_gen))
}

// ---------------------------------------------------------------------------------------------

/// Create a new sandboxed lua engine with the math, string and table std libraries and all
/// bindings registered. Also returns a timeout hook instance to limit duration of script calls.
pub(crate) fn new_engine(timeout: Duration, seed: u64) -> LuaResult<(Lua, LuaTimeoutHook)> {
    // create a new lua instance with the allowed std libraries
    let lua = Lua::new_with(
        LuaStdLib::STRING | LuaStdLib::TABLE | LuaStdLib::MATH,
        LuaOptions::default(),
    )?;
    // install a timeout hook
    let timeout_hook = LuaTimeoutHook::new(&lua, timeout);
    // create new app data
    lua.set_app_data(LuaAppData::new(seed));
    // register bindings
    register_bindings(&lua)?;
    Ok((lua, timeout_hook))
}

/// Register all bindings with the given lua engine.
pub(crate) fn register_bindings(lua: &Lua) -> LuaResult<()> {
    register_gate_bindings(lua)?;
    register_oscillator_bindings(lua)?;
    register_random_bindings(lua)?;
    register_transport_bindings(lua)?;
    register_event_bindings(lua)?;
    register_number_bindings(lua)?;
    register_math_bindings(lua)?;
    Ok(())
}

// ---------------------------------------------------------------------------------------------

fn register_gate_bindings(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    // function beat([n])
    globals.raw_set(
        "beat",
        lua.create_function(|lua, n: Option<f64>| -> LuaResult<bool> {
            let n = positive_number_arg(n, 1.0, "beat", "n", 1)?;
            with_primitives(lua, |p| p.beat(n))
        })?,
    )?;

    // function bar([n])
    globals.raw_set(
        "bar",
        lua.create_function(|lua, n: Option<f64>| -> LuaResult<bool> {
            let n = positive_number_arg(n, 1.0, "bar", "n", 1)?;
            with_primitives(lua, |p| p.bar(n))
        })?,
    )?;

    // function pulse_every(n)
    globals.raw_set(
        "pulse_every",
        lua.create_function(|lua, n: LuaInteger| -> LuaResult<bool> {
            let n = integer_arg(n, 1, LuaInteger::MAX, "pulse_every", "n", 1)?;
            with_primitives(lua, |p| p.pulse_every(n as u64))
        })?,
    )?;

    // function rhythm(period, onsets, steps, [offset])
    globals.raw_set(
        "rhythm",
        lua.create_function(
            |lua,
             (period, onsets, steps, offset): (f64, LuaInteger, LuaInteger, Option<LuaInteger>)|
             -> LuaResult<bool> {
                let period = positive_number_arg(Some(period), 1.0, "rhythm", "period", 1)?;
                let onsets = integer_arg(onsets, 0, u32::MAX as LuaInteger, "rhythm", "onsets", 2)?;
                let max_steps = MAX_RHYTHM_STEPS as LuaInteger;
                let steps = integer_arg(steps, 0, max_steps, "rhythm", "steps", 3)?;
                let offset = offset.unwrap_or(0);
                with_primitives(lua, |p| {
                    p.rhythm(period, onsets as u32, steps as u32, offset)
                })
            },
        )?,
    )?;

    // function binrhythm(period, n, [steps])
    globals.raw_set(
        "binrhythm",
        lua.create_function(
            |lua, (period, n, steps): (f64, LuaInteger, Option<LuaInteger>)| -> LuaResult<bool> {
                let period = positive_number_arg(Some(period), 1.0, "binrhythm", "period", 1)?;
                let n = integer_arg(n, 0, LuaInteger::MAX, "binrhythm", "n", 2)?;
                let steps = integer_arg(steps.unwrap_or(8), 1, 64, "binrhythm", "steps", 3)?;
                with_primitives(lua, |p| p.binrhythm(period, n as u64, steps as u32))
            },
        )?,
    )?;

    // function oncount(list, divisor)
    globals.raw_set(
        "oncount",
        lua.create_function(
            |lua, (list, divisor): (LuaTable, f64)| -> LuaResult<bool> {
                let positions = number_array_from_table(&list, "oncount", "list", 1)?;
                let divisor = positive_number_arg(Some(divisor), 1.0, "oncount", "divisor", 2)?;
                with_primitives(lua, |p| p.oncount(&positions, divisor))
            },
        )?,
    )?;

    // function flip(n, [probability])
    globals.raw_set(
        "flip",
        lua.create_function(
            |lua, (n, probability): (f64, Option<f64>)| -> LuaResult<bool> {
                let n = positive_number_arg(Some(n), 1.0, "flip", "n", 1)?;
                let probability = probability.unwrap_or(50.0);
                if !(0.0..=100.0).contains(&probability) {
                    return Err(bad_argument_error(
                        "flip",
                        "probability",
                        2,
                        "probability must be in range [0..=100]",
                    ));
                }
                with_primitives(lua, |p| p.flip(n, probability))
            },
        )?,
    )?;

    Ok(())
}

fn register_oscillator_bindings(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    // function usine([period])
    globals.raw_set(
        "usine",
        lua.create_function(|lua, period: Option<f64>| -> LuaResult<f64> {
            let period = positive_number_arg(period, 1.0, "usine", "period", 1)?;
            with_primitives(lua, |p| p.usine(period))
        })?,
    )?;

    // function utriangle([period])
    globals.raw_set(
        "utriangle",
        lua.create_function(|lua, period: Option<f64>| -> LuaResult<f64> {
            let period = positive_number_arg(period, 1.0, "utriangle", "period", 1)?;
            with_primitives(lua, |p| p.utriangle(period))
        })?,
    )?;

    // function usaw([period])
    globals.raw_set(
        "usaw",
        lua.create_function(|lua, period: Option<f64>| -> LuaResult<f64> {
            let period = positive_number_arg(period, 1.0, "usaw", "period", 1)?;
            with_primitives(lua, |p| p.usaw(period))
        })?,
    )?;

    // function usquare([period], [duty])
    globals.raw_set(
        "usquare",
        lua.create_function(
            |lua, (period, duty): (Option<f64>, Option<f64>)| -> LuaResult<f64> {
                let period = positive_number_arg(period, 1.0, "usquare", "period", 1)?;
                let duty = duty.unwrap_or(0.5);
                if !(0.0..=1.0).contains(&duty) {
                    return Err(bad_argument_error(
                        "usquare",
                        "duty",
                        2,
                        "duty must be in range [0..=1]",
                    ));
                }
                with_primitives(lua, |p| p.usquare(period, duty))
            },
        )?,
    )?;

    // function quant(value, list)
    globals.raw_set(
        "quant",
        lua.create_function(|_lua, (value, list): (f64, LuaTable)| -> LuaResult<f64> {
            let values = number_array_from_table(&list, "quant", "list", 2)?;
            Ok(quant(value, &values))
        })?,
    )?;

    Ok(())
}

fn register_random_bindings(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    // function toss()
    globals.raw_set(
        "toss",
        lua.create_function(|lua, ()| -> LuaResult<bool> {
            with_rand_gen(lua, |rand_gen| rand_gen.random::<bool>())
        })?,
    )?;

    // function rand([min], [max])
    globals.raw_set(
        "rand",
        lua.create_function(|lua, (min, max): (Option<f64>, Option<f64>)| -> LuaResult<f64> {
            let min = min.unwrap_or(0.0);
            let max = max.unwrap_or(1.0);
            if !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(bad_argument_error(
                    "rand",
                    "max",
                    2,
                    "invalid interval: max must be >= min",
                ));
            }
            with_rand_gen(lua, |rand_gen| {
                if min == max {
                    min
                } else {
                    rand_gen.random_range(min..max)
                }
            })
        })?,
    )?;

    // function irand(min, max)
    globals.raw_set(
        "irand",
        lua.create_function(
            |lua, (min, max): (LuaInteger, LuaInteger)| -> LuaResult<LuaInteger> {
                if max < min {
                    return Err(bad_argument_error(
                        "irand",
                        "max",
                        2,
                        "invalid interval: max must be >= min",
                    ));
                }
                with_rand_gen(lua, |rand_gen| rand_gen.random_range(min..=max))
            },
        )?,
    )?;

    // function pick(list) or pick(values...)
    globals.raw_set(
        "pick",
        lua.create_function(|lua, args: LuaMultiValue| -> LuaResult<LuaValue> {
            let mut values = args.into_vec();
            if let [LuaValue::Table(table)] = values.as_slice() {
                let table = table.clone();
                values = value_array_from_table(&table)?;
            }
            if values.is_empty() {
                return Ok(LuaValue::Nil);
            }
            let index = with_rand_gen(lua, |rand_gen| rand_gen.random_range(0..values.len()))?;
            Ok(values.swap_remove(index))
        })?,
    )?;

    Ok(())
}

fn register_transport_bindings(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    // function pulse()
    globals.raw_set(
        "pulse",
        lua.create_function(|lua, ()| -> LuaResult<LuaInteger> {
            with_primitives(lua, |p| p.pulse() as LuaInteger)
        })?,
    )?;

    // function beat_count()
    globals.raw_set(
        "beat_count",
        lua.create_function(|lua, ()| -> LuaResult<LuaInteger> {
            with_primitives(lua, |p| p.snapshot().beat_count() as LuaInteger)
        })?,
    )?;

    // function bar_count()
    globals.raw_set(
        "bar_count",
        lua.create_function(|lua, ()| -> LuaResult<LuaInteger> {
            with_primitives(lua, |p| p.snapshot().bar_count() as LuaInteger)
        })?,
    )?;

    // function ppqn()
    globals.raw_set(
        "ppqn",
        lua.create_function(|lua, ()| -> LuaResult<LuaInteger> {
            with_primitives(lua, |p| p.snapshot().ppqn() as LuaInteger)
        })?,
    )?;

    // function bpm([value])
    globals.raw_set(
        "bpm",
        lua.create_function(|lua, value: Option<f64>| -> LuaResult<f64> {
            match value {
                Some(value) => {
                    let value = positive_number_arg(Some(value), 120.0, "bpm", "value", 1)?;
                    with_evaluation_state(lua, |state| {
                        state.requests.tempo = Some(value);
                        value
                    })
                }
                None => with_primitives(lua, |p| p.snapshot().time_base.beats_per_min),
            }
        })?,
    )?;

    // function cycle_beat(list, [n])
    globals.raw_set(
        "cycle_beat",
        lua.create_function(
            |lua, (list, n): (LuaTable, Option<LuaInteger>)| -> LuaResult<LuaValue> {
                let n = integer_arg(n.unwrap_or(1), 1, LuaInteger::MAX, "cycle_beat", "n", 2)?;
                let values = value_array_from_table(&list)?;
                with_primitives(lua, |p| {
                    p.cycle_beat(&values, n as u64).cloned().unwrap_or(LuaValue::Nil)
                })
            },
        )?,
    )?;

    // function cycle_bar(list, [n])
    globals.raw_set(
        "cycle_bar",
        lua.create_function(
            |lua, (list, n): (LuaTable, Option<LuaInteger>)| -> LuaResult<LuaValue> {
                let n = integer_arg(n.unwrap_or(1), 1, LuaInteger::MAX, "cycle_bar", "n", 2)?;
                let values = value_array_from_table(&list)?;
                with_primitives(lua, |p| {
                    p.cycle_bar(&values, n as u64).cloned().unwrap_or(LuaValue::Nil)
                })
            },
        )?,
    )?;

    // function counter(tag)
    globals.raw_set(
        "counter",
        lua.create_function(|lua, tag: LuaValue| -> LuaResult<LuaInteger> {
            let tag = tag_from_value(&tag, "counter")?;
            with_evaluation_state(lua, |state| state.counters.next(&tag) as LuaInteger)
        })?,
    )?;

    // function script(index...)
    globals.raw_set(
        "script",
        lua.create_function(|lua, indices: LuaVariadic<LuaInteger>| -> LuaResult<()> {
            let indices = indices
                .iter()
                .enumerate()
                .map(|(pos, index)| {
                    integer_arg(*index, 1, LOCAL_SLOT_COUNT as LuaInteger, "script", "index", pos + 1)
                        .map(|index| index as u8)
                })
                .collect::<LuaResult<Vec<_>>>()?;
            with_evaluation_state(lua, |state| state.requests.scripts.extend(indices))
        })?,
    )?;

    // function log(args...)
    globals.raw_set(
        "log",
        lua.create_function(|lua, args: LuaMultiValue| -> LuaResult<()> {
            let message = args
                .iter()
                .map(string_from_value)
                .collect::<LuaResult<Vec<_>>>()?
                .join(" ");
            with_evaluation_state(lua, |state| log::info!("{}: {}", state.slot, message))
        })?,
    )?;

    Ok(())
}

fn register_event_bindings(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    // function sound(name)
    globals.raw_set(
        "sound",
        lua.create_function(|_lua, name: String| -> LuaResult<EventBuilderUserData> {
            Ok(EventBuilderUserData::new(EventPayload::sound(name)))
        })?,
    )?;

    // function midi(note)
    globals.raw_set(
        "midi",
        lua.create_function(|_lua, note: f64| -> LuaResult<EventBuilderUserData> {
            if !(0.0..=127.0).contains(&note) {
                return Err(bad_argument_error(
                    "midi",
                    "note",
                    1,
                    "note must be in range [0..=127]",
                ));
            }
            Ok(EventBuilderUserData::new(EventPayload::midi(note)))
        })?,
    )?;

    Ok(())
}

fn register_number_bindings(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    type MappingArgs = (f64, f64, f64, f64, f64);
    let mappings: [(&str, fn(f64, f64, f64, f64, f64) -> f64); 4] = [
        ("linlin", <f64 as NumberExt>::linlin),
        ("linexp", <f64 as NumberExt>::linexp),
        ("explin", <f64 as NumberExt>::explin),
        ("expexp", <f64 as NumberExt>::expexp),
    ];
    for (name, mapping) in mappings {
        // function linlin(value, in_min, in_max, out_min, out_max) and friends
        globals.raw_set(
            name,
            lua.create_function(
                move |_lua, (value, in_min, in_max, out_min, out_max): MappingArgs| {
                    Ok(mapping(value, in_min, in_max, out_min, out_max))
                },
            )?,
        )?;
    }

    // function lincurve(value, in_min, in_max, out_min, out_max, [curve])
    globals.raw_set(
        "lincurve",
        lua.create_function(
            |_lua,
             (value, in_min, in_max, out_min, out_max, curve): (
                f64,
                f64,
                f64,
                f64,
                f64,
                Option<f64>,
            )| {
                Ok(value.lincurve(in_min, in_max, out_min, out_max, curve.unwrap_or(-4.0)))
            },
        )?,
    )?;

    Ok(())
}

fn register_math_bindings(lua: &Lua) -> LuaResult<()> {
    let math = lua.globals().get::<LuaTable>("math")?;

    // function math.random([min], [max])
    math.raw_set(
        "random",
        lua.create_function(
            |lua, (min, max): (Option<LuaInteger>, Option<LuaInteger>)| -> LuaResult<LuaNumber> {
                match (min, max) {
                    (None, _) => with_rand_gen(lua, |rand_gen| rand_gen.random::<LuaNumber>()),
                    (Some(max), None) => {
                        if max >= 1 {
                            with_rand_gen(lua, |rand_gen| {
                                rand_gen.random_range(1..=max) as LuaNumber
                            })
                        } else {
                            Err(bad_argument_error(
                                "math.random",
                                "max",
                                1,
                                "invalid interval: max must be >= 1",
                            ))
                        }
                    }
                    (Some(min), Some(max)) => {
                        if max >= min {
                            with_rand_gen(lua, |rand_gen| {
                                rand_gen.random_range(min..=max) as LuaNumber
                            })
                        } else {
                            Err(bad_argument_error(
                                "math.random",
                                "max",
                                2,
                                "invalid interval: max must be >= min",
                            ))
                        }
                    }
                }
            },
        )?,
    )?;

    // function math.randomseed(seed)
    math.raw_set(
        "randomseed",
        lua.create_function(|lua, seed: LuaInteger| -> LuaResult<()> {
            with_rand_gen(lua, |rand_gen| {
                *rand_gen = Xoshiro256PlusPlus::seed_from_u64(seed as u64);
            })
        })?,
    )?;

    Ok(())
}
