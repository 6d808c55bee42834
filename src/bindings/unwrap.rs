use std::sync::Arc;

use mlua::prelude::*;

use crate::event::ParamValue;

// ---------------------------------------------------------------------------------------------

// Error helpers
pub(crate) fn bad_argument_error<S1: Into<Option<&'static str>>, S2: Into<Option<&'static str>>>(
    func: S1,
    arg: S2,
    pos: usize,
    message: &str,
) -> LuaError {
    LuaError::BadArgument {
        to: func.into().map(String::from),
        name: arg.into().map(String::from),
        pos,
        cause: Arc::new(LuaError::RuntimeError(message.to_string())),
    }
}

// ---------------------------------------------------------------------------------------------

// Unwrap an optional positive, finite number argument, falling back to the given default.
pub(crate) fn positive_number_arg(
    value: Option<f64>,
    default: f64,
    func: &'static str,
    arg: &'static str,
    pos: usize,
) -> LuaResult<f64> {
    let value = value.unwrap_or(default);
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(bad_argument_error(
            func,
            arg,
            pos,
            &format!("{arg} must be a positive number, but is '{value}'"),
        ))
    }
}

// Unwrap an integer argument in the given inclusive range.
pub(crate) fn integer_arg(
    value: LuaInteger,
    min: LuaInteger,
    max: LuaInteger,
    func: &'static str,
    arg: &'static str,
    pos: usize,
) -> LuaResult<LuaInteger> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(bad_argument_error(
            func,
            arg,
            pos,
            &format!("{arg} must be in range [{min}..={max}], but is '{value}'"),
        ))
    }
}

// Convert a Lua sequence of numbers to a number vector.
pub(crate) fn number_array_from_table(
    table: &LuaTable,
    func: &'static str,
    arg: &'static str,
    pos: usize,
) -> LuaResult<Vec<f64>> {
    table
        .clone()
        .sequence_values::<f64>()
        .collect::<LuaResult<Vec<f64>>>()
        .map_err(|err| {
            bad_argument_error(func, arg, pos, &format!("expecting an array of numbers: {err}"))
        })
}

// Convert a Lua sequence to a value vector.
pub(crate) fn value_array_from_table(table: &LuaTable) -> LuaResult<Vec<LuaValue>> {
    table.clone().sequence_values::<LuaValue>().collect()
}

// Convert a string or number counter tag to its string representation.
pub(crate) fn tag_from_value(value: &LuaValue, func: &'static str) -> LuaResult<String> {
    match value {
        LuaValue::String(string) => Ok(string.to_string_lossy().to_string()),
        LuaValue::Integer(integer) => Ok(integer.to_string()),
        LuaValue::Number(number) => Ok(number.to_string()),
        _ => Err(bad_argument_error(
            func,
            "tag",
            1,
            &format!(
                "expecting a string or number tag, but got a '{}'",
                value.type_name()
            ),
        )),
    }
}

// Convert a Lua value to an event parameter value.
pub(crate) fn param_value_from_value(value: &LuaValue, name: &str) -> LuaResult<ParamValue> {
    match value {
        LuaValue::Integer(integer) => Ok(ParamValue::Number(*integer as f64)),
        LuaValue::Number(number) => Ok(ParamValue::Number(*number)),
        LuaValue::String(string) => Ok(ParamValue::Text(string.to_string_lossy().to_string())),
        LuaValue::Boolean(flag) => Ok(ParamValue::Flag(*flag)),
        _ => Err(LuaError::RuntimeError(format!(
            "invalid value for event parameter '{name}': expecting a number, string or \
             boolean, but got a '{}'",
            value.type_name()
        ))),
    }
}

// Convert a Lua value to a printable string, as done by Lua's `tostring`.
pub(crate) fn string_from_value(value: &LuaValue) -> LuaResult<String> {
    match value {
        LuaValue::String(string) => Ok(string.to_string_lossy().to_string()),
        _ => value.to_string(),
    }
}

// --------------------------------------------------------------------------------------------------
