use mlua::prelude::*;

use super::{unwrap::param_value_from_value, with_evaluation_state};

use crate::event::EventPayload;

// ---------------------------------------------------------------------------------------------

// Event builder userdata, created by `sound(name)` and `midi(note)`.
//
// Any unknown method sets a parameter with the method's name: `sound("kick"):gain(0.5):n(2)`.
// Setters return the builder, so calls can be chained. `out()` emits the event.
#[derive(Clone, Debug)]
pub(crate) struct EventBuilderUserData {
    pub(crate) payload: EventPayload,
}

impl EventBuilderUserData {
    pub(crate) fn new(payload: EventPayload) -> Self {
        Self { payload }
    }
}

impl LuaUserData for EventBuilderUserData {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("out", |lua, this, ()| {
            with_evaluation_state(lua, |state| state.emissions.push(this.payload.clone()))
        });

        // unknown keys resolve to parameter setters
        methods.add_meta_function(
            LuaMetaMethod::Index,
            |lua, (_this, key): (LuaAnyUserData, String)| {
                lua.create_function(move |_lua, (this, value): (LuaAnyUserData, LuaValue)| {
                    let value = param_value_from_value(&value, &key)?;
                    this.borrow_mut::<EventBuilderUserData>()?
                        .payload
                        .params
                        .insert(key.clone(), value);
                    Ok(this)
                })
            },
        );
    }
}
