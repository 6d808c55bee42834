//! Runs single script slots against a transport snapshot, isolating script failures.

use std::{collections::HashMap, time::Duration};

use mlua::prelude::*;

use crate::{
    bindings::{new_engine, EvaluationState, LuaTimeoutHook, ScriptRequests},
    error::{Error, FaultKind, ScriptFault},
    event::EventPayload,
    primitives::TimePrimitives,
    time::TransportSnapshot,
    universe::{ScriptSlot, SlotId},
};

// -------------------------------------------------------------------------------------------------

/// Result of a successful script evaluation: the emitted events and the requests the script made
/// to the scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub events: Vec<EventPayload>,
    pub requests: ScriptRequests,
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug)]
struct CompiledScript {
    text: String,
    function: LuaFunction,
}

// -------------------------------------------------------------------------------------------------

/// Executes script slots in a sandboxed Lua engine.
///
/// Scripts of a universe share a global environment, so values defined by the universe's `init`
/// script are visible to its other scripts. Compiled scripts are cached per slot and get
/// recompiled when the slot's committed text changes.
///
/// A failing script never affects its slot: the slot's committed text, evaluation count and
/// counters stay untouched and all events the failed run emitted get discarded.
pub struct ScriptEvaluator {
    lua: Lua,
    timeout_hook: LuaTimeoutHook,
    seed: u64,
    environments: HashMap<String, LuaTable>,
    compiled: HashMap<SlotId, CompiledScript>,
}

impl ScriptEvaluator {
    /// Create a new evaluator with the given script timeout and random seed.
    ///
    /// ### Errors
    /// Returns [`Error::Engine`] when the Lua engine can not be set up.
    pub fn new(script_timeout: Duration, seed: u64) -> Result<Self, Error> {
        let (lua, timeout_hook) = new_engine(script_timeout, seed)?;
        Ok(Self {
            lua,
            timeout_hook,
            seed,
            environments: HashMap::new(),
            compiled: HashMap::new(),
        })
    }

    /// The random seed used for latched random functions such as `flip`.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Maximum duration of a single evaluation.
    pub fn script_timeout(&self) -> Duration {
        self.timeout_hook.timeout()
    }

    /// Run the slot's committed text once at the given snapshot.
    ///
    /// On success, the slot's evaluation count gets incremented and its counters changes are
    /// committed. On failure, the slot stays unchanged.
    ///
    /// ### Errors
    /// Returns a [`ScriptFault`] when the script fails to compile, raises an error or times out.
    pub fn evaluate(
        &mut self,
        slot_id: &SlotId,
        slot: &mut ScriptSlot,
        snapshot: TransportSnapshot,
    ) -> Result<Evaluation, ScriptFault> {
        let fault = |kind: FaultKind, err: &LuaError| ScriptFault {
            slot: slot_id.clone(),
            pulse: snapshot.pulse,
            kind,
            message: err.to_string(),
        };

        let function = self
            .compile(slot_id, &slot.committed)
            .map_err(|err| fault(FaultKind::Compile, &err))?;

        // run with a staged copy of the slot's counters
        let state = EvaluationState::new(
            slot_id.clone(),
            TimePrimitives::new(snapshot, self.seed),
            slot.counters.clone(),
        );
        self.lua.set_app_data(state);
        self.timeout_hook.reset();
        let result = function.call::<()>(());
        let state = self.lua.remove_app_data::<EvaluationState>();

        match (result, state) {
            (Ok(()), Some(state)) => {
                slot.counters = state.counters;
                slot.evaluations += 1;
                Ok(Evaluation {
                    events: state.emissions,
                    requests: state.requests,
                })
            }
            (Ok(()), None) => Err(fault(
                FaultKind::Runtime,
                &LuaError::RuntimeError("evaluation state got lost".to_string()),
            )),
            (Err(err), _) => {
                let kind = if self.timeout_hook.timed_out() {
                    FaultKind::Timeout
                } else {
                    FaultKind::Runtime
                };
                Err(fault(kind, &err))
            }
        }
    }

    /// Drop the shared globals and compiled scripts of a universe, e.g. after it got reset or
    /// deleted.
    pub fn reset_universe(&mut self, universe: &str) {
        self.environments.remove(universe);
        self.compiled.retain(|slot, _| slot.universe != universe);
    }

    /// Drop all shared globals and compiled scripts.
    pub fn reset_all(&mut self) {
        self.environments.clear();
        self.compiled.clear();
    }

    /// Drop the compiled script of a single slot.
    pub fn forget(&mut self, slot_id: &SlotId) {
        self.compiled.remove(slot_id);
    }

    // Get or create the shared global environment of a universe. Lookups fall back to the
    // Lua globals, assignments stay in the universe's table.
    fn environment(&mut self, universe: &str) -> LuaResult<LuaTable> {
        if let Some(environment) = self.environments.get(universe) {
            return Ok(environment.clone());
        }
        let environment = self.lua.create_table()?;
        let metatable = self.lua.create_table()?;
        metatable.raw_set("__index", self.lua.globals())?;
        environment.set_metatable(Some(metatable));
        self.environments
            .insert(universe.to_string(), environment.clone());
        Ok(environment)
    }

    // Get the cached function for the slot, or compile the given text.
    fn compile(&mut self, slot_id: &SlotId, text: &str) -> LuaResult<LuaFunction> {
        if let Some(compiled) = self.compiled.get(slot_id) {
            if compiled.text == text {
                return Ok(compiled.function.clone());
            }
        }
        let environment = self.environment(&slot_id.universe)?;
        let function = self
            .lua
            .load(text)
            .set_name(slot_id.to_string())
            .set_environment(environment)
            .into_function()?;
        self.compiled.insert(
            slot_id.clone(),
            CompiledScript {
                text: text.to_string(),
                function: function.clone(),
            },
        );
        Ok(function)
    }
}

impl std::fmt::Debug for ScriptEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEvaluator")
            .field("seed", &self.seed)
            .field("script_timeout", &self.timeout_hook.timeout())
            .field("compiled", &self.compiled.len())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------
