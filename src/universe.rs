//! Named collections of scripts and their persisted layout.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{counter::CounterState, error::Error};

// -------------------------------------------------------------------------------------------------

/// Number of local script slots in a universe.
pub const LOCAL_SLOT_COUNT: usize = 16;

/// Name of the universe that is selected initially and after the selected one got deleted.
pub const DEFAULT_UNIVERSE: &str = "Default";

// -------------------------------------------------------------------------------------------------

/// Kind and, for local scripts, index of a script slot within a universe.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKind {
    #[display("global")]
    Global,
    #[display("init")]
    Init,
    #[display("notes")]
    Notes,
    /// Local script with an index in range `1..=16`.
    #[display("local {_0}")]
    Local(u8),
}

impl SlotKind {
    /// Create a local slot kind, validating its index.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] when the index is not in range `1..=16`.
    pub fn local(index: usize) -> Result<Self, Error> {
        if (1..=LOCAL_SLOT_COUNT).contains(&index) {
            Ok(Self::Local(index as u8))
        } else {
            Err(Error::InvalidSlot(index))
        }
    }

    /// Check the index of local slot kinds, which may have been constructed directly.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] when a local index is not in range `1..=16`.
    pub fn validate(self) -> Result<Self, Error> {
        match self {
            Self::Local(index) => Self::local(index as usize),
            kind => Ok(kind),
        }
    }

    /// Notes are plain text and never get evaluated.
    pub fn is_executable(&self) -> bool {
        !matches!(self, Self::Notes)
    }
}

/// Identity of a script slot: the owning universe's name and the slot within it.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{universe}/{kind}")]
pub struct SlotId {
    pub universe: String,
    pub kind: SlotKind,
}

impl SlotId {
    pub fn new<S: Into<String>>(universe: S, kind: SlotKind) -> Self {
        Self {
            universe: universe.into(),
            kind,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A single script: the text that is being edited, the text that got submitted for execution and
/// the number of successful evaluations of the committed text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptSlot {
    pub candidate: String,
    pub committed: String,
    pub evaluations: u64,
    /// Counters of the slot. They live as long as the slot, but are not persisted.
    #[serde(skip)]
    pub counters: CounterState,
}

impl ScriptSlot {
    /// Create a new slot with the given text as candidate and committed text.
    pub fn with_text<S: Into<String>>(text: S) -> Self {
        let text = text.into();
        Self {
            candidate: text.clone(),
            committed: text,
            ..Self::default()
        }
    }

    /// Make the candidate text eligible for the next evaluation.
    pub fn commit(&mut self) {
        self.committed.clone_from(&self.candidate);
    }

    /// True when there's nothing to evaluate.
    pub fn is_blank(&self) -> bool {
        self.committed.trim().is_empty()
    }
}

// -------------------------------------------------------------------------------------------------

/// A named collection of scripts: the global, init and notes slots plus 16 local slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub global: ScriptSlot,
    pub init: ScriptSlot,
    pub notes: ScriptSlot,
    pub locals: BTreeMap<u8, ScriptSlot>,
}

impl Default for Universe {
    fn default() -> Self {
        Self {
            global: ScriptSlot::default(),
            init: ScriptSlot::default(),
            notes: ScriptSlot::default(),
            locals: (1..=LOCAL_SLOT_COUNT as u8)
                .map(|index| (index, ScriptSlot::default()))
                .collect(),
        }
    }
}

impl Universe {
    /// Access a slot by kind. Missing local slots get created on demand, so local indices must
    /// have been validated by the caller.
    pub fn slot_mut(&mut self, kind: SlotKind) -> &mut ScriptSlot {
        match kind {
            SlotKind::Global => &mut self.global,
            SlotKind::Init => &mut self.init,
            SlotKind::Notes => &mut self.notes,
            SlotKind::Local(index) => self.locals.entry(index).or_default(),
        }
    }

    /// Read only access to a slot by kind.
    pub fn slot(&self, kind: SlotKind) -> Option<&ScriptSlot> {
        match kind {
            SlotKind::Global => Some(&self.global),
            SlotKind::Init => Some(&self.init),
            SlotKind::Notes => Some(&self.notes),
            SlotKind::Local(index) => self.locals.get(&index),
        }
    }

    /// Kinds of all executable slots in evaluation order: global first, then the locals in
    /// ascending index order. Init only runs on universe selection, so it's not included.
    pub fn evaluation_order(&self) -> impl Iterator<Item = SlotKind> + '_ {
        std::iter::once(SlotKind::Global).chain(self.locals.keys().map(|i| SlotKind::Local(*i)))
    }

    /// Clear a local script: text, evaluation count and counters.
    pub fn delete_script(&mut self, index: u8) {
        self.locals.insert(index, ScriptSlot::default());
    }

    /// Copy a local script's text and evaluation count to another local slot. The target slot
    /// starts with fresh counters.
    pub fn copy_script(&mut self, from: u8, to: u8) {
        let source = self.locals.get(&from).cloned().unwrap_or_default();
        self.locals.insert(
            to,
            ScriptSlot {
                counters: CounterState::default(),
                ..source
            },
        );
    }
}

// -------------------------------------------------------------------------------------------------

/// All known universes and the name of the selected one.
#[derive(Debug, Clone, PartialEq)]
pub struct Universes {
    universes: BTreeMap<String, Universe>,
    selected: String,
}

impl Default for Universes {
    fn default() -> Self {
        Self::new()
    }
}

impl Universes {
    /// Create a new collection with an empty default universe selected.
    pub fn new() -> Self {
        let mut universes = BTreeMap::new();
        universes.insert(DEFAULT_UNIVERSE.to_string(), Universe::default());
        let selected = DEFAULT_UNIVERSE.to_string();
        Self {
            universes,
            selected,
        }
    }

    /// Name of the currently selected universe.
    pub fn selected_name(&self) -> &str {
        &self.selected
    }

    /// The selected universe.
    pub fn selected(&self) -> &Universe {
        self.universes
            .get(&self.selected)
            .expect("selected universe should always exist")
    }

    /// Mutable access to the selected universe.
    pub fn selected_mut(&mut self) -> &mut Universe {
        let name = self.selected.clone();
        self.get_or_create(&name)
    }

    /// Names of all universes in alphabetical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.universes.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Universe> {
        self.universes.get(name)
    }

    /// Access a universe by name, creating it on first reference.
    pub fn get_or_create(&mut self, name: &str) -> &mut Universe {
        self.universes.entry(name.to_string()).or_default()
    }

    /// Select a universe by name, creating it on first reference. The caller is responsible for
    /// running the universe's init script.
    pub fn select(&mut self, name: &str) {
        let name = name.trim();
        self.get_or_create(name);
        self.selected = name.to_string();
    }

    /// Set the candidate text of a slot.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] when `kind` is a local slot out of range `1..=16`.
    pub fn set_candidate(
        &mut self,
        universe: &str,
        kind: SlotKind,
        text: String,
    ) -> Result<(), Error> {
        let kind = kind.validate()?;
        self.get_or_create(universe).slot_mut(kind).candidate = text;
        Ok(())
    }

    /// Copy the candidate text of a slot to its committed text.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] when `kind` is a local slot out of range `1..=16`.
    pub fn commit(&mut self, universe: &str, kind: SlotKind) -> Result<(), Error> {
        let kind = kind.validate()?;
        self.get_or_create(universe).slot_mut(kind).commit();
        Ok(())
    }

    /// Copy a universe with all its scripts. Counters of the copy start fresh.
    pub fn copy_universe(&mut self, from: &str, to: &str) {
        let mut copy = self.universes.get(from).cloned().unwrap_or_default();
        for slot in [&mut copy.global, &mut copy.init, &mut copy.notes]
            .into_iter()
            .chain(copy.locals.values_mut())
        {
            slot.counters = CounterState::default();
        }
        self.universes.insert(to.to_string(), copy);
    }

    /// Delete a universe. Deleting the selected universe selects the default universe. Returns
    /// true when the selection changed, so its init script needs to run.
    pub fn delete_universe(&mut self, name: &str) -> bool {
        self.universes.remove(name);
        if self.selected == name {
            self.select(DEFAULT_UNIVERSE);
            true
        } else {
            false
        }
    }

    /// Replace a universe with an empty one.
    pub fn reset_universe(&mut self, name: &str) {
        self.universes.insert(name.to_string(), Universe::default());
    }

    /// Delete all universes and select a fresh default universe.
    pub fn reset_all(&mut self) {
        *self = Self::new();
    }

    /// Serialize all universes into the persisted JSON layout.
    ///
    /// ### Errors
    /// Returns [`Error::Persistence`] when serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.universes)?)
    }

    /// Load universes from the persisted JSON layout, selecting the given universe.
    ///
    /// ### Errors
    /// Returns [`Error::Persistence`] when the JSON content is not a valid universe map.
    pub fn from_json(json: &str, selected: &str) -> Result<Self, Error> {
        let mut universes = serde_json::from_str::<BTreeMap<String, Universe>>(json)?;
        for (name, universe) in universes.iter_mut() {
            universe.locals.retain(|index, _| {
                let valid = (1..=LOCAL_SLOT_COUNT).contains(&(*index as usize));
                if !valid {
                    log::warn!("Ignoring invalid local script index {index} in universe '{name}'");
                }
                valid
            });
            for index in 1..=LOCAL_SLOT_COUNT as u8 {
                universe.locals.entry(index).or_default();
            }
        }
        let mut universes = Self {
            universes,
            selected: DEFAULT_UNIVERSE.to_string(),
        };
        universes.get_or_create(DEFAULT_UNIVERSE);
        universes.select(selected);
        Ok(universes)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn slot_kinds() {
        assert_eq!(SlotKind::local(1).unwrap(), SlotKind::Local(1));
        assert_eq!(SlotKind::local(16).unwrap(), SlotKind::Local(16));
        assert!(matches!(SlotKind::local(0), Err(Error::InvalidSlot(0))));
        assert!(matches!(SlotKind::local(17), Err(Error::InvalidSlot(17))));
        assert!(!SlotKind::Notes.is_executable());
        assert_eq!(SlotId::new("Default", SlotKind::Local(3)).to_string(), "Default/local 3");
    }

    #[test]
    fn evaluation_order() {
        let universe = Universe::default();
        let order = universe.evaluation_order().collect::<Vec<_>>();
        assert_eq!(order.len(), 17);
        assert_eq!(order[0], SlotKind::Global);
        assert_eq!(order[1], SlotKind::Local(1));
        assert_eq!(order[16], SlotKind::Local(16));
    }

    #[test]
    fn commit() {
        let mut universes = Universes::new();
        universes
            .set_candidate("Default", SlotKind::Global, "beat(1)".to_string())
            .unwrap();
        assert!(universes.selected().global.is_blank());
        universes.commit("Default", SlotKind::Global).unwrap();
        assert_eq!(universes.selected().global.committed, "beat(1)");
        assert!(!universes.selected().global.is_blank());

        // local slots out of range never get created
        for index in [0, 17, 99] {
            assert!(matches!(
                universes.set_candidate("Default", SlotKind::Local(index), "x".to_string()),
                Err(Error::InvalidSlot(_))
            ));
            assert!(matches!(
                universes.commit("Default", SlotKind::Local(index)),
                Err(Error::InvalidSlot(_))
            ));
        }
        assert_eq!(universes.selected().locals.len(), LOCAL_SLOT_COUNT);
        assert_eq!(universes.selected().evaluation_order().count(), LOCAL_SLOT_COUNT + 1);
    }

    #[test]
    fn universe_lifecycle() {
        let mut universes = Universes::new();
        universes.select(" Jungle ");
        assert_eq!(universes.selected_name(), "Jungle");
        universes.selected_mut().global = ScriptSlot::with_text("x = 1");
        universes.copy_universe("Jungle", "Copy");
        assert_eq!(universes.get("Copy").unwrap().global.committed, "x = 1");
        assert_eq!(universes.names().collect::<Vec<_>>(), vec!["Copy", "Default", "Jungle"]);

        assert!(!universes.delete_universe("Copy"));
        assert!(universes.delete_universe("Jungle"));
        assert_eq!(universes.selected_name(), DEFAULT_UNIVERSE);

        universes.select("Other");
        universes.reset_all();
        assert_eq!(universes.names().collect::<Vec<_>>(), vec![DEFAULT_UNIVERSE]);
    }

    #[test]
    fn script_management() {
        let mut universe = Universe::default();
        *universe.slot_mut(SlotKind::Local(1)) = ScriptSlot::with_text("beat(1)");
        universe.slot_mut(SlotKind::Local(1)).evaluations = 3;
        universe.slot_mut(SlotKind::Local(1)).counters.next("a");

        universe.copy_script(1, 2);
        let copy = universe.slot(SlotKind::Local(2)).unwrap();
        assert_eq!(copy.committed, "beat(1)");
        assert_eq!(copy.evaluations, 3);
        assert_eq!(copy.counters.get("a"), 0);

        universe.delete_script(1);
        assert_eq!(universe.slot(SlotKind::Local(1)), Some(&ScriptSlot::default()));
    }

    #[test]
    fn persistence() -> Result<(), Error> {
        let mut universes = Universes::new();
        universes.select("Live");
        universes.selected_mut().init = ScriptSlot::with_text("bpm(90)");
        universes.selected_mut().locals.get_mut(&4).unwrap().evaluations = 12;

        let json = universes.to_json()?;
        assert!(json.contains("\"candidate\""));
        assert!(json.contains("\"evaluations\": 12"));
        assert!(!json.contains("counters"));

        let loaded = Universes::from_json(&json, "Live")?;
        assert_eq!(loaded.selected_name(), "Live");
        assert_eq!(loaded.selected().init.committed, "bpm(90)");
        assert_eq!(loaded.selected().locals.len(), LOCAL_SLOT_COUNT);
        assert!(Universes::from_json("{ invalid", "Live").is_err());

        // out of range locals get dropped, missing ones get filled in
        let json = r#"{
            "Live": {
                "global": { "candidate": "", "committed": "", "evaluations": 0 },
                "init": { "candidate": "", "committed": "", "evaluations": 0 },
                "notes": { "candidate": "", "committed": "", "evaluations": 0 },
                "locals": {
                    "0": { "candidate": "a", "committed": "a", "evaluations": 0 },
                    "3": { "candidate": "b", "committed": "b", "evaluations": 0 },
                    "99": { "candidate": "c", "committed": "c", "evaluations": 0 }
                }
            }
        }"#;
        let loaded = Universes::from_json(json, "Live")?;
        let locals = &loaded.selected().locals;
        assert_eq!(locals.len(), LOCAL_SLOT_COUNT);
        assert_eq!(locals[&3].committed, "b");
        assert!(!locals.contains_key(&0) && !locals.contains_key(&99));
        Ok(())
    }
}
