//! The import item classifier (C6): a pure function from a name and a
//! `DefinitionTable` to an action and, when one matched, the entry that
//! produced it. No I/O, no knowledge of `Format` or bytes — just the
//! first-match-wins lookup rule from SPEC_FULL.md §4.6.

use import_model::{Action, DefinitionEntry, DefinitionTable};

/// Classify `name` against `defs`, returning the action to take and the
/// matching entry (`None` when nothing matched, which always classifies
/// as `Action::Ignore`).
pub fn classify(name: &str, defs: &DefinitionTable) -> (Action, Option<DefinitionEntry>) {
    match defs.lookup(name) {
        Some(entry) => (entry.action, Some(entry.clone())),
        None => (Action::Ignore, None),
    }
}

pub fn is_to_ignore(defs: &DefinitionTable, name: &str) -> bool {
    classify(name, defs).0 == Action::Ignore
}

pub fn is_to_import(defs: &DefinitionTable, name: &str) -> bool {
    classify(name, defs).0 == Action::Import
}

pub fn is_to_extract(defs: &DefinitionTable, name: &str) -> bool {
    classify(name, defs).0 == Action::Extract
}

pub fn is_to_expand(defs: &DefinitionTable, name: &str) -> bool {
    classify(name, defs).0 == Action::Expand
}

/// Applies classification to `item.name`, setting exactly one of
/// `to_ignore`/`to_import`/`to_extract`/`to_expand` and attaching the
/// matched `DefinitionEntry`, if any.
pub fn classify_item(item: &mut import_model::ImportItem, defs: &DefinitionTable) {
    let (action, entry) = classify(&item.name, defs);
    item.to_ignore = false;
    item.to_import = false;
    item.to_extract = false;
    item.to_expand = false;
    match action {
        Action::Ignore => item.to_ignore = true,
        Action::Import => item.to_import = true,
        Action::Extract => item.to_extract = true,
        Action::Expand => item.to_expand = true,
    }
    item.definition = entry;
}
