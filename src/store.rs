// Todo store with write-through persistence to a key-value slot

use crate::filter::FilterMode;
use crate::record::{Todo, next_id, now_ms, timestamp_from_ms};
use crate::slot::{Slot, decode_snapshot, encode_snapshot};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Counts over the whole list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
}

/// Ordered todo list backed by a persistent slot.
///
/// The in-memory list is authoritative. Every successful mutation rewrites the
/// whole list into the slot; no-op calls (blank text, unknown id) don't touch
/// it.
pub struct Store<S: Slot> {
    slot: S,
    todos: Vec<Todo>,
}

impl<S: Slot> Store<S> {
    /// Open a store over `slot`, seeding the list from its contents.
    ///
    /// A missing, unreadable or malformed snapshot yields an empty list; the
    /// problem is logged and never returned.
    pub fn open(slot: S) -> Result<Self> {
        let todos = Self::load(&slot);
        info!(key = slot.key(), count = todos.len(), "Opened todo store");
        Ok(Self { slot, todos })
    }

    fn load(slot: &S) -> Vec<Todo> {
        let contents = match slot.read() {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                debug!(key = slot.key(), "Slot is empty, starting with no todos");
                return Vec::new();
            }
            Err(e) => {
                warn!(key = slot.key(), error = ?e, "Failed to read slot, starting with no todos");
                return Vec::new();
            }
        };

        let snapshot = match decode_snapshot(&contents) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(key = slot.key(), error = ?e, "Failed to parse slot, starting with no todos");
                return Vec::new();
            }
        };

        let (todos, duplicates) = drop_duplicate_ids(snapshot.todos);

        if snapshot.skipped > 0 || duplicates > 0 {
            warn!(
                key = slot.key(),
                unreadable = snapshot.skipped,
                duplicates,
                kept = todos.len(),
                "Dropped entries from slot; they will be lost on the next write"
            );
        }

        todos
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a new todo and return its id.
    ///
    /// Text that is empty after trimming is ignored and `None` is returned.
    /// `None` is also returned, without writing, when the largest existing id
    /// is `i64::MAX` and no larger id can be allocated.
    pub fn add(&mut self, text: &str) -> Option<i64> {
        if text.trim().is_empty() {
            debug!("Ignoring blank todo text");
            return None;
        }

        let now = now_ms();
        let max_id = self.todos.iter().map(|todo| todo.id).max();
        let Some(id) = next_id(now, max_id) else {
            warn!(?max_id, "No id left above the largest todo id, ignoring add");
            return None;
        };

        self.todos.push(Todo::new(id, text, timestamp_from_ms(now)));
        debug!(id, "Added todo");

        self.write_through();
        Some(id)
    }

    /// Flip `completed` on the todo with `id`. Returns false if there is none.
    pub fn toggle(&mut self, id: i64) -> bool {
        let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) else {
            debug!(id, "Toggle of unknown todo ignored");
            return false;
        };

        todo.toggle();
        debug!(id, completed = todo.completed, "Toggled todo");

        self.write_through();
        true
    }

    /// Remove the todo with `id`. Returns false if there is none.
    pub fn delete(&mut self, id: i64) -> bool {
        let Some(index) = self.todos.iter().position(|todo| todo.id == id) else {
            debug!(id, "Delete of unknown todo ignored");
            return false;
        };

        self.todos.remove(index);
        debug!(id, "Deleted todo");

        self.write_through();
        true
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Todos selected by `mode`, in insertion order.
    ///
    /// The iterator is lazy and can be cloned to walk the view again.
    pub fn filter(&self, mode: FilterMode) -> impl Iterator<Item = &Todo> + Clone + '_ {
        self.todos.iter().filter(move |todo| mode.matches(todo))
    }

    pub fn stats(&self) -> Stats {
        let total = self.todos.len();
        let completed = self.todos.iter().filter(|todo| todo.completed).count();
        Stats {
            total,
            completed,
            active: total - completed,
        }
    }

    pub fn get(&self, id: i64) -> Option<&Todo> {
        self.todos.iter().find(|todo| todo.id == id)
    }

    /// All todos in insertion order
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn len(&self) -> usize {
        self.todos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    /// The slot this store persists to
    pub fn slot(&self) -> &S {
        &self.slot
    }

    #[cfg(test)]
    fn slot_mut(&mut self) -> &mut S {
        &mut self.slot
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the full list to the slot, returning any failure
    pub fn save(&mut self) -> Result<()> {
        let snapshot = encode_snapshot(&self.todos)?;
        self.slot.write(&snapshot)
    }

    /// Best-effort save after a mutation; failures are logged and the
    /// in-memory list stays authoritative.
    fn write_through(&mut self) {
        if let Err(e) = self.save() {
            warn!(key = self.slot.key(), error = ?e, "Failed to persist todos");
        }
    }
}

/// Keep the first record for any repeated id; returns the kept records and
/// how many were dropped
fn drop_duplicate_ids(todos: Vec<Todo>) -> (Vec<Todo>, usize) {
    let decoded = todos.len();
    let mut seen = HashSet::new();
    let kept: Vec<Todo> = todos.into_iter().filter(|todo| seen.insert(todo.id)).collect();
    let dropped = decoded - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::MemorySlot;

    fn empty_store() -> Store<MemorySlot> {
        Store::open(MemorySlot::new()).unwrap()
    }

    fn ids<'a>(todos: impl Iterator<Item = &'a Todo>) -> Vec<i64> {
        todos.map(|todo| todo.id).collect()
    }

    #[test]
    fn test_open_empty_slot() {
        let store = empty_store();
        assert!(store.is_empty());
        assert_eq!(store.stats(), Stats::default());
        assert_eq!(store.slot().write_count(), 0);
    }

    #[test]
    fn test_add_toggle_delete_scenario() {
        let mut store = empty_store();

        let id = store.add("Buy milk").unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.get(id).unwrap().completed);
        assert_eq!(
            store.stats(),
            Stats {
                total: 1,
                completed: 0,
                active: 1
            }
        );

        assert!(store.toggle(id));
        assert_eq!(
            store.stats(),
            Stats {
                total: 1,
                completed: 1,
                active: 0
            }
        );

        assert!(store.delete(id));
        assert_eq!(store.stats(), Stats::default());
    }

    #[test]
    fn test_add_blank_is_ignored() {
        let mut store = empty_store();

        assert!(store.add("").is_none());
        assert!(store.add("   ").is_none());
        assert!(store.add("\t\n").is_none());

        assert!(store.is_empty());
        assert_eq!(store.slot().write_count(), 0);
    }

    #[test]
    fn test_add_counts_only_non_blank() {
        let mut store = empty_store();
        let inputs = ["one", "", "two", "  ", "three", " four "];

        for text in inputs {
            store.add(text);
        }

        let expected = inputs.iter().filter(|t| !t.trim().is_empty()).count();
        assert_eq!(store.len(), expected);
    }

    #[test]
    fn test_add_keeps_text_and_order() {
        let mut store = empty_store();
        store.add("first");
        store.add("  padded  ");
        store.add("third");

        let texts: Vec<&str> = store.todos().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "  padded  ", "third"]);
    }

    #[test]
    fn test_ids_unique_within_same_millisecond() {
        let mut store = empty_store();
        for i in 0..200 {
            store.add(&format!("task {}", i));
        }

        let mut seen = HashSet::new();
        for todo in store.todos() {
            assert!(seen.insert(todo.id), "duplicate id {}", todo.id);
        }

        // Ids increase in insertion order
        assert!(store.todos().windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_created_at_matches_id_clock() {
        let before = now_ms();
        let mut store = empty_store();
        let id = store.add("timed").unwrap();
        let after = now_ms();

        let created = store.get(id).unwrap().created_at.timestamp_millis();
        assert!(created >= before && created <= after);
    }

    #[test]
    fn test_toggle_twice_restores() {
        let mut store = empty_store();
        let id = store.add("flip").unwrap();

        store.toggle(id);
        store.toggle(id);

        assert!(!store.get(id).unwrap().completed);
    }

    #[test]
    fn test_toggle_unknown_id_is_noop() {
        let mut store = empty_store();
        store.add("keep");
        let before = store.todos().to_vec();
        let writes = store.slot().write_count();

        assert!(!store.toggle(-1));

        assert_eq!(store.todos(), before.as_slice());
        assert_eq!(store.slot().write_count(), writes);
    }

    #[test]
    fn test_delete_removes_exactly_one() {
        let mut store = empty_store();
        let a = store.add("a").unwrap();
        let b = store.add("b").unwrap();
        let c = store.add("c").unwrap();

        assert!(store.delete(b));
        assert_eq!(store.len(), 2);
        assert_eq!(ids(store.filter(FilterMode::All)), vec![a, c]);

        let writes = store.slot().write_count();
        assert!(!store.delete(b));
        assert_eq!(store.len(), 2);
        assert_eq!(store.slot().write_count(), writes);
    }

    #[test]
    fn test_filter_partitions_all() {
        let mut store = empty_store();
        let ids_added: Vec<i64> = (0..6).filter_map(|i| store.add(&format!("t{}", i))).collect();
        store.toggle(ids_added[1]);
        store.toggle(ids_added[4]);

        let all: HashSet<i64> = ids(store.filter(FilterMode::All)).into_iter().collect();
        let active: HashSet<i64> = ids(store.filter(FilterMode::Active)).into_iter().collect();
        let completed: HashSet<i64> = ids(store.filter(FilterMode::Completed)).into_iter().collect();

        assert!(active.is_disjoint(&completed));
        assert_eq!(active.union(&completed).copied().collect::<HashSet<_>>(), all);
        assert_eq!(ids(store.filter(FilterMode::Completed)), vec![ids_added[1], ids_added[4]]);
    }

    #[test]
    fn test_filter_is_restartable() {
        let mut store = empty_store();
        store.add("a");
        store.add("b");

        let view = store.filter(FilterMode::All);
        assert_eq!(view.clone().count(), 2);
        assert_eq!(view.count(), 2);
    }

    #[test]
    fn test_write_through_after_each_mutation() {
        let mut store = empty_store();

        let id = store.add("persist me").unwrap();
        assert_eq!(store.slot().write_count(), 1);

        store.toggle(id);
        assert_eq!(store.slot().write_count(), 2);
        let persisted = decode_snapshot(store.slot().contents().unwrap()).unwrap();
        assert_eq!(persisted.todos, store.todos());

        store.delete(id);
        assert_eq!(store.slot().write_count(), 3);
        assert_eq!(store.slot().contents(), Some("[]"));
    }

    #[test]
    fn test_reopen_reproduces_list() {
        let mut store = empty_store();
        let a = store.add("a").unwrap();
        store.add("b");
        store.toggle(a);

        let original = store.todos().to_vec();
        let slot = store.slot().clone();

        let reopened = Store::open(slot).unwrap();
        assert_eq!(reopened.todos(), original.as_slice());
    }

    #[test]
    fn test_open_corrupt_slot_is_empty() {
        for contents in ["not json", "{\"todos\":[]}", "42", ""] {
            let store = Store::open(MemorySlot::with_contents(contents)).unwrap();
            assert!(store.is_empty(), "expected empty store for {:?}", contents);
        }
    }

    #[test]
    fn test_open_browser_snapshot() {
        let contents = r#"[{"id":1704164645678,"text":"From the browser","completed":false,"createdAt":"2024-01-02T03:04:05.678Z"}]"#;
        let store = Store::open(MemorySlot::with_contents(contents)).unwrap();

        let todo = store.get(1_704_164_645_678).unwrap();
        assert_eq!(todo.text, "From the browser");
        assert_eq!(todo.created_at.timestamp_millis(), 1_704_164_645_678);
    }

    #[test]
    fn test_open_drops_duplicate_ids() {
        let contents = r#"[
            {"id":1,"text":"first","completed":false,"createdAt":"2024-01-01T00:00:00Z"},
            {"id":1,"text":"second","completed":true,"createdAt":"2024-01-01T00:00:00Z"}
        ]"#;
        let store = Store::open(MemorySlot::with_contents(contents)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).unwrap().text, "first");
    }

    #[test]
    fn test_new_ids_follow_loaded_ids() {
        let future = now_ms() + 60_000;
        let contents = format!(
            r#"[{{"id":{},"text":"from the future","completed":false,"createdAt":"2024-01-01T00:00:00Z"}}]"#,
            future
        );
        let mut store = Store::open(MemorySlot::with_contents(contents)).unwrap();

        let id = store.add("now").unwrap();
        assert_eq!(id, future + 1);
    }

    #[test]
    fn test_failed_write_keeps_memory_state() {
        let mut store = empty_store();
        store.slot_mut().set_fail_writes(true);

        let id = store.add("unsaved").unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.toggle(id));
        assert!(store.get(id).unwrap().completed);

        assert!(store.slot().contents().is_none());
        assert!(store.save().is_err());

        store.slot_mut().set_fail_writes(false);
        store.save().unwrap();
        assert_eq!(decode_snapshot(store.slot().contents().unwrap()).unwrap().todos, store.todos());
    }

    #[test]
    fn test_add_after_max_id_is_ignored() {
        let contents = format!(
            r#"[{{"id":{},"text":"last id","completed":false,"createdAt":"2024-01-01T00:00:00Z"}}]"#,
            i64::MAX
        );
        let mut store = Store::open(MemorySlot::with_contents(contents)).unwrap();
        assert_eq!(store.len(), 1);

        assert!(store.add("next").is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.slot().write_count(), 0);

        // Other operations keep working
        assert!(store.toggle(i64::MAX));
        assert!(store.get(i64::MAX).unwrap().completed);
    }

    #[test]
    fn test_drop_duplicate_ids_counts() {
        let at = timestamp_from_ms(0);
        let todos = vec![
            Todo::new(1, "a", at),
            Todo::new(2, "b", at),
            Todo::new(1, "a again", at),
            Todo::new(2, "b again", at),
            Todo::new(3, "c", at),
        ];

        let (kept, dropped) = drop_duplicate_ids(todos);
        assert_eq!(dropped, 2);
        assert_eq!(ids(kept.iter()), vec![1, 2, 3]);
        assert_eq!(kept[0].text, "a");
    }

    #[test]
    fn test_open_keeps_readable_entries() {
        let contents = r#"[
            {"id":1,"text":"kept","completed":false,"createdAt":"2024-01-01T00:00:00Z"},
            {"id":2,"text":"no date"},
            {"id":1,"text":"repeat","completed":true,"createdAt":"2024-01-01T00:00:00Z"},
            {"id":3,"text":"also kept","completed":true,"createdAt":"2024-01-02T00:00:00Z"}
        ]"#;
        let store = Store::open(MemorySlot::with_contents(contents)).unwrap();

        assert_eq!(ids(store.filter(FilterMode::All)), vec![1, 3]);
        assert_eq!(store.get(1).unwrap().text, "kept");
    }
}
