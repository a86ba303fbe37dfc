//! In-memory verb store and its source/target/kind indices — the runtime
//! counterpart to the persisted `indexes/verbs_by_*` layout, structured the
//! same way the teacher nests a `papaya::HashMap` of `papaya::HashSet`s for
//! its own predicate indices.
use papaya::{HashMap as ConcurrentMap, HashSet as ConcurrentSet};
use vex_types::{NounId, Verb, VerbDirection, VerbId, VerbKind};

type IdIndex<K> = ConcurrentMap<K, ConcurrentSet<VerbId>>;

#[derive(Default)]
pub struct VerbStore {
    verbs: ConcurrentMap<VerbId, Verb>,
    by_source: IdIndex<NounId>,
    by_target: IdIndex<NounId>,
    by_kind: IdIndex<VerbKind>,
}

impl VerbStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self, verb))]
    pub fn insert(&self, verb: Verb) {
        let id = verb.id.clone();
        self.index(&id, &verb.source, &verb.target, &verb.kind);
        self.verbs.pin().insert(id, verb);
    }

    fn index(&self, id: &VerbId, source: &NounId, target: &NounId, kind: &VerbKind) {
        self.by_source
            .pin()
            .get_or_insert_with(source.clone(), ConcurrentSet::new)
            .pin()
            .insert(id.clone());
        self.by_target
            .pin()
            .get_or_insert_with(target.clone(), ConcurrentSet::new)
            .pin()
            .insert(id.clone());
        self.by_kind
            .pin()
            .get_or_insert_with(kind.clone(), ConcurrentSet::new)
            .pin()
            .insert(id.clone());
    }

    pub fn get(&self, id: &VerbId) -> Option<Verb> {
        self.verbs.pin().get(id).cloned()
    }

    pub fn remove(&self, id: &VerbId) -> Option<Verb> {
        let removed = self.verbs.pin().remove(id).cloned();
        if let Some(verb) = &removed {
            if let Some(set) = self.by_source.pin().get(&verb.source) {
                set.pin().remove(id);
            }
            if let Some(set) = self.by_target.pin().get(&verb.target) {
                set.pin().remove(id);
            }
            if let Some(set) = self.by_kind.pin().get(&verb.kind) {
                set.pin().remove(id);
            }
        }
        removed
    }

    pub fn all(&self) -> Vec<Verb> {
        self.verbs.pin().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.verbs.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.verbs.pin().clear();
        self.by_source.pin().clear();
        self.by_target.pin().clear();
        self.by_kind.pin().clear();
    }

    fn resolve(&self, index: &IdIndex<NounId>, noun: &NounId) -> Vec<Verb> {
        index
            .pin()
            .get(noun)
            .map(|set| {
                let verbs = self.verbs.pin();
                set.pin()
                    .iter()
                    .filter_map(|id| verbs.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn by_source(&self, source: &NounId) -> Vec<Verb> {
        self.resolve(&self.by_source, source)
    }

    pub fn by_target(&self, target: &NounId) -> Vec<Verb> {
        self.resolve(&self.by_target, target)
    }

    pub fn by_kind(&self, kind: &VerbKind) -> Vec<Verb> {
        self.by_kind
            .pin()
            .get(kind)
            .map(|set| {
                let verbs = self.verbs.pin();
                set.pin()
                    .iter()
                    .filter_map(|id| verbs.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolves typed-edge traversal for `findSimilar`'s `relation_type`
    /// option and `search`'s `verb_direction`: the set of neighbour noun ids
    /// reachable from `noun` by edges of `kind` (or any kind, if `None`).
    pub fn connected_nouns(
        &self,
        noun: &NounId,
        direction: VerbDirection,
        kind: Option<&VerbKind>,
    ) -> Vec<NounId> {
        let matches_kind = |verb: &Verb| match kind {
            Some(k) => &verb.kind == k,
            None => true,
        };
        let mut out = Vec::new();
        if matches!(direction, VerbDirection::Out | VerbDirection::Both) {
            out.extend(
                self.by_source(noun)
                    .into_iter()
                    .filter(matches_kind)
                    .map(|v| v.target),
            );
        }
        if matches!(direction, VerbDirection::In | VerbDirection::Both) {
            out.extend(
                self.by_target(noun)
                    .into_iter()
                    .filter(matches_kind)
                    .map(|v| v.source),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_types::{CreatorService, Vector};

    fn verb(id: &str, source: &str, target: &str, kind: &str) -> Verb {
        Verb::new(
            VerbId::from(id.to_string()),
            NounId::from(source),
            NounId::from(target),
            VerbKind::from(kind),
            Vector::new(vec![0.1, 0.2]),
            CreatorService::from("test"),
        )
    }

    #[test]
    fn insert_then_lookup_by_all_indices() {
        let store = VerbStore::new();
        store.insert(verb("v1", "a", "b", "RelatedTo"));

        assert_eq!(store.by_source(&NounId::from("a")).len(), 1);
        assert_eq!(store.by_target(&NounId::from("b")).len(), 1);
        assert_eq!(store.by_kind(&VerbKind::from("RelatedTo")).len(), 1);
    }

    #[test]
    fn remove_clears_all_indices() {
        let store = VerbStore::new();
        store.insert(verb("v1", "a", "b", "RelatedTo"));
        store.remove(&VerbId::from("v1".to_string()));

        assert!(store.by_source(&NounId::from("a")).is_empty());
        assert!(store.by_target(&NounId::from("b")).is_empty());
        assert!(store.get(&VerbId::from("v1".to_string())).is_none());
    }

    #[test]
    fn connected_nouns_respects_direction_and_kind() {
        let store = VerbStore::new();
        store.insert(verb("v1", "a", "b", "Owns"));
        store.insert(verb("v2", "c", "a", "Mentors"));

        let out_only = store.connected_nouns(&NounId::from("a"), VerbDirection::Out, None);
        assert_eq!(out_only, vec![NounId::from("b")]);

        let in_only = store.connected_nouns(&NounId::from("a"), VerbDirection::In, None);
        assert_eq!(in_only, vec![NounId::from("c")]);

        let filtered = store.connected_nouns(
            &NounId::from("a"),
            VerbDirection::Both,
            Some(&VerbKind::from("Owns")),
        );
        assert_eq!(filtered, vec![NounId::from("b")]);
    }
}
