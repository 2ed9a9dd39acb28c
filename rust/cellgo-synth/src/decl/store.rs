//! The persistent declaration store.

use std::fmt;

use indexmap::IndexMap;

use crate::CellId;

/// Category of a top-level declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclKind {
    Import,
    Const,
    Type,
    Var,
    Func,
    Method,
}

impl DeclKind {
    pub fn label(self) -> &'static str {
        match self {
            DeclKind::Import => "imports",
            DeclKind::Const => "constants",
            DeclKind::Type => "types",
            DeclKind::Var => "variables",
            DeclKind::Func => "functions",
            DeclKind::Method => "methods",
        }
    }
}

/// Identity of a declaration. At most one live declaration per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclKey {
    /// Keyed by the name the import binds (alias, or the import path when
    /// there is none).
    Import(String),
    Func(String),
    /// Receiver type with pointer and type parameters stripped.
    Method { receiver: String, name: String },
    Type(String),
    /// Declared names joined with `", "`.
    Var(String),
    Const(String),
}

impl DeclKey {
    pub fn kind(&self) -> DeclKind {
        match self {
            DeclKey::Import(_) => DeclKind::Import,
            DeclKey::Func(_) => DeclKind::Func,
            DeclKey::Method { .. } => DeclKind::Method,
            DeclKey::Type(_) => DeclKind::Type,
            DeclKey::Var(_) => DeclKind::Var,
            DeclKey::Const(_) => DeclKind::Const,
        }
    }

    /// User-facing name, as shown by `%ls` and accepted by `%rm`.
    pub fn label(&self) -> String {
        match self {
            DeclKey::Method { receiver, name } => format!("{receiver}.{name}"),
            DeclKey::Import(label)
            | DeclKey::Func(label)
            | DeclKey::Type(label)
            | DeclKey::Var(label)
            | DeclKey::Const(label) => label.clone(),
        }
    }
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub key: DeclKey,
    /// Package-level names bound by the declaration. Empty for imports and
    /// methods, which live outside the package namespace.
    pub names: Vec<String>,
    /// Literal source, possibly spanning several lines.
    pub source: String,
    /// Cell that last defined it.
    pub origin: CellId,
}

impl Declaration {
    pub fn new(key: DeclKey, names: Vec<String>, source: impl Into<String>, origin: CellId) -> Self {
        Self {
            key,
            names,
            source: source.into(),
            origin,
        }
    }

    pub fn line_count(&self) -> usize {
        self.source.lines().count().max(1)
    }
}

/// Declarations accumulated across cells, in first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct DeclStore {
    decls: IndexMap<DeclKey, Declaration>,
}

impl DeclStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a declaration.
    ///
    /// Replacing keeps the key's original position. Any other declaration
    /// binding one of the same package-level names is removed first.
    pub fn upsert(&mut self, decl: Declaration) {
        let clashing: Vec<DeclKey> = self
            .decls
            .values()
            .filter(|live| live.key != decl.key)
            .filter(|live| live.names.iter().any(|name| decl.names.contains(name)))
            .map(|live| live.key.clone())
            .collect();
        for key in clashing {
            tracing::debug!(displaced = %key, by = %decl.key, "declaration displaced");
            self.decls.shift_remove(&key);
        }
        self.decls.insert(decl.key.clone(), decl);
    }

    /// Remove the given keys. Returns how many were present.
    pub fn remove(&mut self, keys: &[DeclKey]) -> usize {
        keys.iter()
            .filter(|key| self.decls.shift_remove(*key).is_some())
            .count()
    }

    /// Keys in store order.
    pub fn list(&self) -> Vec<&DeclKey> {
        self.decls.keys().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.values()
    }

    pub fn imports(&self) -> impl Iterator<Item = &Declaration> {
        self.iter().filter(|d| d.key.kind() == DeclKind::Import)
    }

    /// Everything except imports, in store order.
    pub fn definitions(&self) -> impl Iterator<Item = &Declaration> {
        self.iter().filter(|d| d.key.kind() != DeclKind::Import)
    }

    pub fn get(&self, key: &DeclKey) -> Option<&Declaration> {
        self.decls.get(key)
    }

    pub fn contains(&self, key: &DeclKey) -> bool {
        self.decls.contains_key(key)
    }

    pub fn reset(&mut self) {
        self.decls.clear();
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Keys whose label is `label`, or which bind a name equal to it.
    pub fn resolve_label(&self, label: &str) -> Vec<DeclKey> {
        self.decls
            .values()
            .filter(|d| d.key.label() == label || d.names.iter().any(|n| n == label))
            .map(|d| d.key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(name: &str, source: &str, origin: CellId) -> Declaration {
        Declaration::new(DeclKey::Func(name.into()), vec![name.into()], source, origin)
    }

    #[test]
    fn upsert_twice_keeps_second_text() {
        let mut store = DeclStore::new();
        store.upsert(func("f", "func f() int { return 1 }", 1));
        store.upsert(func("f", "func f() int { return 2 }", 2));
        assert_eq!(store.len(), 1);
        let live = store.get(&DeclKey::Func("f".into())).unwrap();
        assert_eq!(live.source, "func f() int { return 2 }");
        assert_eq!(live.origin, 2);
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut store = DeclStore::new();
        store.upsert(func("a", "func a() {}", 1));
        store.upsert(func("b", "func b() {}", 1));
        store.upsert(func("a", "func a() { println() }", 2));
        let labels: Vec<String> = store.list().iter().map(|k| k.label()).collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn removing_missing_key_is_noop() {
        let mut store = DeclStore::new();
        store.upsert(func("a", "func a() {}", 1));
        assert_eq!(store.remove(&[DeclKey::Type("Nope".into())]), 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove(&[DeclKey::Func("a".into())]), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn names_share_one_namespace() {
        let mut store = DeclStore::new();
        store.upsert(Declaration::new(
            DeclKey::Var("a, b".into()),
            vec!["a".into(), "b".into()],
            "var a, b = 1, 2",
            1,
        ));
        store.upsert(Declaration::new(
            DeclKey::Const("b".into()),
            vec!["b".into()],
            "const b = 3",
            2,
        ));
        let keys = store.list();
        assert_eq!(keys, vec![&DeclKey::Const("b".into())]);
    }

    #[test]
    fn methods_do_not_clash_with_functions() {
        let mut store = DeclStore::new();
        store.upsert(func("Gain", "func Gain() {}", 1));
        store.upsert(Declaration::new(
            DeclKey::Method {
                receiver: "Kg".into(),
                name: "Gain".into(),
            },
            Vec::new(),
            "func (k Kg) Gain() {}",
            1,
        ));
        assert_eq!(store.len(), 2);
        assert_eq!(store.definitions().count(), 2);
        assert_eq!(store.imports().count(), 0);
    }

    #[test]
    fn resolve_label_by_label_and_name() {
        let mut store = DeclStore::new();
        store.upsert(Declaration::new(
            DeclKey::Method {
                receiver: "Kg".into(),
                name: "Gain".into(),
            },
            Vec::new(),
            "func (k *Kg) Gain() {}",
            1,
        ));
        store.upsert(Declaration::new(
            DeclKey::Var("x, y".into()),
            vec!["x".into(), "y".into()],
            "var x, y int",
            1,
        ));
        assert_eq!(
            store.resolve_label("Kg.Gain"),
            vec![DeclKey::Method {
                receiver: "Kg".into(),
                name: "Gain".into()
            }]
        );
        assert_eq!(store.resolve_label("y"), vec![DeclKey::Var("x, y".into())]);
        assert!(store.resolve_label("Gain").is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut store = DeclStore::new();
        store.upsert(Declaration::new(
            DeclKey::Import("fmt".into()),
            Vec::new(),
            "import \"fmt\"",
            1,
        ));
        store.reset();
        assert!(store.is_empty());
    }

    #[test]
    fn line_count_of_multiline_source() {
        let decl = func("f", "func f() {\n}\n", 1);
        assert_eq!(decl.line_count(), 2);
        assert_eq!(func("g", "", 1).line_count(), 1);
    }
}
