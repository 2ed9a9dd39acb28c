//! Integration tests for cell assembly and line mapping.

use cellgo_synth::{
    Assembler, Cell, Cursor, DeclKey, DeclStore, LineOrigin, RemapContext, FIXED_OVERHEAD,
};

// =============================================================================
// Helpers
// =============================================================================

const SAMPLE: &str = r#"import "fmt"

type K_g float64

!echo "grams"
func (k *K_g) Gain(lasagna K_g) {
	*k += lasagna
}

%% --verbose
var w K_g = 1
w.Gain(2)
fmt.Println(w)"#;

/// Stage a cell the way the kernel does: upsert its declarations into a
/// copy of the store, then assemble against the copy.
fn run_cell(store: &DeclStore, id: u64, text: &str) -> (DeclStore, Cell) {
    let cell = Cell::new(id, text);
    let mut staged = store.clone();
    for decl in cell.declarations() {
        staged.upsert(decl);
    }
    (staged, cell)
}

// =============================================================================
// Line-count invariant and mapping
// =============================================================================

#[test]
fn sample_has_fixed_overhead() {
    let (store, cell) = run_cell(&DeclStore::new(), 1, SAMPLE);
    let asm = Assembler::new(&store, 1).assemble(&cell, None);
    assert_eq!(asm.len(), cell.len() + FIXED_OVERHEAD);
    assert!(asm.has_entry_point);
}

#[test]
fn mapped_lines_are_verbatim() {
    let (store, cell) = run_cell(&DeclStore::new(), 1, SAMPLE);
    let asm = Assembler::new(&store, 1).assemble(&cell, None);
    let mut mapped = 0;
    for (doc_line, origin) in asm.map.origins().iter().enumerate() {
        if let LineOrigin::Cell(cell_line) = origin {
            assert_eq!(asm.lines[doc_line], cell.lines[*cell_line]);
            mapped += 1;
        }
    }
    // Everything except the shell line and the marker.
    assert_eq!(mapped, cell.len() - 2);
}

#[test]
fn directive_lines_never_reach_the_document() {
    let (store, cell) = run_cell(&DeclStore::new(), 1, SAMPLE);
    let text = Assembler::new(&store, 1).assemble(&cell, None).text();
    assert!(!text.contains("!echo"));
    assert!(!text.contains("%%"));
    assert!(text.contains("func main() { cellgoflag.Parse()"));
}

#[test]
fn cursor_on_pointer_receiver_method() {
    let (store, cell) = run_cell(&DeclStore::new(), 1, SAMPLE);
    let method_line = 5;
    assert!(cell.lines[method_line].starts_with("func (k *K_g) Gain"));

    let asm = Assembler::new(&store, 1).assemble(&cell, Some(Cursor::new(method_line, 14)));
    let cursor = asm.cursor.expect("cursor maps into the document");
    assert_eq!(asm.lines[cursor.line], cell.lines[method_line]);
    assert_eq!(cursor.col, 14);
}

// =============================================================================
// Memorization across cells
// =============================================================================

#[test]
fn declarations_carry_over_to_later_cells() {
    let (store, _) = run_cell(&DeclStore::new(), 1, SAMPLE);
    let (store, cell) = run_cell(&store, 2, "%%\nvar w K_g\nw.Gain(3)\nfmt.Println(w)");
    let asm = Assembler::new(&store, 2).assemble(&cell, None);

    let memorized: usize = store.iter().map(|d| d.line_count()).sum();
    assert_eq!(asm.len(), cell.len() + FIXED_OVERHEAD + memorized);
    assert!(asm.lines.iter().any(|l| l == "import \"fmt\""));
    assert!(asm.lines.iter().any(|l| l == "type K_g float64"));
}

#[test]
fn receiver_redefinition_leaves_one_declaration() {
    let (store, _) = run_cell(&DeclStore::new(), 1, SAMPLE);
    let (store, _) = run_cell(&store, 2, "func (k K_g) Gain(lasagna K_g) {}");
    let gains: Vec<_> = store
        .list()
        .into_iter()
        .filter(|k| matches!(k, DeclKey::Method { name, .. } if name == "Gain"))
        .collect();
    assert_eq!(gains.len(), 1);
    let live = store.get(gains[0]).unwrap();
    assert_eq!(live.source, "func (k K_g) Gain(lasagna K_g) {}");
    assert_eq!(live.origin, 2);
}

#[test]
fn redefining_one_grouped_var_keeps_its_siblings() {
    let (store, _) = run_cell(&DeclStore::new(), 1, "var (\n\ta = 1\n\tb = 2\n)");
    let (store, cell) = run_cell(&store, 2, "var a = 5\n%%\nprintln(a, b)");
    let labels: Vec<String> = store.list().into_iter().map(DeclKey::label).collect();
    assert_eq!(labels, ["a", "b"]);

    let asm = Assembler::new(&store, 2).assemble(&cell, None);
    assert!(asm.lines.iter().any(|l| l == "var b = 2"));
    assert!(!asm.lines.iter().any(|l| l.contains("a = 1")));
}

#[test]
fn folded_declaration_is_displaced_by_redefinition() {
    let (store, _) = run_cell(&DeclStore::new(), 1, "var a = 1; var b = 2");
    let (store, _) = run_cell(&store, 2, "var b = 3");
    assert_eq!(store.get(&DeclKey::Var("b".into())).unwrap().source, "var b = 3");

    let (store, cell) = run_cell(&store, 3, "%%\nprintln(a, b)");
    let asm = Assembler::new(&store, 3).assemble(&cell, None);
    let b_decls = asm.lines.iter().filter(|l| l.starts_with("var b")).count();
    assert_eq!(b_decls, 1);
    assert!(asm.lines.iter().any(|l| l == "var a = 1"));
}

#[test]
fn failed_cell_leaves_committed_store_alone() {
    let (committed, _) = run_cell(&DeclStore::new(), 1, "func f() int { return 1 }");
    let (staged, _) = run_cell(&committed, 2, "func f() int { return }");
    // The staged copy changed; the committed one did not.
    assert_eq!(staged.get(&DeclKey::Func("f".into())).unwrap().origin, 2);
    assert_eq!(committed.get(&DeclKey::Func("f".into())).unwrap().origin, 1);
}

// =============================================================================
// Diagnostics against a real assembly
// =============================================================================

#[test]
fn build_errors_point_at_cell_lines() {
    let (store, cell) = run_cell(&DeclStore::new(), 7, SAMPLE);
    let asm = Assembler::new(&store, 7).assemble(&cell, None);
    let doc_line = asm.map.doc_line(11).unwrap() + 1;
    let ctx = RemapContext::new(&cell, &asm, "main.go");

    let output = format!("# command-line-arguments\n./main.go:{doc_line}:2: undefined: w\n");
    let diags = ctx.diagnostics(&output);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].render_plain().contains("--> cell[7]:12:2"));
    assert_eq!(diags[0].source_line.as_deref(), Some("w.Gain(2)"));
}
