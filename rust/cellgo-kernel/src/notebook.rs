//! Markdown notebooks: fenced ```go blocks, run in order as cells.

/// A cell extracted from a Markdown notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookCell {
    pub code: String,
    /// Line of the opening fence (1-based).
    pub fence_line: usize,
}

/// Extract the `go` blocks of a Markdown document.
///
/// Blocks open with three or more backticks tagged `go` (or `golang`) and
/// close with a fence at least as long. Other blocks are skipped, and an
/// unterminated block runs to the end of the file.
pub fn extract_cells(source: &str) -> Vec<NotebookCell> {
    let mut cells = Vec::new();
    let normalized = source.replace("\r\n", "\n");

    let mut open: Option<(usize, usize, bool)> = None;
    let mut code: Vec<&str> = Vec::new();

    for (idx, line) in normalized.split('\n').enumerate() {
        let trimmed = line.trim();
        let ticks = trimmed.chars().take_while(|&c| c == '`').count();
        match open {
            None if ticks >= 3 => {
                let lang = trimmed[ticks..].trim().to_lowercase();
                let lang = lang.split_whitespace().next().unwrap_or("");
                open = Some((idx + 1, ticks, lang == "go" || lang == "golang"));
                code.clear();
            }
            None => {}
            Some((fence_line, fence_ticks, wanted)) => {
                if ticks >= fence_ticks && trimmed[ticks..].trim().is_empty() {
                    if wanted {
                        cells.push(NotebookCell {
                            code: code.join("\n"),
                            fence_line,
                        });
                    }
                    open = None;
                } else {
                    code.push(line);
                }
            }
        }
    }

    if let Some((fence_line, _, true)) = open {
        cells.push(NotebookCell {
            code: code.join("\n"),
            fence_line,
        });
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_go_blocks_in_order() {
        let src = r#"# Notebook

```go
import "fmt"
```

Some prose.

```python
print("skipped")
```

```go
%%
fmt.Println("hi")
```
"#;
        let cells = extract_cells(src);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].code, "import \"fmt\"");
        assert_eq!(cells[0].fence_line, 3);
        assert_eq!(cells[1].code, "%%\nfmt.Println(\"hi\")");
    }

    #[test]
    fn longer_fences_nest_shorter_ones() {
        let src = "````go\nvar s = `\n```\n`\n````\n";
        let cells = extract_cells(src);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].code, "var s = `\n```\n`");
    }

    #[test]
    fn unterminated_block_runs_to_end() {
        let cells = extract_cells("```golang\nvar x = 1\n");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].code, "var x = 1\n");
    }

    #[test]
    fn crlf_is_normalized() {
        let cells = extract_cells("```go\r\nvar x = 1\r\n```\r\n");
        assert_eq!(cells[0].code, "var x = 1");
    }
}
