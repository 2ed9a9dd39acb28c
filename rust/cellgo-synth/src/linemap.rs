//! Mapping between generated document lines and cell lines.

/// Where a generated line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    /// Copied verbatim from this (0-based) line of the current cell.
    Cell(usize),
    /// Boilerplate, a blank placeholder, or a declaration memorized from an
    /// earlier cell.
    Synthetic,
}

impl LineOrigin {
    pub fn cell_line(self) -> Option<usize> {
        match self {
            LineOrigin::Cell(line) => Some(line),
            LineOrigin::Synthetic => None,
        }
    }
}

/// Line-mapping table produced alongside an assembled document.
///
/// `origins` has exactly one entry per generated line. `placement` has one
/// entry per cell line and points at the generated line that stands in for
/// it, which may be a blank placeholder or entry-point boilerplate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMap {
    origins: Vec<LineOrigin>,
    placement: Vec<Option<usize>>,
}

impl LineMap {
    pub(crate) fn with_cell_lines(cell_lines: usize) -> Self {
        Self {
            origins: Vec::new(),
            placement: vec![None; cell_lines],
        }
    }

    /// Record the next generated line.
    pub(crate) fn push(&mut self, origin: LineOrigin) -> usize {
        self.origins.push(origin);
        self.origins.len() - 1
    }

    /// Record that cell line `cell_line` is represented by `doc_line`.
    pub(crate) fn place(&mut self, cell_line: usize, doc_line: usize) {
        if let Some(slot) = self.placement.get_mut(cell_line) {
            *slot = Some(doc_line);
        }
    }

    /// Number of generated lines.
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Origin of a generated line; out-of-range lines are synthetic.
    pub fn origin(&self, doc_line: usize) -> LineOrigin {
        self.origins
            .get(doc_line)
            .copied()
            .unwrap_or(LineOrigin::Synthetic)
    }

    /// Generated line standing in for a cell line.
    pub fn doc_line(&self, cell_line: usize) -> Option<usize> {
        self.placement.get(cell_line).copied().flatten()
    }

    pub fn origins(&self) -> &[LineOrigin] {
        &self.origins
    }

    /// Number of generated lines that map back to the cell.
    pub fn mapped_lines(&self) -> usize {
        self.origins
            .iter()
            .filter(|origin| matches!(origin, LineOrigin::Cell(_)))
            .count()
    }
}
