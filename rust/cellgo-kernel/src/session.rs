//! One notebook session: the declaration store, the Go module it builds in,
//! and the state directives change.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;

use cellgo_synth::columns::{from_byte_col, to_byte_col, to_byte_col_lossy};
use cellgo_synth::diagnostics::translate_columns;
use cellgo_synth::{
    Assembler, Assembly, Cell, CellId, Cursor, DeclKey, DeclKind, DeclStore, Diagnostic,
    DirectiveKind, LineMap, Location, RemapContext,
};

use crate::config::KernelConfig;
use crate::directives::{self, Command, HELP};
use crate::error::{error_chain, DirectiveError, KernelError};
use crate::exec::{run_streaming, CancelToken, ExitStatus};
use crate::gotool::GoTool;
use crate::observer::{NoopObserver, WorkspaceObserver};
use crate::sink::{OutputSink, RewriteStderr};
use crate::workspace::{Workspace, DOCUMENT};

/// Exported to programs and shell commands: the session working directory.
pub const DIR_VAR: &str = "CELLGO_DIR";
/// Exported to programs and shell commands: the session Go module directory.
pub const TMP_DIR_VAR: &str = "CELLGO_TMP_DIR";

/// How a cell ended. Build and runtime failures are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Nothing but directives; no build.
    DirectivesOnly,
    /// Compiled and memorized, nothing to run.
    Memorized,
    Completed,
    /// Compilation failed; the store is unchanged.
    BuildFailed(Vec<Diagnostic>),
    /// The program, or a shell command, exited unsuccessfully. `None` when
    /// killed by a signal.
    RuntimeFailed { code: Option<i32> },
    Cancelled,
}

impl ExecOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExecOutcome::DirectivesOnly | ExecOutcome::Memorized | ExecOutcome::Completed
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Classified,
    StoreUpdated,
    Assembled,
    Built,
    BuildFailed,
    Running,
}

fn enter(cell: CellId, phase: Phase) {
    tracing::debug!(cell, ?phase, "cell phase");
}

/// The generated document for an interactive request.
#[derive(Debug, Clone)]
pub struct DocumentView {
    pub path: PathBuf,
    pub text: String,
    /// Requested cursor in document coordinates.
    pub cursor: Option<Cursor>,
    pub line_map: LineMap,
}

pub struct Session {
    config: KernelConfig,
    store: DeclStore,
    workspace: Workspace,
    go: GoTool,
    args: Vec<String>,
    auto_get: bool,
    env: BTreeMap<String, String>,
    cwd: PathBuf,
    tracked: BTreeSet<PathBuf>,
    execution_count: u64,
    observer: Box<dyn WorkspaceObserver>,
    last_document: Option<String>,
}

impl Session {
    /// Start a session with a fresh Go module under the configured temp root.
    pub fn new(config: KernelConfig) -> Result<Self, KernelError> {
        let workspace = Workspace::create(&config.temp_root(), &config.go.version)?;
        let cwd = std::env::current_dir().map_err(KernelError::io("."))?;
        let mut env = BTreeMap::new();
        env.insert(DIR_VAR.to_string(), cwd.display().to_string());
        env.insert(
            TMP_DIR_VAR.to_string(),
            workspace.dir().display().to_string(),
        );
        tracing::info!(
            module = %workspace.module_name(),
            cwd = %cwd.display(),
            "session started"
        );
        Ok(Self {
            go: GoTool::new(&config.go),
            auto_get: config.kernel.auto_get,
            config,
            store: DeclStore::new(),
            workspace,
            args: Vec::new(),
            env,
            cwd,
            tracked: BTreeSet::new(),
            execution_count: 0,
            observer: Box::new(NoopObserver),
            last_document: None,
        })
    }

    pub fn with_observer(mut self, observer: impl WorkspaceObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn store(&self) -> &DeclStore {
        &self.store
    }

    pub fn module_dir(&self) -> &Path {
        self.workspace.dir()
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn auto_get(&self) -> bool {
        self.auto_get
    }

    /// A variable as programs will see it: session value first, then the
    /// kernel's own environment.
    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    pub fn tracked(&self) -> impl Iterator<Item = &Path> {
        self.tracked.iter().map(PathBuf::as_path)
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Text of the most recently assembled document.
    pub fn last_document(&self) -> Option<&str> {
        self.last_document.as_deref()
    }

    /// Execute one cell.
    pub fn execute(
        &mut self,
        code: &str,
        sink: &mut dyn OutputSink,
        cancel: &CancelToken,
    ) -> Result<ExecOutcome, KernelError> {
        self.execution_count += 1;
        let cell = Cell::new(self.execution_count, code);
        enter(cell.id, Phase::Classified);

        for directive in &cell.directives {
            if cancel.is_cancelled() {
                return Ok(ExecOutcome::Cancelled);
            }
            match directive.kind {
                DirectiveKind::Config => {
                    if let Err(err) = self.run_directive(&directive.parts(), sink) {
                        sink.stderr(&format!("{}\n", error_chain(&err)));
                    }
                }
                DirectiveKind::Shell => {
                    let status = self.run_shell(&directive.text, sink, cancel)?;
                    self.auto_track();
                    match status {
                        ExitStatus::Exited(Some(0)) => {}
                        ExitStatus::Exited(code) => {
                            sink.stderr(&format!("{}\n", exit_message(code)));
                            return Ok(ExecOutcome::RuntimeFailed { code });
                        }
                        ExitStatus::Cancelled => return Ok(ExecOutcome::Cancelled),
                    }
                }
            }
        }

        if !cell.has_body() {
            return Ok(ExecOutcome::DirectivesOnly);
        }

        let staged = self.stage(&cell);
        enter(cell.id, Phase::StoreUpdated);

        let scratch = self.workspace.scratch()?;
        let mut skipped: Vec<DeclKey> = Vec::new();
        let mut retried = false;
        let (assembly, failure) = loop {
            let assembly = Assembler::new(&staged, cell.id)
                .without_imports(&skipped)
                .assemble(&cell, None);
            enter(cell.id, Phase::Assembled);
            self.publish(&assembly)?;
            let document = scratch.document_path();
            fs::write(&document, assembly.text()).map_err(KernelError::io(document))?;

            if self.auto_get && !retried {
                self.fetch_modules(cancel);
            }
            let built = self.go.build(
                self.workspace.dir(),
                &scratch.package(),
                &scratch.binary_path(),
                &self.env,
                cancel,
            )?;
            let Some(output) = built else {
                return Ok(ExecOutcome::Cancelled);
            };
            if output.success {
                break (assembly, None);
            }

            let mut diagnostics = RemapContext::new(&cell, &assembly, DOCUMENT)
                .in_dir(scratch.name())
                .with_known_names(known_names(&staged))
                .diagnostics(&output.combined());
            if diagnostics.is_empty() {
                diagnostics.push(Diagnostic::error(build_failed_message(output.code)));
            }
            if !retried {
                if let Some(unused) = unused_memorized_imports(&diagnostics, &assembly, &staged) {
                    tracing::debug!(?unused, "retrying without unused memorized imports");
                    skipped.extend(unused);
                    retried = true;
                    continue;
                }
            }
            break (assembly, Some(diagnostics));
        };

        if let Some(mut diagnostics) = failure {
            enter(cell.id, Phase::BuildFailed);
            translate_columns(&mut diagnostics, self.config.kernel.column_unit);
            let color = sink.color();
            for diagnostic in &diagnostics {
                let rendered = if color {
                    diagnostic.render_ansi()
                } else {
                    diagnostic.render_plain()
                };
                sink.stderr(&rendered);
            }
            return Ok(ExecOutcome::BuildFailed(diagnostics));
        }

        enter(cell.id, Phase::Built);
        self.store = staged;
        if !assembly.has_entry_point {
            return Ok(ExecOutcome::Memorized);
        }
        if cancel.is_cancelled() {
            return Ok(ExecOutcome::Cancelled);
        }

        enter(cell.id, Phase::Running);
        let remap = RemapContext::new(&cell, &assembly, DOCUMENT).in_dir(scratch.name());
        let mut cmd = ProcessCommand::new(scratch.binary_path());
        cmd.args(&self.args).current_dir(&self.cwd).envs(&self.env);
        let mut rewriter = RewriteStderr::new(sink, |text: &str| remap.remap_text(text));
        let status = run_streaming(&mut cmd, &mut rewriter, cancel)?;
        rewriter.finish();

        Ok(match status {
            ExitStatus::Exited(Some(0)) => ExecOutcome::Completed,
            ExitStatus::Exited(code) => {
                sink.stderr(&format!("{}\n", exit_message(code)));
                ExecOutcome::RuntimeFailed { code }
            }
            ExitStatus::Cancelled => ExecOutcome::Cancelled,
        })
    }

    /// Assemble `code` as the next cell would be, without building it, and
    /// publish the document for editor tooling. `cursor` is in cell
    /// coordinates, its column counted in the configured column unit; the
    /// returned cursor uses the same unit.
    pub fn inspect(&mut self, code: &str, cursor: Cursor) -> Result<DocumentView, KernelError> {
        let unit = self.config.kernel.column_unit;
        let cell = Cell::new(self.execution_count + 1, code);
        let byte_col = cell.lines.get(cursor.line).map_or(cursor.col, |line| {
            to_byte_col(line, cursor.col, unit).unwrap_or_else(|| {
                tracing::debug!(line = cursor.line, col = cursor.col, "cursor inside a character, snapping");
                to_byte_col_lossy(line, cursor.col, unit)
            })
        });

        let staged = self.stage(&cell);
        let assembly = Assembler::new(&staged, cell.id)
            .assemble(&cell, Some(Cursor::new(cursor.line, byte_col)));
        let path = self.publish(&assembly)?;
        let cursor = assembly.cursor.map(|c| {
            let col = assembly
                .lines
                .get(c.line)
                .map_or(c.col, |line| from_byte_col(line, c.col, unit));
            Cursor::new(c.line, col)
        });
        Ok(DocumentView {
            path,
            text: assembly.text(),
            cursor,
            line_map: assembly.map,
        })
    }

    fn stage(&self, cell: &Cell) -> DeclStore {
        let mut staged = self.store.clone();
        for decl in cell.declarations() {
            staged.upsert(decl);
        }
        staged
    }

    fn publish(&mut self, assembly: &Assembly) -> Result<PathBuf, KernelError> {
        let text = assembly.text();
        let path = self.workspace.write_document(&text)?;
        advisory(
            self.observer.document_changed(&path, &text),
            "document_changed",
        );
        self.last_document = Some(text);
        Ok(path)
    }

    fn fetch_modules(&self, cancel: &CancelToken) {
        match self.go.mod_tidy(self.workspace.dir(), &self.env, cancel) {
            Ok(None) => tracing::debug!("go mod tidy cancelled"),
            Ok(Some(output)) if output.success => {}
            Ok(Some(output)) => tracing::warn!(output = %output.combined().trim(), "go mod tidy failed"),
            Err(err) => tracing::warn!(error = %error_chain(&err), "go mod tidy failed"),
        }
    }

    fn run_shell(
        &self,
        text: &str,
        sink: &mut dyn OutputSink,
        cancel: &CancelToken,
    ) -> Result<ExitStatus, KernelError> {
        let (dir, script) = match text.strip_prefix('*') {
            Some(rest) => (self.workspace.dir(), rest),
            None => (self.cwd.as_path(), text),
        };
        tracing::debug!(dir = %dir.display(), script, "shell");
        let mut cmd = ProcessCommand::new(&self.config.shell.program);
        cmd.arg(&self.config.shell.flag)
            .arg(script)
            .current_dir(dir)
            .envs(&self.env);
        run_streaming(&mut cmd, sink, cancel)
    }

    /// Track the local targets of `replace` rules in `go.mod`.
    fn auto_track(&mut self) {
        match self.workspace.local_replacements() {
            Ok(paths) => {
                for path in paths {
                    self.track_path(path);
                }
            }
            Err(err) => tracing::warn!(error = %error_chain(&err), "auto-track failed"),
        }
    }

    fn track_path(&mut self, path: PathBuf) -> bool {
        if self.tracked.contains(&path) {
            return false;
        }
        advisory(self.observer.path_tracked(&path), "path_tracked");
        tracing::debug!(path = %path.display(), "tracking");
        self.tracked.insert(path)
    }

    fn run_directive(
        &mut self,
        parts: &[String],
        sink: &mut dyn OutputSink,
    ) -> Result<(), DirectiveError> {
        let command = directives::parse(parts)?;
        tracing::debug!(?command, "directive");
        match command {
            Command::Args { args, .. } => self.args = args,
            Command::Env { name, value: Some(value) } => {
                sink.stdout(&format!("Set: {name}={value:?}\n"));
                self.env.insert(name, value);
            }
            Command::Env { name, value: None } => match self.env_var(&name) {
                Some(value) => sink.stdout(&format!("{name}={value:?}\n")),
                None => sink.stdout(&format!("{name} is not set\n")),
            },
            Command::Cd(None) => {
                sink.stdout(&format!("Current directory: {:?}\n", self.cwd.display().to_string()));
            }
            Command::Cd(Some(dir)) => {
                let target = self.resolve_path(&dir);
                let target =
                    fs::canonicalize(&target).map_err(|err| DirectiveError::failed("cd", err))?;
                if !target.is_dir() {
                    return Err(DirectiveError::usage(
                        "cd",
                        format!("{} is not a directory", target.display()),
                    ));
                }
                sink.stdout(&format!("Changed directory to {:?}\n", target.display().to_string()));
                self.env
                    .insert(DIR_VAR.to_string(), target.display().to_string());
                self.cwd = target;
            }
            Command::AutoGet(enabled) => self.auto_get = enabled,
            Command::List => sink.stdout(&self.listing()),
            Command::Remove(labels) => self.remove(&labels, sink)?,
            Command::Reset { manifest_only } => {
                if !manifest_only {
                    self.store.reset();
                }
                self.workspace
                    .reset_manifest()
                    .map_err(|err| DirectiveError::failed("reset", err))?;
                if manifest_only {
                    sink.stdout("Reset go.mod\n");
                } else {
                    sink.stdout("Reset declarations and go.mod\n");
                }
            }
            Command::Track(paths) if paths.is_empty() => {
                if self.tracked.is_empty() {
                    sink.stdout("Nothing is tracked\n");
                }
                for path in &self.tracked {
                    sink.stdout(&format!("{}\n", path.display()));
                }
            }
            Command::Track(paths) => {
                for raw in paths {
                    let path = self.resolve_path(&raw);
                    if !path.exists() {
                        return Err(DirectiveError::failed(
                            "track",
                            io::Error::new(
                                io::ErrorKind::NotFound,
                                format!("{} does not exist", path.display()),
                            ),
                        ));
                    }
                    if self.track_path(path.clone()) {
                        sink.stdout(&format!("Tracking {:?}\n", path.display().to_string()));
                    }
                }
            }
            Command::Untrack(paths) => {
                for raw in paths {
                    self.untrack(&raw, sink)?;
                }
            }
            Command::GoWorkFix => {
                let added = self
                    .workspace
                    .go_work_fix()
                    .map_err(|err| DirectiveError::failed("goworkfix", err))?;
                for (module, dir) in &added {
                    sink.stdout(&format!("Added replace {module} => {}\n", dir.display()));
                }
                self.auto_track();
            }
            Command::Help => sink.markdown(HELP),
        }
        Ok(())
    }

    /// Memorized declarations grouped by kind.
    fn listing(&self) -> String {
        if self.store.is_empty() {
            return "No memorized declarations\n".to_string();
        }
        let mut groups: BTreeMap<DeclKind, Vec<String>> = BTreeMap::new();
        for key in self.store.list() {
            groups.entry(key.kind()).or_default().push(key.label());
        }
        let mut out = String::new();
        for (kind, labels) in groups {
            out.push_str(&format!("{}:\n", capitalize(kind.label())));
            for label in labels {
                out.push_str(&format!("  {label}\n"));
            }
        }
        out
    }

    fn remove(&mut self, labels: &[String], sink: &mut dyn OutputSink) -> Result<(), DirectiveError> {
        let mut missing = Vec::new();
        for label in labels {
            let keys = self.store.resolve_label(label);
            if keys.is_empty() {
                missing.push(label.as_str());
                continue;
            }
            self.store.remove(&keys);
            for key in keys {
                sink.stdout(&format!("Removed {} {key}\n", singular(key.kind())));
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DirectiveError::usage(
                "rm",
                format!("not memorized: {}", missing.join(", ")),
            ))
        }
    }

    fn untrack(&mut self, raw: &str, sink: &mut dyn OutputSink) -> Result<(), DirectiveError> {
        let removed: Vec<PathBuf> = match raw.strip_suffix("...") {
            Some(prefix) => {
                let prefix = self.resolve_path(if prefix.is_empty() { "." } else { prefix });
                self.tracked
                    .iter()
                    .filter(|path| path.starts_with(&prefix))
                    .cloned()
                    .collect()
            }
            None => {
                let path = self.resolve_path(raw);
                self.tracked.get(&path).cloned().into_iter().collect()
            }
        };
        if removed.is_empty() {
            return Err(DirectiveError::usage("untrack", format!("{raw} is not tracked")));
        }
        for path in removed {
            self.tracked.remove(&path);
            advisory(self.observer.path_untracked(&path), "path_untracked");
            sink.stdout(&format!("Untracked {:?}\n", path.display().to_string()));
        }
        Ok(())
    }

    /// Expand `~` and resolve against the session working directory.
    fn resolve_path(&self, raw: &str) -> PathBuf {
        let expanded = match raw.strip_prefix('~') {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
                Some(home) => home.join(rest.trim_start_matches('/')),
                None => PathBuf::from(raw),
            },
            _ => PathBuf::from(raw),
        };
        let joined = self.cwd.join(expanded);
        normalize(&joined)
    }
}

/// Drop `.` components and fold `..` lexically.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn advisory(result: io::Result<()>, notification: &str) {
    if let Err(err) = result {
        tracing::warn!(notification, error = %err, "workspace observer failed");
    }
}

/// Shown when `go build` fails without output the remapper understands.
fn build_failed_message(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("go build failed (exit {code})"),
        None => "go build failed (killed by a signal)".to_string(),
    }
}

fn exit_message(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn singular(kind: DeclKind) -> &'static str {
    match kind {
        DeclKind::Import => "import",
        DeclKind::Const => "constant",
        DeclKind::Type => "type",
        DeclKind::Var => "variable",
        DeclKind::Func => "function",
        DeclKind::Method => "method",
    }
}

fn known_names(store: &DeclStore) -> Vec<String> {
    store
        .definitions()
        .flat_map(|d| d.names.iter().cloned())
        .collect()
}

/// Keys of memorized imports, when every build error is one of them being
/// unused.
fn unused_memorized_imports(
    diagnostics: &[Diagnostic],
    assembly: &Assembly,
    store: &DeclStore,
) -> Option<Vec<DeclKey>> {
    if diagnostics.is_empty() {
        return None;
    }
    let imports = assembly.synthetic_imports(store);
    diagnostics
        .iter()
        .map(|diagnostic| match diagnostic.location {
            Some(Location::Generated { line, .. }) if diagnostic.is_unused_import() => imports
                .iter()
                .find(|(import_line, _)| *import_line == line)
                .map(|(_, key)| (*key).clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellgo_synth::Declaration;

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/b/./../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn kind_headings() {
        assert_eq!(capitalize("functions"), "Functions");
        assert_eq!(capitalize(""), "");
        assert_eq!(singular(DeclKind::Method), "method");
    }

    #[test]
    fn silent_build_failures_still_explain_themselves() {
        assert_eq!(build_failed_message(Some(1)), "go build failed (exit 1)");
        assert!(build_failed_message(None).contains("signal"));
    }

    #[test]
    fn exit_messages() {
        assert_eq!(exit_message(Some(2)), "exit status 2");
        assert_eq!(exit_message(None), "terminated by signal");
    }

    #[test]
    fn unused_import_retry_needs_every_error_to_match() {
        let mut store = DeclStore::new();
        store.upsert(Declaration::new(
            DeclKey::Import("strings".into()),
            vec![],
            "import \"strings\"",
            1,
        ));
        let cell = Cell::new(2, "%%\nprintln(1)");
        let assembly = Assembler::new(&store, 2).assemble(&cell, None);
        let (line, _) = assembly.synthetic_imports(&store)[0];

        let unused = Diagnostic {
            location: Some(Location::Generated { line, col: Some(8) }),
            ..Diagnostic::error("\"strings\" imported and not used")
        };
        let keys = unused_memorized_imports(&[unused.clone()], &assembly, &store).unwrap();
        assert_eq!(keys, vec![DeclKey::Import("strings".into())]);

        let other = Diagnostic::error("undefined: x");
        assert!(unused_memorized_imports(&[unused, other], &assembly, &store).is_none());
        assert!(unused_memorized_imports(&[], &assembly, &store).is_none());
    }
}
