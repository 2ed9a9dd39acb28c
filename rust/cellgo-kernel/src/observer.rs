//! Notifications for tools watching the session workspace, such as a Go
//! language server.

use std::io;
use std::path::Path;

/// Observer of workspace changes. All notifications are advisory: a failure
/// is logged and the request carries on.
pub trait WorkspaceObserver {
    /// The generated document was (re)written at `path`.
    fn document_changed(&mut self, path: &Path, text: &str) -> io::Result<()>;
    fn path_tracked(&mut self, path: &Path) -> io::Result<()>;
    fn path_untracked(&mut self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl WorkspaceObserver for NoopObserver {
    fn document_changed(&mut self, _path: &Path, _text: &str) -> io::Result<()> {
        Ok(())
    }

    fn path_tracked(&mut self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn path_untracked(&mut self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}
