//! Batch script generation and lifecycle

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::parse_line;

/// Generated shell script owned by a single batch invocation. The backing
/// temp file is removed when the script is dropped, which covers the
/// success, error, and timeout paths alike.
pub struct BatchScript {
    file: NamedTempFile,
}

impl BatchScript {
    /// Render the command lines into a `set -e` script. Suppressed lines are
    /// rewritten as `<cmd> || true` so their failure never aborts the script.
    pub fn prepare(command: &str) -> std::io::Result<Self> {
        let mut script = String::from("#!/bin/sh\nset -e\n");
        for raw in command.lines() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let parsed = parse_line(raw);
            script.push_str(parsed.command);
            if parsed.suppressed {
                script.push_str(" || true");
            }
            script.push('\n');
        }

        let mut file = tempfile::Builder::new()
            .prefix("hookrun-")
            .suffix(".sh")
            .tempfile()?;
        file.write_all(script.as_bytes())?;
        file.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Consume and delete the script; deletion failure is logged, never
    /// escalated.
    pub fn remove(self) {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            log::warn!("can't remove batch script {}: {}", path.display(), e);
        }
    }
}
