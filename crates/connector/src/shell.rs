//! Shell command assembly.

/// Shell used when `SHELL` is unset
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Quote a string for POSIX shells.
pub fn quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// A single command line running `cmd` in `shell`, elevated when `sudo`.
///
/// `password` switches sudo to read the password from stdin.
pub fn wrap(shell: &str, cmd: &str, sudo: bool, password: bool) -> String {
    let inner = format!("{shell} -c {}", quote(cmd));
    match (sudo, password) {
        (false, _) => inner,
        (true, false) => format!("sudo -E {inner}"),
        (true, true) => format!("sudo -S -p '' -E {inner}"),
    }
}

/// The parent directory part of a remote path, if any
pub fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}
